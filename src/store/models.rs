//! Row models for the persistent store.

use crate::amount::Amount;

/// One pre-enumerated collectible.
///
/// An unclaimed item with a non-null `session_ref` is reserved by exactly
/// that session; a claimed item keeps its `session_ref` forever.
#[derive(Debug, Clone)]
pub struct InventoryItem {
    pub id: i64,
    pub content_ref: String,
    pub claimed: bool,
    pub session_ref: Option<String>,
}

/// Session lifecycle states. `Complete`, `Failed` and `Expired` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    PaymentPending,
    Complete,
    Failed,
    Expired,
}

impl SessionStatus {
    /// Wire/storage encoding. These strings are also the `status` values the
    /// public API reports, so they must not change.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Pending => "pending",
            SessionStatus::PaymentPending => "payment_pending",
            SessionStatus::Complete => "complete",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(SessionStatus::Pending),
            "payment_pending" => Some(SessionStatus::PaymentPending),
            "complete" => Some(SessionStatus::Complete),
            "failed" => Some(SessionStatus::Failed),
            "expired" => Some(SessionStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Failed | SessionStatus::Expired
        )
    }
}

/// A single buyer's purchase attempt.
#[derive(Debug, Clone)]
pub struct Session {
    pub session_id: String,
    pub quantity: i64,
    pub amount_due: Amount,
    pub status: SessionStatus,
    pub txid: Option<String>,
    /// Content references assigned at completion, in item-id order.
    pub assigned_refs: Option<Vec<String>>,
    pub created_at: i64,
    pub updated_at: i64,
}
