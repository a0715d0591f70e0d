//! Ledger Observer Module
//!
//! Two independent loops watch the chain for payments addressed to the
//! drop wallet: the block scanner tails confirmed blocks and completes
//! sessions, the mempool scanner peeks at unconfirmed transactions for
//! early detection. They share the RPC pool and the store but none of
//! each other's state.

pub mod block;
pub mod cadence;
pub mod mempool;

pub use block::BlockScanner;
pub use cadence::Cadence;
pub use mempool::MempoolScanner;

use crate::store::Store;
use std::collections::HashMap;

/// One open session awaiting its payment.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub session_id: String,
    pub quantity: i64,
}

/// Derived O(1) lookup from exact 8-decimal amount string to session.
///
/// Rebuilt from the store at the start of every observer cycle; the
/// authoritative check re-runs inside the completion transaction, so a
/// stale index is harmless. Key collisions cannot happen because
/// `amount_due` is unique.
#[derive(Debug, Default)]
pub struct PendingIndex {
    entries: HashMap<String, PendingEntry>,
}

impl PendingIndex {
    pub async fn load(store: &Store) -> Result<Self, sqlx::Error> {
        let mut entries = HashMap::new();
        for (amount, session_id, quantity) in store.open_sessions().await? {
            entries.insert(
                amount.to_string(),
                PendingEntry {
                    session_id,
                    quantity,
                },
            );
        }
        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn lookup(&self, amount_key: &str) -> Option<&PendingEntry> {
        self.entries.get(amount_key)
    }

    pub fn remove(&mut self, amount_key: &str) -> Option<PendingEntry> {
        self.entries.remove(amount_key)
    }
}
