//! Reservation & Correlation Engine
//!
//! Owns every state transition of a purchase session:
//! 1. `create_intent` atomically reserves inventory and mints the unique
//!    expected amount that identifies the session on-chain
//! 2. `mark_payment_pending` records an unconfirmed matching output
//! 3. `assign_and_complete` claims the reserved items once a confirmed
//!    output matches
//! 4. `expire` / `expire_stale` release reservations that never paid
//!
//! Each operation is one transaction against the single-writer store, so
//! concurrent intents serialize and over-allocation is structurally
//! impossible.

use crate::amount::Amount;
use crate::store::{SessionStatus, Store};
use chrono::Utc;
use sqlx::Row;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Highest inventory id the drop will ever sell.
pub const MAX_SUPPLY: i64 = 5000;

pub const MIN_QUANTITY: i64 = 1;
pub const MAX_QUANTITY: i64 = 20;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("quantity must be between {MIN_QUANTITY} and {MAX_QUANTITY}, got {0}")]
    InvalidQuantity(i64),

    #[error("insufficient inventory: {available} available, {requested} requested")]
    InsufficientInventory { requested: i64, available: i64 },

    #[error("reservation race lost, please retry")]
    ReservationRace,

    #[error("amount collision, please retry")]
    AmountCollision,

    #[error("encoding error: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),
}

/// What a buyer needs to pay: send exactly `amount_due` to `address`.
#[derive(Debug, Clone)]
pub struct PaymentIntent {
    pub session_id: String,
    pub amount_due: Amount,
    pub address: String,
}

pub struct ReservationEngine {
    store: Arc<Store>,
    price_per_item: Amount,
    payment_address: String,
    max_supply: i64,
}

impl ReservationEngine {
    pub fn new(store: Arc<Store>, price_per_item: Amount, payment_address: String) -> Self {
        Self {
            store,
            price_per_item,
            payment_address,
            max_supply: MAX_SUPPLY,
        }
    }

    pub fn payment_address(&self) -> &str {
        &self.payment_address
    }

    /// Reserve `quantity` items and mint the correlation amount.
    ///
    /// The amount is `price * quantity + nextId` base units: the monotonic
    /// nonce keeps every session's expected amount distinct on the ledger,
    /// and the UNIQUE index on `amount_due` is the last line of defense.
    pub async fn create_intent(&self, quantity: i64) -> Result<PaymentIntent, EngineError> {
        if !(MIN_QUANTITY..=MAX_QUANTITY).contains(&quantity) {
            return Err(EngineError::InvalidQuantity(quantity));
        }

        let mut tx = self.store.pool().begin().await?;

        // 1. Enough unreserved inventory?
        let available: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM items WHERE claimed = 0 AND session_ref IS NULL AND id <= ?",
        )
        .bind(self.max_supply)
        .fetch_one(&mut *tx)
        .await?;
        if available < quantity {
            return Err(EngineError::InsufficientInventory {
                requested: quantity,
                available,
            });
        }

        // 2. Bump the monotonic session sequence. A dedicated counter (not
        //    MAX over live rows) stays monotonic across expiry deletes.
        let seq_raw: String = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(crate::store::SESSION_SEQ_KEY)
            .fetch_one(&mut *tx)
            .await?;
        let next_id = seq_raw.parse::<i64>().unwrap_or(0) + 1;
        sqlx::query("UPDATE settings SET value = ? WHERE key = ?")
            .bind(next_id.to_string())
            .bind(crate::store::SESSION_SEQ_KEY)
            .execute(&mut *tx)
            .await?;

        // 3. Correlation amount, integer arithmetic only.
        let amount_due = Amount::from_units(self.price_per_item.units() * quantity + next_id);

        // 4. 128 bits of entropy, hex-encoded, URL-safe.
        let session_id = hex::encode(rand::random::<[u8; 16]>());
        let now = Utc::now().timestamp();

        let insert = sqlx::query(
            r#"INSERT INTO sessions
                   (session_id, quantity, amount_due, status, created_at, updated_at)
               VALUES (?, ?, ?, 'pending', ?, ?)"#,
        )
        .bind(&session_id)
        .bind(quantity)
        .bind(amount_due.units())
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await;
        if let Err(e) = insert {
            let collided =
                matches!(&e, sqlx::Error::Database(db) if db.is_unique_violation());
            return Err(if collided {
                EngineError::AmountCollision
            } else {
                EngineError::Store(e)
            });
        }

        // 5. Reserve a random selection; the affected-rows check is the
        //    critical section guard.
        let reserved = sqlx::query(
            r#"UPDATE items SET session_ref = ?
               WHERE id IN (
                   SELECT id FROM items
                   WHERE claimed = 0 AND session_ref IS NULL AND id <= ?
                   ORDER BY RANDOM() LIMIT ?
               )"#,
        )
        .bind(&session_id)
        .bind(self.max_supply)
        .bind(quantity)
        .execute(&mut *tx)
        .await?
        .rows_affected();
        if reserved != quantity as u64 {
            return Err(EngineError::ReservationRace);
        }

        tx.commit().await?;
        info!(
            session_id,
            quantity,
            amount = %amount_due,
            "payment intent created"
        );

        Ok(PaymentIntent {
            session_id,
            amount_due,
            address: self.payment_address.clone(),
        })
    }

    /// Confirmed-payment completion: claim the session's reserved items and
    /// record the assignment. Idempotent — a no-op once the session has left
    /// `pending`/`payment_pending`.
    pub async fn assign_and_complete(
        &self,
        session_id: &str,
        txid: &str,
    ) -> Result<(), EngineError> {
        let mut tx = self.store.pool().begin().await?;

        let Some(row) = sqlx::query("SELECT quantity, status FROM sessions WHERE session_id = ?")
            .bind(session_id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            debug!(session_id, "completion for unknown session ignored");
            return Ok(());
        };
        let quantity: i64 = row.get("quantity");
        let status: String = row.get("status");
        match SessionStatus::parse(&status) {
            Some(SessionStatus::Pending) | Some(SessionStatus::PaymentPending) => {}
            _ => {
                debug!(session_id, status, "completion on settled session ignored");
                return Ok(());
            }
        }

        let reserved = sqlx::query(
            r#"SELECT id, content_ref FROM items
               WHERE session_ref = ? AND claimed = 0 AND id <= ?
               ORDER BY id"#,
        )
        .bind(session_id)
        .bind(self.max_supply)
        .fetch_all(&mut *tx)
        .await?;
        let now = Utc::now().timestamp();

        if (reserved.len() as i64) < quantity {
            // Reservations were lost; give the items back and park the
            // session. No automatic refund.
            sqlx::query("UPDATE items SET session_ref = NULL WHERE session_ref = ? AND claimed = 0")
                .bind(session_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query(
                "UPDATE sessions SET status = 'failed', txid = ?, updated_at = ? WHERE session_id = ?",
            )
            .bind(txid)
            .bind(now)
            .bind(session_id)
            .execute(&mut *tx)
            .await?;
            tx.commit().await?;
            warn!(
                session_id,
                txid,
                held = reserved.len(),
                quantity,
                "assignment shortage, session failed"
            );
            return Ok(());
        }

        sqlx::query("UPDATE items SET claimed = 1 WHERE session_ref = ? AND claimed = 0 AND id <= ?")
            .bind(session_id)
            .bind(self.max_supply)
            .execute(&mut *tx)
            .await?;

        let refs: Vec<String> = reserved
            .iter()
            .map(|r| r.get::<String, _>("content_ref"))
            .collect();
        let assigned = serde_json::to_string(&refs)?;
        sqlx::query(
            r#"UPDATE sessions
               SET status = 'complete', txid = ?, assigned_refs = ?, updated_at = ?
               WHERE session_id = ?"#,
        )
        .bind(txid)
        .bind(assigned)
        .bind(now)
        .bind(session_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        info!(session_id, txid, quantity, "session complete");
        Ok(())
    }

    /// Unconfirmed-payment signal from the mempool. Only a `pending`
    /// session moves; anything later (including `complete`) wins the race.
    pub async fn mark_payment_pending(
        &self,
        session_id: &str,
        txid: &str,
    ) -> Result<(), EngineError> {
        let now = Utc::now().timestamp();
        let moved = sqlx::query(
            r#"UPDATE sessions SET status = 'payment_pending', txid = ?, updated_at = ?
               WHERE session_id = ? AND status = 'pending'"#,
        )
        .bind(txid)
        .bind(now)
        .bind(session_id)
        .execute(self.store.pool())
        .await?
        .rows_affected();
        if moved > 0 {
            info!(session_id, txid, "payment detected in mempool");
        }
        Ok(())
    }

    /// Release one session's unclaimed reservations and drop the row.
    pub async fn expire(&self, session_id: &str) -> Result<(), EngineError> {
        let mut tx = self.store.pool().begin().await?;
        expire_in_tx(&mut tx, session_id).await?;
        tx.commit().await?;
        Ok(())
    }

    /// Sweep every timed-out session in one transaction. Returns the number
    /// of sessions released.
    pub async fn expire_stale(
        &self,
        pending_cutoff: i64,
        payment_pending_cutoff: i64,
    ) -> Result<u64, EngineError> {
        let mut tx = self.store.pool().begin().await?;

        let stale: Vec<String> = sqlx::query_scalar(
            r#"SELECT session_id FROM sessions
               WHERE (status = 'pending' AND created_at < ?)
                  OR (status = 'payment_pending' AND updated_at < ?)"#,
        )
        .bind(pending_cutoff)
        .bind(payment_pending_cutoff)
        .fetch_all(&mut *tx)
        .await?;

        for session_id in &stale {
            expire_in_tx(&mut tx, session_id).await?;
        }

        tx.commit().await?;
        Ok(stale.len() as u64)
    }
}

async fn expire_in_tx(
    tx: &mut sqlx::Transaction<'_, sqlx::Sqlite>,
    session_id: &str,
) -> Result<(), EngineError> {
    sqlx::query("UPDATE items SET session_ref = NULL WHERE session_ref = ? AND claimed = 0")
        .bind(session_id)
        .execute(&mut **tx)
        .await?;
    let deleted = sqlx::query(
        "DELETE FROM sessions WHERE session_id = ? AND status IN ('pending', 'payment_pending')",
    )
    .bind(session_id)
    .execute(&mut **tx)
    .await?
    .rows_affected();
    if deleted > 0 {
        info!(session_id, "session expired, reservations released");
    }
    Ok(())
}
