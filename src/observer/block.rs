//! Block Scanner
//!
//! Tails confirmed blocks, matches outputs paying the drop address against
//! the pending index by exact amount, and completes the matched sessions.
//! The cursor is persisted after each block, so a crash re-scans at most
//! one block; replay is safe because completion is idempotent.

use super::PendingIndex;
use crate::engine::ReservationEngine;
use crate::rpc::LedgerRpc;
use crate::store::{Store, CURSOR_KEY};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Fixed scan period. Confirmed-block scans are cheap relative to the
/// daily budget and correctness-critical, so this is not adaptive.
pub const SCAN_PERIOD: Duration = Duration::from_secs(120);

/// Pause between per-block fetches within one cycle.
pub const BLOCK_PAUSE: Duration = Duration::from_millis(250);

/// How far behind the tip a fresh deployment starts scanning.
pub const CURSOR_BACKFILL: u64 = 100;

/// What a single cycle did, for logs and tests.
#[derive(Debug, PartialEq, Eq)]
pub enum ScanOutcome {
    /// No open sessions, nothing to look for.
    Idle,
    /// Upstream unavailable or a completion failed; cycle aborted early.
    Skipped,
    Scanned { blocks: u64, matched: u64 },
}

pub struct BlockScanner {
    store: Arc<Store>,
    engine: Arc<ReservationEngine>,
    rpc: Arc<dyn LedgerRpc>,
    payment_address: String,
}

impl BlockScanner {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<ReservationEngine>,
        rpc: Arc<dyn LedgerRpc>,
        payment_address: String,
    ) -> Self {
        Self {
            store,
            engine,
            rpc,
            payment_address,
        }
    }

    pub async fn run(self) {
        info!(period = ?SCAN_PERIOD, "block scanner started");
        loop {
            match self.scan_once().await {
                Ok(ScanOutcome::Scanned { blocks, matched }) if blocks > 0 => {
                    info!(blocks, matched, "block scan cycle finished");
                }
                Ok(_) => {}
                Err(e) => error!(error = %e, "block scan cycle failed"),
            }
            sleep(SCAN_PERIOD).await;
        }
    }

    /// One full cycle: rebuild the index, then walk `(cursor, tip]`.
    pub async fn scan_once(&self) -> Result<ScanOutcome, sqlx::Error> {
        let mut index = PendingIndex::load(&self.store).await?;
        if index.is_empty() {
            debug!("no open sessions, block scanner idle");
            return Ok(ScanOutcome::Idle);
        }

        let Some(tip) = self.rpc.tip_height().await else {
            warn!("tip height unavailable, skipping block scan cycle");
            return Ok(ScanOutcome::Skipped);
        };

        let cursor = match self.store.setting(CURSOR_KEY).await? {
            Some(raw) => raw.parse::<u64>().unwrap_or(tip.saturating_sub(CURSOR_BACKFILL)),
            None => tip.saturating_sub(CURSOR_BACKFILL),
        };

        let mut blocks = 0u64;
        let mut matched = 0u64;
        for height in (cursor + 1)..=tip {
            let Some(hash) = self.rpc.block_hash(height).await else {
                warn!(height, "block hash unavailable, aborting cycle");
                return Ok(ScanOutcome::Skipped);
            };
            let Some(block) = self.rpc.block(&hash).await else {
                warn!(height, "block unavailable, aborting cycle");
                return Ok(ScanOutcome::Skipped);
            };

            for tx in &block.tx {
                for output in &tx.vout {
                    if !output.pays_to(&self.payment_address) {
                        continue;
                    }
                    let Some(amount) = output.amount() else {
                        continue;
                    };
                    let key = amount.to_string();
                    let Some(entry) = index.lookup(&key) else {
                        continue;
                    };
                    let session_id = entry.session_id.clone();
                    // Abort before the cursor moves if completion fails, so
                    // this block is re-scanned next cycle.
                    if let Err(e) = self.engine.assign_and_complete(&session_id, &tx.txid).await {
                        error!(session_id, error = %e, "completion failed, aborting cycle");
                        return Ok(ScanOutcome::Skipped);
                    }
                    index.remove(&key);
                    matched += 1;
                    info!(session_id, txid = %tx.txid, height, "confirmed payment matched");
                }
            }

            self.store
                .put_setting(CURSOR_KEY, &height.to_string())
                .await?;
            blocks += 1;
            sleep(BLOCK_PAUSE).await;
        }

        Ok(ScanOutcome::Scanned { blocks, matched })
    }
}
