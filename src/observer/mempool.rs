//! Mempool Scanner
//!
//! Early payment detection: peeks at unconfirmed transactions paying the
//! drop address and flips matched sessions to `payment_pending`, which
//! shields them from the sweeper while their transaction confirms. Runs on
//! the adaptive cadence and is the first thing throttled when upstream
//! quota runs low.

use super::{Cadence, PendingIndex};
use crate::engine::ReservationEngine;
use crate::rpc::{cost, LedgerRpc};
use crate::store::Store;
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Skip the cycle entirely below this much remaining daily quota.
pub const MIN_CAPACITY: u64 = 5000;

/// Hard per-cycle transaction budget.
pub const MAX_BATCH: usize = 150;

/// Pause between per-transaction fetches.
pub const TX_PAUSE: Duration = Duration::from_millis(100);

/// Bounded memory of txids already inspected.
pub const RECENT_CAPACITY: usize = 500;

/// Insertion-ordered set that forgets its oldest entries past a cap.
#[derive(Debug, Default)]
pub struct RecentlyChecked {
    seen: HashSet<String>,
    order: VecDeque<String>,
}

impl RecentlyChecked {
    pub fn contains(&self, txid: &str) -> bool {
        self.seen.contains(txid)
    }

    pub fn insert(&mut self, txid: String) {
        if self.seen.insert(txid.clone()) {
            self.order.push_back(txid);
        }
    }

    /// Keep only the most recent `RECENT_CAPACITY` entries.
    pub fn trim(&mut self) {
        while self.order.len() > RECENT_CAPACITY {
            if let Some(evicted) = self.order.pop_front() {
                self.seen.remove(&evicted);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

pub struct MempoolScanner {
    store: Arc<Store>,
    engine: Arc<ReservationEngine>,
    rpc: Arc<dyn LedgerRpc>,
    payment_address: String,
    cadence: Arc<Cadence>,
    recently_checked: RecentlyChecked,
}

impl MempoolScanner {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<ReservationEngine>,
        rpc: Arc<dyn LedgerRpc>,
        payment_address: String,
        cadence: Arc<Cadence>,
    ) -> Self {
        Self {
            store,
            engine,
            rpc,
            payment_address,
            cadence,
            recently_checked: RecentlyChecked::default(),
        }
    }

    pub async fn run(mut self) {
        info!("mempool scanner started");
        loop {
            if let Err(e) = self.scan_once().await {
                error!(error = %e, "mempool scan cycle failed");
            }
            sleep(self.cadence.current()).await;
        }
    }

    /// One cycle plus the cadence update for the sleep that follows it.
    pub async fn scan_once(&mut self) -> Result<(), sqlx::Error> {
        let result = self.cycle().await;
        let capacity = self.rpc.capacity().await;
        self.cadence.publish(&capacity);
        result
    }

    /// Capacity gate, index rebuild, bounded mempool walk.
    async fn cycle(&mut self) -> Result<(), sqlx::Error> {
        let capacity = self.rpc.capacity().await;
        if capacity.remaining < MIN_CAPACITY {
            debug!(
                remaining = capacity.remaining,
                "low quota, skipping mempool cycle"
            );
            return Ok(());
        }

        let index = PendingIndex::load(&self.store).await?;
        if index.is_empty() {
            debug!("no open sessions, mempool scanner idle");
            return Ok(());
        }

        let Some(mempool) = self.rpc.raw_mempool().await else {
            warn!("mempool unavailable, skipping cycle");
            return Ok(());
        };

        let candidates = select_candidates(mempool, &self.recently_checked, capacity.remaining);
        debug!(
            candidates = candidates.len(),
            open_sessions = index.len(),
            "mempool cycle"
        );

        for txid in candidates {
            let Some(tx) = self.rpc.raw_transaction(&txid).await else {
                warn!(txid, "transaction fetch failed, ending cycle early");
                break;
            };

            for output in &tx.vout {
                if !output.pays_to(&self.payment_address) {
                    continue;
                }
                let Some(amount) = output.amount() else {
                    continue;
                };
                if let Some(entry) = index.lookup(&amount.to_string()) {
                    if let Err(e) = self
                        .engine
                        .mark_payment_pending(&entry.session_id, &txid)
                        .await
                    {
                        error!(session_id = %entry.session_id, error = %e, "mempool transition failed");
                    }
                }
            }

            self.recently_checked.insert(txid);
            sleep(TX_PAUSE).await;
        }

        self.recently_checked.trim();
        Ok(())
    }
}

/// Unseen prefix of the mempool, bounded by both the hard batch cap and
/// the verbose fetches the remaining quota can still afford.
fn select_candidates(
    mempool: Vec<String>,
    recently_checked: &RecentlyChecked,
    remaining: u64,
) -> Vec<String> {
    let budget = MAX_BATCH.min((remaining / cost::GET_RAW_TRANSACTION) as usize);
    mempool
        .into_iter()
        .filter(|txid| !recently_checked.contains(txid))
        .take(budget)
        .collect()
}
