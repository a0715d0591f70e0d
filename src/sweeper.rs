//! Session Sweeper
//!
//! The only component allowed to release reservations without an observed
//! payment. Timeouts are asymmetric on purpose: abandoned `pending`
//! sessions go quickly, `payment_pending` sessions get a day in case their
//! transaction is merely slow to confirm.

use crate::engine::ReservationEngine;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, error, info};

pub const SWEEP_PERIOD: Duration = Duration::from_secs(60);

/// How long a `pending` session may wait for its first payment signal.
pub const SESSION_TIMEOUT_SECS: i64 = 600;

/// How long a `payment_pending` session may wait for confirmation. Covers
/// transactions that were replaced or dropped and will never confirm.
pub const PAYMENT_PENDING_TIMEOUT_SECS: i64 = 86_400;

pub struct Sweeper {
    engine: Arc<ReservationEngine>,
    session_timeout_secs: i64,
    payment_pending_timeout_secs: i64,
}

impl Sweeper {
    pub fn new(engine: Arc<ReservationEngine>) -> Self {
        Self {
            engine,
            session_timeout_secs: SESSION_TIMEOUT_SECS,
            payment_pending_timeout_secs: PAYMENT_PENDING_TIMEOUT_SECS,
        }
    }

    pub async fn run(self) {
        info!(period = ?SWEEP_PERIOD, "sweeper started");
        loop {
            match self.sweep_once().await {
                Ok(released) if released > 0 => {
                    info!(released, "sweeper released stale sessions");
                }
                Ok(_) => debug!("sweeper pass, nothing stale"),
                Err(e) => error!(error = %e, "sweeper pass failed"),
            }
            sleep(SWEEP_PERIOD).await;
        }
    }

    pub async fn sweep_once(&self) -> Result<u64, crate::engine::EngineError> {
        let now = Utc::now().timestamp();
        self.engine
            .expire_stale(
                now - self.session_timeout_secs,
                now - self.payment_pending_timeout_secs,
            )
            .await
    }
}
