//! Adaptive polling cadence for the mempool scanner.
//!
//! The mempool loop recomputes the period from pool quota utilization
//! after each cycle and publishes it here; the sleep at the end of the
//! loop reads whatever was last published.

use crate::rpc::PoolCapacity;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

pub const FASTEST_SECS: u64 = 60;
pub const SLOWEST_SECS: u64 = 300;

#[derive(Debug)]
pub struct Cadence {
    period_secs: AtomicU64,
}

impl Default for Cadence {
    fn default() -> Self {
        Self::new()
    }
}

impl Cadence {
    pub fn new() -> Self {
        Self {
            period_secs: AtomicU64::new(FASTEST_SECS),
        }
    }

    pub fn current(&self) -> Duration {
        Duration::from_secs(self.period_secs.load(Ordering::Relaxed))
    }

    /// Re-derive the period from quota utilization `u = 1 - remaining/total`
    /// over enabled endpoints and publish it. Integer comparisons only:
    /// `u > 0.8` is `remaining * 5 < total`, and so on down the ladder.
    pub fn publish(&self, capacity: &PoolCapacity) -> u64 {
        let remaining = capacity.remaining;
        let total = capacity.daily_total;
        let period = if total == 0 {
            // Nothing enabled: crawl until the daily reset rehabilitates.
            SLOWEST_SECS
        } else if remaining * 5 < total {
            300
        } else if remaining * 5 < total * 2 {
            180
        } else if remaining * 5 < total * 3 {
            120
        } else {
            FASTEST_SECS
        };
        self.period_secs.store(period, Ordering::Relaxed);
        period
    }
}
