use std::sync::Arc;

use crate::engine::ReservationEngine;
use crate::store::Store;

/// Shared state for the public API handlers.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub engine: Arc<ReservationEngine>,
    /// A `pending` session older than this reads as expired even before the
    /// sweeper collects it.
    pub session_timeout_secs: i64,
}

impl AppState {
    pub fn new(
        store: Arc<Store>,
        engine: Arc<ReservationEngine>,
        session_timeout_secs: i64,
    ) -> Self {
        Self {
            store,
            engine,
            session_timeout_secs,
        }
    }
}
