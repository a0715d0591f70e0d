//! Public API Adapter
//!
//! Thin boundary over the engine and the store: four routes, no business
//! logic of its own.

pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    routing::{get, post},
};
use tokio::net::TcpListener;
use tracing::info;

pub use state::AppState;

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/mint-progress", get(handlers::mint_progress))
        .route("/create-payment-intent", post(handlers::create_payment_intent))
        .route(
            "/check-payment-status/{session_id}",
            get(handlers::check_payment_status),
        )
        .route("/health", get(handlers::health))
        .with_state(state)
}

/// Bind and serve until the shutdown future resolves.
pub async fn run_server(
    port: u16,
    state: AppState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr).await?;
    info!(%addr, "gateway listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
