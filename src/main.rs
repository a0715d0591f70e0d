use anyhow::Context;
use std::sync::Arc;
use tracing::info;

use mintgate::config::AppConfig;
use mintgate::engine::ReservationEngine;
use mintgate::gateway::{self, AppState};
use mintgate::observer::{BlockScanner, Cadence, MempoolScanner};
use mintgate::rpc::{LedgerClient, LedgerRpc, RpcPool};
use mintgate::store::Store;
use mintgate::sweeper::{Sweeper, SESSION_TIMEOUT_SECS};
use mintgate::{amount, logging};

const CONFIG_PATH: &str = "config/mintgate.yaml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load(CONFIG_PATH).context("configuration")?;
    let _log_guard = logging::init_logging(&config);
    info!(
        version = env!("CARGO_PKG_VERSION"),
        rev = env!("GIT_HASH"),
        "mintgate starting"
    );

    let store = Arc::new(
        Store::connect(&config.database_path)
            .await
            .with_context(|| format!("opening store at {}", config.database_path))?,
    );
    store.init_schema().await.context("store schema")?;

    let price: amount::Amount = config
        .price_per_item()
        .map_err(|e| anyhow::anyhow!("price_per_item: {e}"))?;
    let engine = Arc::new(ReservationEngine::new(
        store.clone(),
        price,
        config.payment.address.clone(),
    ));

    let pool = Arc::new(RpcPool::new(config.rpc.clone()).context("rpc pool")?);
    let ledger: Arc<dyn LedgerRpc> = Arc::new(LedgerClient::new(pool));
    let cadence = Arc::new(Cadence::new());

    let block_scanner = BlockScanner::new(
        store.clone(),
        engine.clone(),
        ledger.clone(),
        config.payment.address.clone(),
    );
    let mempool_scanner = MempoolScanner::new(
        store.clone(),
        engine.clone(),
        ledger.clone(),
        config.payment.address.clone(),
        cadence,
    );
    let sweeper = Sweeper::new(engine.clone());

    let block_task = tokio::spawn(block_scanner.run());
    let mempool_task = tokio::spawn(mempool_scanner.run());
    let sweeper_task = tokio::spawn(sweeper.run());

    let state = AppState::new(store, engine, SESSION_TIMEOUT_SECS);
    gateway::run_server(config.server.port, state, async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown signal received");
    })
    .await
    .context("http server")?;

    // The loops never return on their own; stop them on server shutdown.
    block_task.abort();
    mempool_task.abort();
    sweeper_task.abort();
    info!("mintgate stopped");
    Ok(())
}
