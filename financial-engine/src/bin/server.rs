//! Process bootstrap for the financial engine: logging, configuration,
//! connecting the shard router, and the idempotency sweeper's background
//! loop. Grounded on `services::account_monitor`'s `main.rs` for the
//! logging-init/config-load/background-job shape, stripped of its
//! `actix_web` HTTP server and `/health`/`/metrics` routes — the engine's
//! operations are a library surface (spec Non-goals exclude HTTP routing
//! and health endpoints), not something this binary serves itself.

use financial_engine::{EngineConfig, FinancialEngine};
use shard_router::{RouterConfig, ShardRouter};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("financial engine starting");

    let router_config = match std::env::var("ROUTER_CONFIG_PATH") {
        Ok(path) => RouterConfig::from_file(&path)?,
        Err(_) => RouterConfig::from_env()?,
    };
    let engine_config = match std::env::var("ENGINE_CONFIG_PATH") {
        Ok(path) => EngineConfig::from_file(&path)?,
        Err(_) => EngineConfig::default(),
    };

    let router = Arc::new(ShardRouter::connect(router_config).await?);
    info!(shards = router.shard_count(), "connected to every shard");

    let engine = Arc::new(FinancialEngine::new(router.clone(), engine_config));

    let sweeper = engine
        .idempotency()
        .clone()
        .spawn_sweeper(Duration::from_secs(300));

    info!("financial engine ready");

    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received, draining");

    sweeper.abort();
    router.close().await;

    Ok(())
}
