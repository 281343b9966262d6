//! Scheduler daemon: load configuration, open the store, run the loop until Ctrl-C.
//!
//! Usage: `sleeplessd [config.json]`. Without an argument the path comes from
//! `SLEEPLESS_CONFIG`; without either, built-in defaults are used.

use anyhow::Context;
use sleepless_scheduler::builders::build_runtime;
use sleepless_scheduler::config::SchedulerConfig;
use sleepless_scheduler::core::AppResult;
use sleepless_scheduler::util::init_tracing;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[tokio::main]
async fn main() -> AppResult<()> {
    dotenvy::dotenv().ok();
    init_tracing("info");

    let path = std::env::args()
        .nth(1)
        .or_else(|| std::env::var("SLEEPLESS_CONFIG").ok());
    let mut cfg = match &path {
        Some(path) => SchedulerConfig::from_json_file(path)
            .with_context(|| format!("loading configuration from {path}"))?,
        None => SchedulerConfig::default(),
    };
    cfg.apply_env_overrides()
        .context("applying environment overrides")?;

    let runtime = build_runtime(&cfg)?;
    let shutdown = CancellationToken::new();
    let handle = runtime.scheduler.clone().spawn(shutdown.clone());

    tokio::signal::ctrl_c()
        .await
        .context("waiting for shutdown signal")?;
    info!("shutdown requested");
    shutdown.cancel();
    handle.await.context("scheduler task panicked")?;
    info!(pending = runtime.store.pending_ids().len(), "daemon stopped");
    Ok(())
}
