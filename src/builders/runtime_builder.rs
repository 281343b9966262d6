//! Assemble a scheduler runtime from configuration.

use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};

use crate::api::Lifecycle;
use crate::config::SchedulerConfig;
use crate::core::{
    AppResult, CliExecutor, CliUsageOracle, DirWorkspace, NoWorkspace, Scheduler, TaskExecutor,
    TaskStore, TracingAuditSink, UsageOracle, WindowGate, Workspace,
};
use crate::infra::JsonlBackend;
use crate::util::clock::{Clock, SystemClock};

/// Components sharing one task store.
pub struct Runtime<E: TaskExecutor> {
    /// The task store.
    pub store: Arc<TaskStore>,
    /// Admission loop, ready to spawn.
    pub scheduler: Arc<Scheduler<E>>,
    /// Front-end surface.
    pub lifecycle: Lifecycle,
}

/// Build a runtime that drives the agent CLI and persists under `cfg.data_dir`.
///
/// Fails when the configuration is invalid or the store cannot be opened or
/// reconciled; both are fatal at startup.
pub fn build_runtime(cfg: &SchedulerConfig) -> AppResult<Runtime<CliExecutor>> {
    let oracle: Arc<dyn UsageOracle> = Arc::new(CliUsageOracle::new(
        cfg.agent.usage_command.clone(),
        cfg.usage_timeout(),
        cfg.usage_cache_ttl(),
    )
    .with_pty(cfg.agent.usage_pty));
    let executor = CliExecutor::new(cfg.executor_config());
    build_runtime_with(cfg, oracle, executor, Arc::new(SystemClock))
}

/// Build a runtime around caller-supplied oracle, executor and clock.
pub fn build_runtime_with<E: TaskExecutor>(
    cfg: &SchedulerConfig,
    oracle: Arc<dyn UsageOracle>,
    executor: E,
    clock: Arc<dyn Clock>,
) -> AppResult<Runtime<E>> {
    cfg.validate().context("configuration rejected")?;

    let backend = JsonlBackend::new(&cfg.data_dir)
        .with_context(|| format!("cannot open task log in {}", cfg.data_dir.display()))?;
    let store = TaskStore::open(Box::new(backend))
        .context("cannot load task store")?
        .with_audit(Box::new(TracingAuditSink));
    let store = Arc::new(store);

    let orphans = store
        .reconcile_orphans(cfg.recovery_policy, clock.now_utc())
        .context("cannot reconcile tasks interrupted by the previous run")?;
    if !orphans.is_empty() {
        warn!(count = orphans.len(), policy = ?cfg.recovery_policy, "recovered orphaned tasks");
    }

    let workspace: Arc<dyn Workspace> = match &cfg.workspace_root {
        Some(root) => Arc::new(DirWorkspace::new(root)),
        None => Arc::new(NoWorkspace),
    };
    let gate = WindowGate::new(cfg.window());

    let scheduler = Scheduler::new(
        Arc::clone(&store),
        gate,
        Arc::clone(&oracle),
        executor,
        cfg.admission_policy(),
    )
    .with_clock(Arc::clone(&clock))
    .with_workspace(workspace)
    .with_poll_interval(cfg.poll_interval());
    let lifecycle = Lifecycle::new(Arc::clone(&store), gate, oracle).with_clock(clock);

    info!(
        window_start = cfg.night_start_hour,
        window_end = cfg.night_end_hour,
        day_threshold_pct = cfg.day_threshold_pct,
        night_threshold_pct = cfg.night_threshold_pct,
        data_dir = %cfg.data_dir.display(),
        "runtime built"
    );

    Ok(Runtime {
        store,
        scheduler: Arc::new(scheduler),
        lifecycle,
    })
}
