//! Tests for builder modules

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Local, TimeZone};
use sleepless_scheduler::builders::build_runtime_with;
use sleepless_scheduler::config::SchedulerConfig;
use sleepless_scheduler::core::{
    ExecutionRequest, ExecutionResult, NewTask, OracleError, RecoveryPolicy, TaskExecutor,
    TaskState, UsageOracle, UsageReading,
};
use sleepless_scheduler::util::FixedClock;
use tokio_util::sync::CancellationToken;

struct LowUsage;

#[async_trait]
impl UsageOracle for LowUsage {
    async fn current_usage(&self) -> Result<UsageReading, OracleError> {
        Ok(UsageReading {
            pct: 5.0,
            resets_at: None,
            observed_at: chrono::Utc::now(),
        })
    }
}

struct Echo;

#[async_trait]
impl TaskExecutor for Echo {
    async fn run(&self, request: ExecutionRequest, _cancel: CancellationToken) -> ExecutionResult {
        Ok(format!(
            "ran in {:?}",
            request.workspace.map(|p| p.ends_with("projects/site"))
        ))
    }
}

fn config(dir: &std::path::Path) -> SchedulerConfig {
    SchedulerConfig {
        data_dir: dir.join("data"),
        workspace_root: Some(dir.join("work")),
        ..SchedulerConfig::default()
    }
}

fn night() -> Arc<FixedClock> {
    Arc::new(FixedClock::new(
        Local.with_ymd_and_hms(2026, 1, 14, 23, 0, 0).single().unwrap(),
    ))
}

#[tokio::test]
async fn test_runtime_shares_one_store() {
    let dir = tempfile::tempdir().unwrap();
    let runtime = build_runtime_with(&config(dir.path()), Arc::new(LowUsage), Echo, night()).unwrap();

    let task = runtime
        .lifecycle
        .submit(NewTask::for_project("site", "ship it"))
        .unwrap();
    runtime.scheduler.run_cycle().await;

    let done = runtime.store.get(task.id).unwrap();
    assert_eq!(done.state, TaskState::Completed);
    assert_eq!(done.result.as_deref(), Some("ran in Some(true)"));
    assert!(dir.path().join("work/projects/site").is_dir());
    assert!(dir.path().join("data/tasks.jsonl").is_file());
}

#[tokio::test]
async fn test_runtime_reconciles_orphans_on_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.recovery_policy = RecoveryPolicy::Cancel;
    let id = {
        let runtime = build_runtime_with(&cfg, Arc::new(LowUsage), Echo, night()).unwrap();
        let task = runtime.lifecycle.submit(NewTask::quick("long job")).unwrap();
        runtime
            .store
            .claim_next(&cfg.primary_profile, CancellationToken::new(), chrono::Utc::now())
            .unwrap();
        task.id
    };

    let runtime = build_runtime_with(&cfg, Arc::new(LowUsage), Echo, night()).unwrap();
    assert_eq!(runtime.store.get(id).unwrap().state, TaskState::Cancelled);
}

#[test]
fn test_invalid_config_aborts_build() {
    let dir = tempfile::tempdir().unwrap();
    let mut cfg = config(dir.path());
    cfg.poll_interval_secs = 0;
    assert!(build_runtime_with(&cfg, Arc::new(LowUsage), Echo, night()).is_err());
}
