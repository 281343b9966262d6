//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Local, TimeZone, Utc};
use parking_lot::Mutex;
use sleepless_scheduler::core::{
    AdmissionPolicy, AuditEvent, AuditSink, ExecutionProfile, ExecutionRequest, ExecutionResult,
    ExecutionWindow, OracleError, Scheduler, StoreBackend, StoreError, StoreRecord,
    TaskExecutor, TaskStore, UsageOracle, UsageReading, WindowGate,
};
use sleepless_scheduler::infra::InMemoryBackend;
use sleepless_scheduler::util::FixedClock;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

/// 22:00 to 07:00 window, 20% by day, 80% at night.
pub fn night_window() -> ExecutionWindow {
    ExecutionWindow {
        start_hour: 22,
        end_hour: 7,
        day_threshold_pct: 20.0,
        night_threshold_pct: 80.0,
    }
}

pub fn local(hour: u32, minute: u32) -> DateTime<Local> {
    Local
        .with_ymd_and_hms(2026, 1, 14, hour, minute, 0)
        .single()
        .expect("unambiguous local time")
}

pub fn night_clock() -> FixedClock {
    FixedClock::new(local(23, 0))
}

pub fn utc(day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, day, hour, 0, 0)
        .single()
        .expect("valid utc time")
}

pub fn memory_store() -> Arc<TaskStore> {
    Arc::new(TaskStore::open(Box::new(InMemoryBackend::new())).expect("open in-memory store"))
}

pub fn primary() -> ExecutionProfile {
    ExecutionProfile::new("primary", "opus")
}

pub fn policy(max_retries: u32) -> AdmissionPolicy {
    AdmissionPolicy::primary_only(primary(), max_retries)
}

pub fn scheduler<E: TaskExecutor>(
    store: &Arc<TaskStore>,
    oracle: &Arc<FakeOracle>,
    executor: E,
    clock: &FixedClock,
    policy: AdmissionPolicy,
) -> Scheduler<E> {
    Scheduler::new(
        Arc::clone(store),
        WindowGate::new(night_window()),
        Arc::clone(oracle) as Arc<dyn UsageOracle>,
        executor,
        policy,
    )
    .with_clock(Arc::new(clock.clone()))
}

/// Oracle returning a settable percentage or failure.
pub struct FakeOracle {
    reading: Mutex<Result<f64, String>>,
    delay: Duration,
    calls: AtomicUsize,
}

impl FakeOracle {
    pub fn at(pct: f64) -> Arc<Self> {
        Self::slow(pct, Duration::ZERO)
    }

    /// Answers `pct` after `delay`.
    pub fn slow(pct: f64, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            reading: Mutex::new(Ok(pct)),
            delay,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable(reason: &str) -> Arc<Self> {
        Arc::new(Self {
            reading: Mutex::new(Err(reason.to_owned())),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn set(&self, pct: f64) {
        *self.reading.lock() = Ok(pct);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UsageOracle for FakeOracle {
    async fn current_usage(&self) -> Result<UsageReading, OracleError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match &*self.reading.lock() {
            Ok(pct) => Ok(UsageReading {
                pct: *pct,
                resets_at: None,
                observed_at: Utc::now(),
            }),
            Err(reason) => Err(OracleError::Unavailable(reason.clone())),
        }
    }
}

/// Executor replaying queued outcomes, succeeding once the script runs out.
#[derive(Clone, Default)]
pub struct ScriptedExecutor {
    outcomes: Arc<Mutex<VecDeque<ExecutionResult>>>,
    runs: Arc<Mutex<Vec<ExecutionRequest>>>,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, outcome: ExecutionResult) {
        self.outcomes.lock().push_back(outcome);
    }

    pub fn runs(&self) -> Vec<ExecutionRequest> {
        self.runs.lock().clone()
    }
}

#[async_trait]
impl TaskExecutor for ScriptedExecutor {
    async fn run(&self, request: ExecutionRequest, _cancel: CancellationToken) -> ExecutionResult {
        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("done: {}", request.task.content)));
        self.runs.lock().push(request);
        outcome
    }
}

/// Executor that blocks until released or cancelled.
#[derive(Clone, Default)]
pub struct BlockingExecutor {
    pub started: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[async_trait]
impl TaskExecutor for BlockingExecutor {
    async fn run(&self, request: ExecutionRequest, cancel: CancellationToken) -> ExecutionResult {
        self.started.notify_one();
        tokio::select! {
            () = cancel.cancelled() => Err(sleepless_scheduler::core::ExecutorError::Cancelled),
            () = self.release.notified() => Ok(format!("released: {}", request.task.content)),
        }
    }
}

/// Backend whose writes can be made to fail on demand.
#[derive(Clone, Default)]
pub struct FlakyBackend {
    inner: InMemoryBackend,
    failing: Arc<Mutex<bool>>,
    lands_then_fails: Arc<Mutex<bool>>,
}

impl FlakyBackend {
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    /// Appends reach storage but still report an error, like a failed fsync.
    pub fn set_lands_then_fails(&self, on: bool) {
        *self.lands_then_fails.lock() = on;
    }

    pub fn records(&self) -> Vec<StoreRecord> {
        self.inner.records()
    }

    fn check(&self) -> Result<(), StoreError> {
        if *self.failing.lock() {
            return Err(StoreError::Backend("disk unavailable".into()));
        }
        Ok(())
    }
}

impl StoreBackend for FlakyBackend {
    fn load(&mut self) -> Result<Vec<StoreRecord>, StoreError> {
        self.check()?;
        self.inner.load()
    }

    fn append(&mut self, records: &[StoreRecord]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.append(records)?;
        if *self.lands_then_fails.lock() {
            return Err(StoreError::Backend("sync failed".into()));
        }
        Ok(())
    }

    fn compact(&mut self, records: &[StoreRecord]) -> Result<(), StoreError> {
        self.check()?;
        self.inner.compact(records)
    }
}

/// Audit sink whose events stay readable after the store takes ownership.
#[derive(Clone, Default)]
pub struct SharedAudit {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl SharedAudit {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    pub fn actions(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.action.clone()).collect()
    }
}

impl AuditSink for SharedAudit {
    fn record(&mut self, event: AuditEvent) {
        self.events.lock().push(event);
    }
}
