//! Scheduler loop: the only path that moves a task into `running`.
//!
//! Each cycle checks, in order: the execution slot, the time window, the usage
//! reading against the window's threshold, and finally claims the oldest
//! pending task from the store in one admission transaction. The claimed task
//! then runs to a terminal outcome before the next cycle can admit another.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::executor::{ExecutionRequest, TaskExecutor};
use crate::core::task::{ExecutionProfile, TaskId, TaskState};
use crate::core::task_store::TaskStore;
use crate::core::usage::UsageOracle;
use crate::core::window::WindowGate;
use crate::core::workspace::{NoWorkspace, Workspace};
use crate::core::ExecutorError;
use crate::util::clock::{Clock, SystemClock};

/// Profile selection and retry budget applied at admission.
#[derive(Debug, Clone)]
pub struct AdmissionPolicy {
    /// Profile used by default.
    pub primary: ExecutionProfile,
    /// Cheaper profile used when usage runs high.
    pub fallback: Option<ExecutionProfile>,
    /// Usage at or above which the fallback profile is chosen.
    pub fallback_above_pct: Option<f64>,
    /// Retryable failures tolerated before a task is marked failed.
    pub max_retries: u32,
}

impl AdmissionPolicy {
    /// Policy that always uses `primary`.
    pub const fn primary_only(primary: ExecutionProfile, max_retries: u32) -> Self {
        Self {
            primary,
            fallback: None,
            fallback_above_pct: None,
            max_retries,
        }
    }

    /// Profile for a task admitted at `usage_pct`.
    pub fn select_profile(&self, usage_pct: f64) -> &ExecutionProfile {
        match (&self.fallback, self.fallback_above_pct) {
            (Some(fallback), Some(limit)) if usage_pct >= limit => fallback,
            _ => &self.primary,
        }
    }
}

/// What a single scheduler cycle did.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// A task already holds the execution slot.
    Busy(TaskId),
    /// The current time is outside the execution window.
    OutsideWindow,
    /// Usage could not be determined; starting is denied.
    UsageUnavailable(String),
    /// Usage is at or above the threshold in force.
    OverThreshold {
        /// Reported usage.
        usage_pct: f64,
        /// Threshold in force.
        threshold_pct: f64,
    },
    /// Nothing is pending.
    Idle,
    /// Shutdown was requested before a task was admitted.
    ShuttingDown,
    /// The store could not record the admission.
    StoreFailed(String),
    /// A task ran and reached this state.
    Ran {
        /// The admitted task.
        task_id: TaskId,
        /// State recorded after the run.
        state: TaskState,
    },
}

/// Periodic admission loop over a [`TaskStore`].
pub struct Scheduler<E: TaskExecutor> {
    store: Arc<TaskStore>,
    gate: WindowGate,
    oracle: Arc<dyn UsageOracle>,
    executor: E,
    workspace: Arc<dyn Workspace>,
    clock: Arc<dyn Clock>,
    policy: AdmissionPolicy,
    poll_interval: Duration,
}

impl<E: TaskExecutor> Scheduler<E> {
    /// Create a scheduler polling once a minute with the system clock.
    pub fn new(
        store: Arc<TaskStore>,
        gate: WindowGate,
        oracle: Arc<dyn UsageOracle>,
        executor: E,
        policy: AdmissionPolicy,
    ) -> Self {
        Self {
            store,
            gate,
            oracle,
            executor,
            workspace: Arc::new(NoWorkspace),
            clock: Arc::new(SystemClock),
            policy,
            poll_interval: Duration::from_secs(60),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the workspace resolver.
    #[must_use]
    pub fn with_workspace(mut self, workspace: Arc<dyn Workspace>) -> Self {
        self.workspace = workspace;
        self
    }

    /// Set the interval between cycles.
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// The store this scheduler admits from.
    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Run one admission cycle. Never fails; every problem becomes a skip.
    pub async fn run_cycle(&self) -> CycleOutcome {
        self.cycle(&CancellationToken::new()).await
    }

    /// One cycle that admits nothing once `shutdown` fires. The admitted run's
    /// token is a child of `shutdown`, so a stop requested mid-cycle still
    /// interrupts it.
    async fn cycle(&self, shutdown: &CancellationToken) -> CycleOutcome {
        if let Some(id) = self.store.running_id() {
            debug!(task_id = id, "cycle skipped; task in flight");
            return CycleOutcome::Busy(id);
        }

        let local = self.clock.now_local();
        if !self.gate.is_execution_permitted(&local) {
            debug!(hour = %local.format("%H:%M"), "cycle skipped; outside execution window");
            return CycleOutcome::OutsideWindow;
        }
        let threshold_pct = self.gate.current_threshold(&local);

        let usage = tokio::select! {
            usage = self.oracle.current_usage() => usage,
            () = shutdown.cancelled() => {
                debug!("cycle abandoned during usage check; shutting down");
                return CycleOutcome::ShuttingDown;
            }
        };
        let reading = match usage {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "cycle skipped; usage unavailable");
                return CycleOutcome::UsageUnavailable(e.to_string());
            }
        };
        if reading.pct >= threshold_pct {
            warn!(
                usage_pct = reading.pct,
                threshold_pct, "cycle skipped; usage threshold exceeded"
            );
            return CycleOutcome::OverThreshold {
                usage_pct: reading.pct,
                threshold_pct,
            };
        }

        if shutdown.is_cancelled() {
            return CycleOutcome::ShuttingDown;
        }
        let profile = self.policy.select_profile(reading.pct).clone();
        let cancel = shutdown.child_token();
        let task = match self.store.claim_next(&profile, cancel.clone(), self.clock.now_utc()) {
            Ok(Some(task)) => task,
            Ok(None) => {
                return self
                    .store
                    .running_id()
                    .map_or(CycleOutcome::Idle, CycleOutcome::Busy);
            }
            Err(e) => {
                error!(error = %e, "admission not persisted; retrying next cycle");
                return CycleOutcome::StoreFailed(e.to_string());
            }
        };
        info!(
            task_id = task.id,
            usage_pct = reading.pct,
            threshold_pct,
            profile = %profile.name,
            "task admitted"
        );

        let task_id = task.id;
        let outcome = match self.workspace.task_dir(&task) {
            Ok(workspace) => {
                let request = ExecutionRequest {
                    task,
                    profile,
                    workspace,
                };
                self.executor.run(request, cancel).await
            }
            Err(e) => Err(ExecutorError::Retryable(format!("workspace unavailable: {e}"))),
        };

        match &outcome {
            Ok(_) => info!(task_id, "agent run succeeded"),
            Err(e) => warn!(task_id, error = %e, "agent run did not succeed"),
        }

        let state = match self.store.finish(
            task_id,
            &outcome,
            self.policy.max_retries,
            self.clock.now_utc(),
        ) {
            Ok(state) => state,
            Err(e) => {
                error!(task_id, error = %e, "outcome recorded in memory only");
                self.store.get(task_id).map_or(TaskState::Failed, |t| t.state)
            }
        };
        info!(task_id, state = %state, "task finished");
        CycleOutcome::Ran { task_id, state }
    }

    /// Spawn the timer-driven loop. On `shutdown` the in-flight run is
    /// interrupted, its task returns to the queue, and the loop exits.
    pub fn spawn(self: Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!(
                poll_secs = self.poll_interval.as_secs(),
                pending = self.store.pending_ids().len(),
                "scheduler started"
            );
            let mut interval = tokio::time::interval(self.poll_interval);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    () = shutdown.cancelled() => break,
                    _ = interval.tick() => {}
                }

                let cycle = self.cycle(&shutdown);
                tokio::pin!(cycle);
                tokio::select! {
                    outcome = &mut cycle => {
                        debug!(?outcome, "cycle complete");
                    }
                    () = shutdown.cancelled() => {
                        if let Some(id) = self.store.interrupt_in_flight() {
                            info!(task_id = id, "interrupting in-flight task for shutdown");
                        }
                        let outcome = cycle.await;
                        debug!(?outcome, "final cycle complete");
                        break;
                    }
                }
            }
            info!("scheduler stopped");
        })
    }
}
