//! Lifecycle API: the typed mutation and query surface for command sources.
//!
//! Every mutation goes through the [`TaskStore`] and is therefore linearizable
//! against the scheduler loop; queries never wait on a running task.

use std::sync::Arc;

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::{
    LifecycleError, NewTask, StateCounts, StoreError, Task, TaskId, TaskStore, UsageOracle,
    UsageReading, WindowGate,
};
use crate::util::clock::{Clock, SystemClock};

/// Target of a cancel request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelTarget {
    /// One task.
    Task(TaskId),
    /// Every pending or running task of a project.
    Project(String),
}

/// Selection of tasks for a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportQuery {
    /// One task by id.
    Task(TaskId),
    /// Tasks submitted on a UTC calendar date.
    Date(NaiveDate),
    /// Tasks of a project.
    Project(String),
    /// Every listed task.
    List,
}

/// Point-in-time view of the scheduler's admission inputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    /// Local time of the snapshot.
    pub now: DateTime<Local>,
    /// Whether the execution window is open.
    pub window_open: bool,
    /// Usage threshold currently in force.
    pub threshold_pct: f64,
    /// Latest usage reading, when available.
    pub usage: Option<UsageReading>,
    /// Why the reading is missing.
    pub usage_error: Option<String>,
    /// Task holding the execution slot.
    pub running: Option<Task>,
    /// Pending ids in admission order.
    pub pending: Vec<TaskId>,
    /// Listed tasks per state.
    pub counts: StateCounts,
}

/// Façade over the store and admission inputs used by command front ends.
#[derive(Clone)]
pub struct Lifecycle {
    store: Arc<TaskStore>,
    gate: WindowGate,
    oracle: Arc<dyn UsageOracle>,
    clock: Arc<dyn Clock>,
}

impl Lifecycle {
    /// Create a lifecycle surface using the system clock.
    pub fn new(store: Arc<TaskStore>, gate: WindowGate, oracle: Arc<dyn UsageOracle>) -> Self {
        Self {
            store,
            gate,
            oracle,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the clock.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Underlying store.
    pub const fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Queue a new task.
    pub fn submit(&self, new: NewTask) -> Result<Task, LifecycleError> {
        self.store.submit(new, self.clock.now_utc())
    }

    /// Cancel a task or every active task of a project.
    pub fn cancel(&self, target: &CancelTarget) -> Result<Vec<Task>, LifecycleError> {
        let now = self.clock.now_utc();
        match target {
            CancelTarget::Task(id) => self.store.cancel_task(*id, now).map(|t| vec![t]),
            CancelTarget::Project(name) => self.store.cancel_project(name, now),
        }
    }

    /// Move a task to the trash.
    pub fn trash(&self, id: TaskId) -> Result<Task, LifecycleError> {
        self.store.trash(id, self.clock.now_utc())
    }

    /// Tasks currently in the trash.
    pub fn trash_list(&self) -> Vec<Task> {
        self.store.tasks_in_state(crate::core::TaskState::Trashed)
    }

    /// Return a trashed task to the queue.
    pub fn restore(&self, id: TaskId) -> Result<Task, LifecycleError> {
        self.store.restore(id, self.clock.now_utc())
    }

    /// Purge the trash from the active view.
    pub fn empty_trash(&self) -> Result<Vec<TaskId>, StoreError> {
        let purged = self.store.empty_trash(self.clock.now_utc())?;
        info!(count = purged.len(), "empty-trash request served");
        Ok(purged)
    }

    /// Window, usage and queue snapshot. Queries the usage oracle.
    pub async fn status(&self) -> StatusSnapshot {
        let now = self.clock.now_local();
        let (usage, usage_error) = match self.oracle.current_usage().await {
            Ok(reading) => (Some(reading), None),
            Err(e) => (None, Some(e.to_string())),
        };
        StatusSnapshot {
            now,
            window_open: self.gate.is_execution_permitted(&now),
            threshold_pct: self.gate.current_threshold(&now),
            usage,
            usage_error,
            running: self.store.running_task(),
            pending: self.store.pending_ids(),
            counts: self.store.counts(),
        }
    }

    /// Stored state and result of the selected tasks.
    ///
    /// Unknown or purged ids and unknown projects are `NotFound`; a date with
    /// no submissions is an empty report.
    pub fn report(&self, query: &ReportQuery) -> Result<Vec<Task>, LifecycleError> {
        match query {
            ReportQuery::Task(id) => self
                .store
                .get(*id)
                .filter(Task::is_listed)
                .map(|t| vec![t])
                .ok_or_else(|| LifecycleError::NotFound(format!("task {id}"))),
            ReportQuery::Date(date) => Ok(self.store.tasks_created_on(*date)),
            ReportQuery::Project(name) => self
                .store
                .project_tasks(name)
                .ok_or_else(|| LifecycleError::NotFound(format!("project {name}"))),
            ReportQuery::List => Ok(self.store.list(|_| true)),
        }
    }
}
