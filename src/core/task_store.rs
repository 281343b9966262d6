//! Durable task and project records with serialized read-modify-write.
//!
//! Locks are split by concern and always taken in the same order:
//! `queue` → `tasks` → `projects` → `in_flight` → `backend` → `audit`.
//! The single in-flight slot is an atomic mutated only while `queue` is held,
//! so admission, cancellation and completion are linearizable without a
//! global lock, and read-only queries never wait on a running task.

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::audit::{build_audit_event, AuditSink};
use crate::core::executor::ExecutionResult;
use crate::core::task::{ExecutionProfile, NewTask, Project, Task, TaskId, TaskState};
use crate::core::{ExecutorError, LifecycleError, StoreError};

const NO_TASK: TaskId = 0;

/// One persisted line of store state. Later records for the same key win.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "snake_case")]
pub enum StoreRecord {
    /// Full snapshot of a task.
    Task(Task),
    /// Full snapshot of a project.
    Project(Project),
}

/// Abstraction for persistence backends.
pub trait StoreBackend: Send {
    /// Read every record in write order.
    fn load(&mut self) -> Result<Vec<StoreRecord>, StoreError>;
    /// Durably append `records` as one write.
    fn append(&mut self, records: &[StoreRecord]) -> Result<(), StoreError>;
    /// Replace all persisted state with `records`.
    fn compact(&mut self, records: &[StoreRecord]) -> Result<(), StoreError>;
}

/// What to do with tasks found `running` when the store is opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryPolicy {
    /// Mark orphans failed.
    #[default]
    Fail,
    /// Mark orphans cancelled.
    Cancel,
}

/// Per-state task counts over listed tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCounts {
    /// Pending tasks.
    pub pending: usize,
    /// Running tasks (zero or one).
    pub running: usize,
    /// Completed tasks.
    pub completed: usize,
    /// Failed tasks.
    pub failed: usize,
    /// Cancelled tasks.
    pub cancelled: usize,
    /// Tasks in the trash.
    pub trashed: usize,
}

enum QueueEffect {
    Keep,
    Remove,
    PushBack,
}

/// Sole owner of task and project records.
pub struct TaskStore {
    queue: Mutex<VecDeque<TaskId>>,
    tasks: RwLock<BTreeMap<TaskId, Task>>,
    projects: RwLock<BTreeMap<String, Project>>,
    /// Id of the task holding the execution slot, or `NO_TASK`.
    running: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
    next_id: AtomicU64,
    next_seq: AtomicU64,
    backend: Mutex<Box<dyn StoreBackend>>,
    /// Set when an applied change failed to persist; the next write compacts.
    needs_compaction: AtomicBool,
    audit: Option<Mutex<Box<dyn AuditSink>>>,
}

impl TaskStore {
    /// Load state from `backend` and compact it.
    pub fn open(mut backend: Box<dyn StoreBackend>) -> Result<Self, StoreError> {
        let records = backend.load()?;
        let mut tasks = BTreeMap::new();
        let mut projects = BTreeMap::new();
        for record in records {
            match record {
                StoreRecord::Task(task) => {
                    tasks.insert(task.id, task);
                }
                StoreRecord::Project(project) => {
                    projects.insert(project.name.clone(), project);
                }
            }
        }

        let next_id = tasks.keys().next_back().map_or(1, |id| id + 1);
        let next_seq = tasks.values().map(|t| t.queue_seq).max().map_or(1, |s| s + 1);
        let mut pending: Vec<&Task> = tasks
            .values()
            .filter(|t| t.state == TaskState::Pending && t.is_listed())
            .collect();
        pending.sort_by_key(|t| t.queue_seq);
        let queue: VecDeque<TaskId> = pending.iter().map(|t| t.id).collect();

        backend.compact(&snapshot_records(&tasks, &projects))?;
        info!(
            tasks = tasks.len(),
            projects = projects.len(),
            pending = queue.len(),
            "task store opened"
        );

        Ok(Self {
            queue: Mutex::new(queue),
            tasks: RwLock::new(tasks),
            projects: RwLock::new(projects),
            running: AtomicU64::new(NO_TASK),
            in_flight: Mutex::new(None),
            next_id: AtomicU64::new(next_id),
            next_seq: AtomicU64::new(next_seq),
            backend: Mutex::new(backend),
            needs_compaction: AtomicBool::new(false),
            audit: None,
        })
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: Box<dyn AuditSink>) -> Self {
        self.audit = Some(Mutex::new(audit));
        self
    }

    fn persist(
        &self,
        tasks: &BTreeMap<TaskId, Task>,
        projects: &BTreeMap<String, Project>,
        records: &[StoreRecord],
    ) -> Result<(), StoreError> {
        let mut backend = self.backend.lock();
        if self.needs_compaction.load(Ordering::Acquire) {
            backend.compact(&snapshot_records(tasks, projects))?;
            self.needs_compaction.store(false, Ordering::Release);
            debug!("store compacted after earlier write failure");
        }
        // A failed append may still have reached the log in whole or in part;
        // the next write rewrites the log from memory.
        backend.append(records).inspect_err(|e| {
            warn!(error = %e, "append failed; log will be rewritten on next write");
            self.needs_compaction.store(true, Ordering::Release);
        })
    }

    fn record_audit(
        &self,
        task: &Task,
        action: &str,
        from: Option<TaskState>,
        detail: Option<String>,
        at: DateTime<Utc>,
    ) {
        if let Some(sink) = &self.audit {
            sink.lock().record(build_audit_event(
                task.id,
                task.project.clone(),
                action,
                from,
                task.state,
                detail,
                at,
            ));
        }
    }

    /// Create a pending task at the tail of the queue, creating its project on first reference.
    pub fn submit(&self, new: NewTask, now: DateTime<Utc>) -> Result<Task, LifecycleError> {
        let kind = new.kind();
        let content = new.content.trim();
        if content.is_empty() {
            return Err(LifecycleError::EmptyContent);
        }
        let project = match new.project.as_deref().map(str::trim) {
            Some("") => return Err(LifecycleError::BlankProject),
            other => other.map(str::to_owned),
        };

        let mut queue = self.queue.lock();
        let mut tasks = self.tasks.write();
        let mut projects = self.projects.write();

        let task = Task {
            id: self.next_id.fetch_add(1, Ordering::AcqRel),
            kind,
            content: content.to_owned(),
            project: project.clone(),
            state: TaskState::Pending,
            created_at: now,
            started_at: None,
            finished_at: None,
            result: None,
            execution_profile: None,
            attempts: 0,
            queue_seq: self.next_seq.fetch_add(1, Ordering::AcqRel),
            purged_at: None,
        };

        let project_record = project.map(|name| {
            let mut entry = projects.get(&name).cloned().unwrap_or_else(|| Project {
                name,
                tasks: Vec::new(),
                created_at: now,
                remote: new.remote.clone(),
            });
            entry.tasks.push(task.id);
            entry
        });

        let mut records = vec![StoreRecord::Task(task.clone())];
        if let Some(p) = &project_record {
            records.push(StoreRecord::Project(p.clone()));
        }
        self.persist(&tasks, &projects, &records)?;

        if let Some(p) = project_record {
            projects.insert(p.name.clone(), p);
        }
        tasks.insert(task.id, task.clone());
        queue.push_back(task.id);
        drop(projects);
        drop(tasks);
        drop(queue);

        self.record_audit(&task, "submit", None, None, now);
        info!(task_id = task.id, kind = ?task.kind, project = ?task.project, "task submitted");
        Ok(task)
    }

    /// Admission transaction: move the queue head to `running` if the slot is free.
    ///
    /// Returns `Ok(None)` when a task already holds the slot or nothing is pending.
    pub fn claim_next(
        &self,
        profile: &ExecutionProfile,
        cancel: CancellationToken,
        now: DateTime<Utc>,
    ) -> Result<Option<Task>, StoreError> {
        let mut queue = self.queue.lock();
        if self.running.load(Ordering::Acquire) != NO_TASK {
            return Ok(None);
        }
        let mut tasks = self.tasks.write();

        while let Some(id) = queue.front().copied() {
            match tasks.get(&id) {
                Some(t) if t.state == TaskState::Pending && t.is_listed() => break,
                _ => {
                    debug!(task_id = id, "dropping stale queue entry");
                    queue.pop_front();
                }
            }
        }
        let Some(current) = queue.front().and_then(|id| tasks.get(id)) else {
            return Ok(None);
        };

        let mut updated = current.clone();
        updated.state = TaskState::Running;
        updated.started_at.get_or_insert(now);
        updated.execution_profile = Some(profile.name.clone());
        let id = updated.id;

        if self
            .running
            .compare_exchange(NO_TASK, id, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Ok(None);
        }

        let projects = self.projects.read();
        if let Err(e) = self.persist(&tasks, &projects, &[StoreRecord::Task(updated.clone())]) {
            self.running.store(NO_TASK, Ordering::Release);
            return Err(e);
        }
        drop(projects);

        queue.pop_front();
        *self.in_flight.lock() = Some(cancel);
        tasks.insert(id, updated.clone());
        drop(tasks);
        drop(queue);

        self.record_audit(
            &updated,
            "start",
            Some(TaskState::Pending),
            Some(profile.name.clone()),
            now,
        );
        Ok(Some(updated))
    }

    /// Record the executor outcome for the slot holder and free the slot.
    ///
    /// A task already moved out of `running` by a cancel keeps its state. The
    /// in-memory transition is applied even if persistence fails; the error is
    /// returned and the next successful write compacts the log.
    pub fn finish(
        &self,
        id: TaskId,
        outcome: &ExecutionResult,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> Result<TaskState, StoreError> {
        let mut queue = self.queue.lock();
        let mut tasks = self.tasks.write();

        let Some(current) = tasks.get(&id).cloned() else {
            self.release_slot(id);
            return Err(StoreError::Backend(format!("finished task {id} is unknown")));
        };
        if current.state != TaskState::Running {
            self.release_slot(id);
            debug!(task_id = id, state = %current.state, "outcome ignored; task left running earlier");
            return Ok(current.state);
        }

        let mut updated = current;
        let mut push_front = false;
        let mut push_back = false;
        let (action, detail) = match outcome {
            Ok(transcript) => {
                updated.state = TaskState::Completed;
                updated.finished_at = Some(now);
                updated.result = Some(transcript.clone());
                ("complete", None)
            }
            Err(ExecutorError::NonRetryable(reason)) => {
                updated.state = TaskState::Failed;
                updated.finished_at = Some(now);
                updated.result = Some(reason.clone());
                ("fail", Some(reason.clone()))
            }
            Err(ExecutorError::Retryable(reason)) => {
                updated.attempts += 1;
                if updated.attempts > max_retries {
                    updated.state = TaskState::Failed;
                    updated.finished_at = Some(now);
                    updated.result = Some(format!(
                        "retry limit ({max_retries}) reached; last error: {reason}"
                    ));
                    ("fail", Some(reason.clone()))
                } else {
                    updated.state = TaskState::Pending;
                    updated.queue_seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
                    push_back = true;
                    ("retry", Some(reason.clone()))
                }
            }
            Err(ExecutorError::Cancelled) => {
                updated.state = TaskState::Pending;
                push_front = true;
                ("interrupt", None)
            }
        };

        let projects = self.projects.read();
        let persisted = self.persist(&tasks, &projects, &[StoreRecord::Task(updated.clone())]);
        drop(projects);
        if let Err(e) = &persisted {
            warn!(task_id = id, error = %e, "outcome applied in memory only");
            self.needs_compaction.store(true, Ordering::Release);
        }

        if push_back {
            queue.push_back(id);
        } else if push_front {
            queue.push_front(id);
        }
        tasks.insert(id, updated.clone());
        self.release_slot(id);
        drop(tasks);
        drop(queue);

        self.record_audit(&updated, action, Some(TaskState::Running), detail, now);
        persisted.map(|()| updated.state)
    }

    fn release_slot(&self, id: TaskId) {
        self.in_flight.lock().take();
        if self
            .running
            .compare_exchange(id, NO_TASK, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(task_id = id, "released a slot this task did not hold");
        }
    }

    fn signal_cancel(&self, id: TaskId) {
        let _queue = self.queue.lock();
        if self.running.load(Ordering::Acquire) == id {
            if let Some(token) = self.in_flight.lock().as_ref() {
                token.cancel();
            }
        }
    }

    /// Ask the in-flight run to stop without recording a cancel; used at shutdown.
    pub fn interrupt_in_flight(&self) -> Option<TaskId> {
        let _queue = self.queue.lock();
        let id = self.running.load(Ordering::Acquire);
        if id == NO_TASK {
            return None;
        }
        if let Some(token) = self.in_flight.lock().as_ref() {
            token.cancel();
        }
        Some(id)
    }

    fn update_task(
        &self,
        id: TaskId,
        action: &'static str,
        now: DateTime<Utc>,
        apply: impl FnOnce(&mut Task) -> Result<QueueEffect, LifecycleError>,
    ) -> Result<(Task, TaskState), LifecycleError> {
        let mut queue = self.queue.lock();
        let mut tasks = self.tasks.write();

        let current = tasks
            .get(&id)
            .filter(|t| t.is_listed())
            .ok_or_else(|| LifecycleError::NotFound(format!("task {id}")))?;
        let from = current.state;
        let mut updated = current.clone();
        let effect = apply(&mut updated)?;
        if matches!(effect, QueueEffect::PushBack) {
            updated.queue_seq = self.next_seq.fetch_add(1, Ordering::AcqRel);
        }

        let projects = self.projects.read();
        self.persist(&tasks, &projects, &[StoreRecord::Task(updated.clone())])?;
        drop(projects);

        match effect {
            QueueEffect::Keep => {}
            QueueEffect::Remove => queue.retain(|q| *q != id),
            QueueEffect::PushBack => queue.push_back(id),
        }
        tasks.insert(id, updated.clone());
        drop(tasks);
        drop(queue);

        self.record_audit(&updated, action, Some(from), None, now);
        Ok((updated, from))
    }

    /// Cancel one pending or running task.
    ///
    /// A running task is recorded as cancelled immediately and its run is
    /// signalled to stop; the slot stays held until the executor returns.
    pub fn cancel_task(&self, id: TaskId, now: DateTime<Utc>) -> Result<Task, LifecycleError> {
        let (task, from) = self.update_task(id, "cancel", now, |task| {
            let effect = match task.state {
                TaskState::Pending => QueueEffect::Remove,
                TaskState::Running => QueueEffect::Keep,
                other => {
                    return Err(LifecycleError::NotFound(format!(
                        "task {id} is {other}; nothing to cancel"
                    )))
                }
            };
            mark_cancelled(task, now);
            Ok(effect)
        })?;
        if from == TaskState::Running {
            self.signal_cancel(id);
        }
        info!(task_id = id, was = %from, "task cancelled");
        Ok(task)
    }

    /// Cancel every pending or running task of `project` in one write.
    pub fn cancel_project(
        &self,
        project: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<Task>, LifecycleError> {
        let mut queue = self.queue.lock();
        let mut tasks = self.tasks.write();
        let projects = self.projects.read();

        let entry = projects
            .get(project)
            .ok_or_else(|| LifecycleError::NotFound(format!("project {project}")))?;
        let targets: Vec<(Task, TaskState)> = entry
            .tasks
            .iter()
            .filter_map(|id| tasks.get(id))
            .filter(|t| t.is_listed() && t.state.is_active())
            .map(|t| {
                let mut updated = t.clone();
                mark_cancelled(&mut updated, now);
                (updated, t.state)
            })
            .collect();
        if targets.is_empty() {
            return Err(LifecycleError::NotFound(format!(
                "project {project} has no pending or running tasks"
            )));
        }

        let records: Vec<StoreRecord> = targets
            .iter()
            .map(|(t, _)| StoreRecord::Task(t.clone()))
            .collect();
        self.persist(&tasks, &projects, &records)?;
        drop(projects);

        let mut running_hit = None;
        for (task, from) in &targets {
            match from {
                TaskState::Pending => queue.retain(|q| *q != task.id),
                _ => running_hit = Some(task.id),
            }
            tasks.insert(task.id, task.clone());
        }
        drop(tasks);
        drop(queue);

        if let Some(id) = running_hit {
            self.signal_cancel(id);
        }
        for (task, from) in &targets {
            self.record_audit(task, "cancel", Some(*from), None, now);
        }
        info!(project, count = targets.len(), "project tasks cancelled");
        Ok(targets.into_iter().map(|(t, _)| t).collect())
    }

    /// Soft-delete a pending or finished task.
    pub fn trash(&self, id: TaskId, now: DateTime<Utc>) -> Result<Task, LifecycleError> {
        let (task, _) = self.update_task(id, "trash", now, |task| {
            if !task.state.is_trashable() {
                return Err(LifecycleError::InvalidTransition {
                    id,
                    state: task.state,
                    event: "trash",
                });
            }
            let effect = if task.state == TaskState::Pending {
                QueueEffect::Remove
            } else {
                QueueEffect::Keep
            };
            task.state = TaskState::Trashed;
            Ok(effect)
        })?;
        info!(task_id = id, "task trashed");
        Ok(task)
    }

    /// Return a trashed task to the tail of the queue with its run history cleared.
    pub fn restore(&self, id: TaskId, now: DateTime<Utc>) -> Result<Task, LifecycleError> {
        let (task, _) = self.update_task(id, "restore", now, |task| {
            if task.state != TaskState::Trashed {
                return Err(LifecycleError::InvalidTransition {
                    id,
                    state: task.state,
                    event: "restore",
                });
            }
            task.state = TaskState::Pending;
            task.started_at = None;
            task.finished_at = None;
            task.result = None;
            task.execution_profile = None;
            task.attempts = 0;
            Ok(QueueEffect::PushBack)
        })?;
        info!(task_id = id, "task restored");
        Ok(task)
    }

    /// Purge every trashed task from the active view. Returns the purged ids.
    pub fn empty_trash(&self, now: DateTime<Utc>) -> Result<Vec<TaskId>, StoreError> {
        let _queue = self.queue.lock();
        let mut tasks = self.tasks.write();

        let purged: Vec<Task> = tasks
            .values()
            .filter(|t| t.state == TaskState::Trashed && t.is_listed())
            .map(|t| {
                let mut updated = t.clone();
                updated.purged_at = Some(now);
                updated
            })
            .collect();
        if purged.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<StoreRecord> = purged.iter().cloned().map(StoreRecord::Task).collect();
        let projects = self.projects.read();
        self.persist(&tasks, &projects, &records)?;
        drop(projects);

        for task in &purged {
            tasks.insert(task.id, task.clone());
        }
        drop(tasks);

        for task in &purged {
            self.record_audit(task, "purge", Some(TaskState::Trashed), None, now);
        }
        info!(count = purged.len(), "trash emptied");
        Ok(purged.iter().map(|t| t.id).collect())
    }

    /// Resolve tasks left `running` by a previous process. Call before the scheduler starts.
    pub fn reconcile_orphans(
        &self,
        policy: RecoveryPolicy,
        now: DateTime<Utc>,
    ) -> Result<Vec<TaskId>, StoreError> {
        let _queue = self.queue.lock();
        let mut tasks = self.tasks.write();
        let holder = self.running.load(Ordering::Acquire);

        let orphans: Vec<Task> = tasks
            .values()
            .filter(|t| t.state == TaskState::Running && t.id != holder)
            .map(|t| {
                let mut updated = t.clone();
                updated.finished_at = Some(now);
                match policy {
                    RecoveryPolicy::Fail => {
                        updated.state = TaskState::Failed;
                        updated.result =
                            Some("interrupted: process restarted while task was running".into());
                    }
                    RecoveryPolicy::Cancel => {
                        updated.state = TaskState::Cancelled;
                        updated.result =
                            Some("cancelled: process restarted while task was running".into());
                    }
                }
                updated
            })
            .collect();
        if orphans.is_empty() {
            return Ok(Vec::new());
        }

        let records: Vec<StoreRecord> = orphans.iter().cloned().map(StoreRecord::Task).collect();
        let projects = self.projects.read();
        self.persist(&tasks, &projects, &records)?;
        drop(projects);

        for task in &orphans {
            tasks.insert(task.id, task.clone());
        }
        drop(tasks);

        for task in &orphans {
            self.record_audit(task, "recover", Some(TaskState::Running), None, now);
            warn!(task_id = task.id, state = %task.state, "orphaned running task reconciled");
        }
        Ok(orphans.iter().map(|t| t.id).collect())
    }

    /// Fetch any record, including purged ones.
    pub fn get(&self, id: TaskId) -> Option<Task> {
        self.tasks.read().get(&id).cloned()
    }

    /// Id of the task holding the execution slot.
    pub fn running_id(&self) -> Option<TaskId> {
        match self.running.load(Ordering::Acquire) {
            NO_TASK => None,
            id => Some(id),
        }
    }

    /// The task holding the execution slot.
    pub fn running_task(&self) -> Option<Task> {
        self.running_id().and_then(|id| self.get(id))
    }

    /// Pending ids in the order they will be admitted.
    pub fn pending_ids(&self) -> Vec<TaskId> {
        self.queue.lock().iter().copied().collect()
    }

    /// Listed tasks matching `filter`, by id.
    pub fn list(&self, filter: impl Fn(&Task) -> bool) -> Vec<Task> {
        self.tasks
            .read()
            .values()
            .filter(|t| t.is_listed() && filter(t))
            .cloned()
            .collect()
    }

    /// Listed tasks in `state`.
    pub fn tasks_in_state(&self, state: TaskState) -> Vec<Task> {
        self.list(|t| t.state == state)
    }

    /// Number of records in `state`, purged ones included.
    pub fn count_in_state(&self, state: TaskState) -> usize {
        self.tasks.read().values().filter(|t| t.state == state).count()
    }

    /// Listed tasks created on `date` (UTC).
    pub fn tasks_created_on(&self, date: NaiveDate) -> Vec<Task> {
        self.list(|t| t.created_at.date_naive() == date)
    }

    /// Listed tasks of `project`, or `None` when the project is unknown.
    pub fn project_tasks(&self, project: &str) -> Option<Vec<Task>> {
        let ids = self.projects.read().get(project)?.tasks.clone();
        let tasks = self.tasks.read();
        Some(
            ids.iter()
                .filter_map(|id| tasks.get(id))
                .filter(|t| t.is_listed())
                .cloned()
                .collect(),
        )
    }

    /// Project record by name.
    pub fn project(&self, name: &str) -> Option<Project> {
        self.projects.read().get(name).cloned()
    }

    /// All projects by name.
    pub fn projects(&self) -> Vec<Project> {
        self.projects.read().values().cloned().collect()
    }

    /// Counts of listed tasks per state.
    pub fn counts(&self) -> StateCounts {
        let mut counts = StateCounts::default();
        for task in self.tasks.read().values().filter(|t| t.is_listed()) {
            match task.state {
                TaskState::Pending => counts.pending += 1,
                TaskState::Running => counts.running += 1,
                TaskState::Completed => counts.completed += 1,
                TaskState::Failed => counts.failed += 1,
                TaskState::Cancelled => counts.cancelled += 1,
                TaskState::Trashed => counts.trashed += 1,
            }
        }
        counts
    }
}

fn mark_cancelled(task: &mut Task, now: DateTime<Utc>) {
    let note = if task.state == TaskState::Running {
        "cancelled while running"
    } else {
        "cancelled before start"
    };
    task.state = TaskState::Cancelled;
    task.finished_at = Some(now);
    task.result = Some(note.to_owned());
}

fn snapshot_records(
    tasks: &BTreeMap<TaskId, Task>,
    projects: &BTreeMap<String, Project>,
) -> Vec<StoreRecord> {
    projects
        .values()
        .cloned()
        .map(StoreRecord::Project)
        .chain(tasks.values().cloned().map(StoreRecord::Task))
        .collect()
}
