//! Audit sink implementations.
//!
//! Every task transition is recorded here, including purges from the trash,
//! so a record that leaves the active view still has a trail.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::task::{TaskId, TaskState};

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related task identifier.
    pub task_id: TaskId,
    /// Project of the task, if any.
    pub project: Option<String>,
    /// Action taken (submit, start, complete, fail, retry, cancel, trash, restore, purge, recover).
    pub action: String,
    /// State before the action; `None` for submissions.
    pub from: Option<TaskState>,
    /// State after the action.
    pub to: TaskState,
    /// When the action happened.
    pub at: DateTime<Utc>,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Sink that emits each event as a structured `tracing` record.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&mut self, event: AuditEvent) {
        tracing::info!(
            target: "sleepless::audit",
            event_id = %event.event_id,
            task_id = event.task_id,
            project = event.project.as_deref().unwrap_or("-"),
            action = %event.action,
            from = event.from.map_or("-", TaskState::as_str),
            to = %event.to,
            detail = event.detail.as_deref().unwrap_or(""),
            "task transition"
        );
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    task_id: TaskId,
    project: Option<String>,
    action: impl Into<String>,
    from: Option<TaskState>,
    to: TaskState,
    detail: Option<String>,
    at: DateTime<Utc>,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        task_id,
        project,
        action: action.into(),
        from,
        to,
        at,
        detail,
    }
}
