//! Task and project records and the task state machine.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Monotonically assigned task identifier. `0` is never assigned.
pub type TaskId = u64;

/// What kind of work a task represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// Free-standing thought, eligible without a project.
    QuickThought,
    /// Work attached to a named project.
    ProjectTask,
}

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    /// Waiting in the queue.
    Pending,
    /// Handed to the executor.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with a non-retryable failure.
    Failed,
    /// Cancelled by a command; terminal.
    Cancelled,
    /// Soft-deleted; restorable.
    Trashed,
}

impl TaskState {
    /// Whether the task can still be cancelled.
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Whether the trash command accepts a task in this state.
    pub const fn is_trashable(self) -> bool {
        matches!(
            self,
            Self::Pending | Self::Completed | Self::Failed | Self::Cancelled
        )
    }

    /// Lower-case name used in logs and replies.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
            Self::Trashed => "trashed",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Named model/flag set used to invoke the execution agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionProfile {
    /// Profile label recorded on the task.
    pub name: String,
    /// Model passed to the agent as `--model <model>`, if any.
    #[serde(default)]
    pub model: Option<String>,
    /// Extra arguments appended before the task content.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl ExecutionProfile {
    /// Create a profile that selects `model`.
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: Some(model.into()),
            extra_args: Vec::new(),
        }
    }

    /// Command-line arguments contributed by this profile.
    pub fn cli_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_args.len() + 2);
        if let Some(model) = &self.model {
            args.push("--model".to_owned());
            args.push(model.clone());
        }
        args.extend(self.extra_args.iter().cloned());
        args
    }
}

/// A unit of submitted work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Stable identifier.
    pub id: TaskId,
    /// Quick-thought or project-task.
    pub kind: TaskKind,
    /// Free-text description from the submitter.
    pub content: String,
    /// Owning project name, present only for project-tasks.
    pub project: Option<String>,
    /// Current lifecycle state.
    pub state: TaskState,
    /// Submission time.
    pub created_at: DateTime<Utc>,
    /// First transition to running.
    pub started_at: Option<DateTime<Utc>>,
    /// Transition to a finished state (completed, failed or cancelled).
    pub finished_at: Option<DateTime<Utc>>,
    /// Transcript, failure cause or cancellation note.
    pub result: Option<String>,
    /// Profile name the executor ran this task with.
    pub execution_profile: Option<String>,
    /// Retryable failures consumed so far.
    #[serde(default)]
    pub attempts: u32,
    /// Queue position; smaller runs first.
    pub queue_seq: u64,
    /// Set when the trash was emptied; the record is kept for audit only.
    #[serde(default)]
    pub purged_at: Option<DateTime<Utc>>,
}

impl Task {
    /// Whether the task is visible in listings and reports.
    pub const fn is_listed(&self) -> bool {
        self.purged_at.is_none()
    }
}

/// Logical grouping of project-tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique project name.
    pub name: String,
    /// Member task ids in submission order.
    pub tasks: Vec<TaskId>,
    /// First reference time.
    pub created_at: DateTime<Utc>,
    /// Optional source-control remote supplied on first reference.
    #[serde(default)]
    pub remote: Option<String>,
}

/// Parameters for creating a task.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    /// Task description; must not be blank.
    pub content: String,
    /// Project to attach to; makes the task a project-task.
    pub project: Option<String>,
    /// Remote recorded if this submission creates the project.
    pub remote: Option<String>,
}

impl NewTask {
    /// A quick-thought submission.
    pub fn quick(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    /// A project-task submission.
    pub fn for_project(project: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            project: Some(project.into()),
            remote: None,
        }
    }

    /// Kind implied by the presence of a project.
    pub const fn kind(&self) -> TaskKind {
        if self.project.is_some() {
            TaskKind::ProjectTask
        } else {
            TaskKind::QuickThought
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_args_include_model_then_extras() {
        let mut profile = ExecutionProfile::new("primary", "opus");
        profile.extra_args.push("--verbose".into());
        assert_eq!(profile.cli_args(), vec!["--model", "opus", "--verbose"]);
    }

    #[test]
    fn running_is_not_trashable() {
        assert!(!TaskState::Running.is_trashable());
        assert!(!TaskState::Trashed.is_trashable());
        assert!(TaskState::Cancelled.is_trashable());
    }

    #[test]
    fn kind_follows_project() {
        assert_eq!(NewTask::quick("x").kind(), TaskKind::QuickThought);
        assert_eq!(NewTask::for_project("backend", "x").kind(), TaskKind::ProjectTask);
    }
}
