//! Closed command set accepted from front ends, and its replies.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::api::lifecycle::{CancelTarget, Lifecycle, ReportQuery, StatusSnapshot};
use crate::core::{LifecycleError, NewTask, Task, TaskId};

/// Trash sub-commands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrashCommand {
    /// Move one task to the trash.
    Move(TaskId),
    /// List the trash.
    List,
    /// Restore one task from the trash.
    Restore(TaskId),
    /// Purge the trash.
    Empty,
}

/// Every operation a front end may request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "args", rename_all = "snake_case")]
pub enum Command {
    /// Queue a task.
    Submit(NewTask),
    /// Cancel a task or project.
    Cancel(CancelTarget),
    /// Trash operations.
    Trash(TrashCommand),
    /// Scheduler snapshot.
    Status,
    /// Task report.
    Report(ReportQuery),
}

/// Structured result of a [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "reply", rename_all = "snake_case")]
pub enum Reply {
    /// Id of the new task.
    Submitted {
        /// Assigned id.
        id: TaskId,
    },
    /// Records whose state changed.
    Updated {
        /// Affected tasks after the change.
        tasks: Vec<Task>,
    },
    /// Ids removed from the active view.
    Purged {
        /// Purged ids.
        ids: Vec<TaskId>,
    },
    /// Scheduler snapshot.
    Status(Box<StatusSnapshot>),
    /// Task listing.
    Report {
        /// Selected tasks.
        tasks: Vec<Task>,
    },
}

impl Lifecycle {
    /// Execute `command` and wrap its result.
    pub async fn dispatch(&self, command: Command) -> Result<Reply, LifecycleError> {
        debug!(?command, "dispatching command");
        match command {
            Command::Submit(new) => self.submit(new).map(|t| Reply::Submitted { id: t.id }),
            Command::Cancel(target) => self.cancel(&target).map(|tasks| Reply::Updated { tasks }),
            Command::Trash(TrashCommand::Move(id)) => {
                self.trash(id).map(|t| Reply::Updated { tasks: vec![t] })
            }
            Command::Trash(TrashCommand::List) => Ok(Reply::Report {
                tasks: self.trash_list(),
            }),
            Command::Trash(TrashCommand::Restore(id)) => {
                self.restore(id).map(|t| Reply::Updated { tasks: vec![t] })
            }
            Command::Trash(TrashCommand::Empty) => Ok(Reply::Purged {
                ids: self.empty_trash()?,
            }),
            Command::Status => Ok(Reply::Status(Box::new(self.status().await))),
            Command::Report(query) => self.report(&query).map(|tasks| Reply::Report { tasks }),
        }
    }
}
