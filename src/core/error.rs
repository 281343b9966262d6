//! Error types for scheduler operations.

use thiserror::Error;

use crate::core::task::{TaskId, TaskState};

/// Persistence failures of the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read or write failed.
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// A persisted record could not be decoded.
    #[error("corrupt store record at line {line}: {reason}")]
    Corrupt {
        /// One-based line number in the log.
        line: usize,
        /// Decoder message.
        reason: String,
    },
    /// A record could not be encoded.
    #[error("cannot serialize store record: {0}")]
    Serialize(#[from] serde_json::Error),
    /// Injected or backend-specific failure.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// The usage figure could not be determined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OracleError {
    /// Command missing, failed, timed out, or printed nothing parsable.
    #[error("usage unavailable: {0}")]
    Unavailable(String),
}

/// Failure classes reported by an executor run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutorError {
    /// Transient failure; the task goes back to the queue.
    #[error("retryable failure: {0}")]
    Retryable(String),
    /// Permanent failure; the task is marked failed.
    #[error("non-retryable failure: {0}")]
    NonRetryable(String),
    /// The run was stopped through its cancellation token.
    #[error("execution cancelled")]
    Cancelled,
}

/// Errors returned synchronously to Lifecycle API callers.
#[derive(Debug, Error)]
pub enum LifecycleError {
    /// Unknown id or project, or nothing in an applicable state.
    #[error("not found: {0}")]
    NotFound(String),
    /// The task exists but the requested event is not allowed from its state.
    #[error("task {id} is {state}; cannot {event}")]
    InvalidTransition {
        /// Target task.
        id: TaskId,
        /// State at the time of the request.
        state: TaskState,
        /// Requested event name.
        event: &'static str,
    },
    /// Submitted content was blank.
    #[error("task content must not be empty")]
    EmptyContent,
    /// Submitted project name was blank.
    #[error("project name must not be empty")]
    BlankProject,
    /// Persistence failed; no state was changed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
