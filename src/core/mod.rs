//! Core scheduling abstractions: task model, gating, storage and the loop.

pub mod audit;
pub mod error;
pub mod executor;
pub mod scheduler;
pub mod task;
pub mod task_store;
pub mod usage;
pub mod window;
pub mod workspace;

pub use audit::{
    build_audit_event, AuditEvent, AuditSink, InMemoryAuditSink, TracingAuditSink,
};
pub use error::{AppResult, ExecutorError, LifecycleError, OracleError, StoreError};
pub use executor::{
    classify_exit, CliExecutor, CliExecutorConfig, ExecutionRequest, ExecutionResult,
    TaskExecutor,
};
pub use scheduler::{AdmissionPolicy, CycleOutcome, Scheduler};
pub use task::{ExecutionProfile, NewTask, Project, Task, TaskId, TaskKind, TaskState};
pub use task_store::{RecoveryPolicy, StateCounts, StoreBackend, StoreRecord, TaskStore};
pub use usage::{clean_output, parse_usage_output, CliUsageOracle, UsageOracle, UsageReading};
pub use window::{ExecutionWindow, WindowGate};
pub use workspace::{DirWorkspace, NoWorkspace, Workspace};
