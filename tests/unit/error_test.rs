//! Tests for error types

use sleepless_scheduler::core::{
    ExecutorError, LifecycleError, OracleError, StoreError, TaskState,
};

#[test]
fn test_not_found_error() {
    let err = LifecycleError::NotFound("task 9".to_string());
    assert_eq!(format!("{err}"), "not found: task 9");
}

#[test]
fn test_invalid_transition_error() {
    let err = LifecycleError::InvalidTransition {
        id: 3,
        state: TaskState::Running,
        event: "trash",
    };
    assert_eq!(format!("{err}"), "task 3 is running; cannot trash");
}

#[test]
fn test_store_error_is_transparent() {
    let err = LifecycleError::from(StoreError::Backend("disk full".to_string()));
    assert_eq!(format!("{err}"), "store backend error: disk full");
}

#[test]
fn test_corrupt_record_error() {
    let err = StoreError::Corrupt {
        line: 4,
        reason: "expected value".to_string(),
    };
    assert_eq!(format!("{err}"), "corrupt store record at line 4: expected value");
}

#[test]
fn test_oracle_and_executor_errors() {
    let err = OracleError::Unavailable("timed out".to_string());
    assert_eq!(format!("{err}"), "usage unavailable: timed out");
    assert_eq!(format!("{}", ExecutorError::Cancelled), "execution cancelled");
}
