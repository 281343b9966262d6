//! Tests for audit sink

use chrono::{DateTime, TimeZone, Utc};
use sleepless_scheduler::core::{build_audit_event, AuditSink, InMemoryAuditSink, TaskState};

fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 14, 23, 5, 0).single().unwrap()
}

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);

    let event = build_audit_event(
        7,
        Some("site".to_string()),
        "submit",
        None,
        TaskState::Pending,
        None,
        at(),
    );

    sink.record(event.clone());
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].event_id, event.event_id);
    assert_eq!(events[0].task_id, 7);
    assert_eq!(events[0].action, "submit");
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(1, None, "submit", None, TaskState::Pending, None, at()));
    sink.record(build_audit_event(2, None, "submit", None, TaskState::Pending, None, at()));
    sink.record(build_audit_event(3, None, "submit", None, TaskState::Pending, None, at()));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].task_id, 2); // First one popped
    assert_eq!(events[1].task_id, 3);
}

#[test]
fn test_build_audit_event() {
    let event = build_audit_event(
        4,
        None,
        "fail",
        Some(TaskState::Running),
        TaskState::Failed,
        Some("exit 2".to_string()),
        at(),
    );

    assert_eq!(event.task_id, 4);
    assert_eq!(event.action, "fail");
    assert_eq!(event.from, Some(TaskState::Running));
    assert_eq!(event.to, TaskState::Failed);
    assert_eq!(event.detail, Some("exit 2".to_string()));
    assert_eq!(event.at, at());
    assert_eq!(event.event_id.len(), 36);
}

#[test]
fn test_event_ids_are_unique() {
    let a = build_audit_event(1, None, "trash", None, TaskState::Trashed, None, at());
    let b = build_audit_event(1, None, "trash", None, TaskState::Trashed, None, at());
    assert_ne!(a.event_id, b.event_id);
}
