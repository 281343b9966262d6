//! Tests for utility functions

use chrono::{Local, TimeZone, Timelike};
use sleepless_scheduler::util::{init_tracing, Clock, FixedClock, SystemClock};

#[test]
fn test_fixed_clock_advances() {
    let start = Local
        .with_ymd_and_hms(2026, 1, 14, 21, 30, 0)
        .single()
        .unwrap();
    let clock = FixedClock::new(start);
    assert_eq!(clock.now_local(), start);

    clock.advance(chrono::Duration::minutes(45));
    assert_eq!(clock.now_local().hour(), 22);
    assert_eq!(clock.now_utc(), (start + chrono::Duration::minutes(45)).with_timezone(&chrono::Utc));
}

#[test]
fn test_fixed_clock_clones_share_time() {
    let start = Local.with_ymd_and_hms(2026, 1, 14, 9, 0, 0).single().unwrap();
    let clock = FixedClock::new(start);
    let view = clock.clone();
    clock.set(start + chrono::Duration::hours(3));
    assert_eq!(view.now_local().hour(), 12);
}

#[test]
fn test_system_clock_moves_forward() {
    let a = SystemClock.now_utc();
    let b = SystemClock.now_utc();
    assert!(b >= a);
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_tracing("debug");
    init_tracing("info");
}
