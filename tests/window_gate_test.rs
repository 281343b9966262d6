//! Execution-window gating and threshold selection.

use chrono::NaiveTime;
use sleepless_scheduler::core::{ExecutionWindow, WindowGate};

fn at(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

fn gate(start: u8, end: u8) -> WindowGate {
    WindowGate::new(ExecutionWindow {
        start_hour: start,
        end_hour: end,
        day_threshold_pct: 20.0,
        night_threshold_pct: 80.0,
    })
}

#[test]
fn test_wrapping_window_boundaries() {
    let gate = gate(22, 7);
    assert!(gate.is_execution_permitted(&at(23, 0)));
    assert!(gate.is_execution_permitted(&at(22, 0)));
    assert!(gate.is_execution_permitted(&at(0, 30)));
    assert!(gate.is_execution_permitted(&at(6, 59)));
    assert!(!gate.is_execution_permitted(&at(7, 0)));
    assert!(!gate.is_execution_permitted(&at(8, 0)));
    assert!(!gate.is_execution_permitted(&at(21, 59)));
}

#[test]
fn test_same_day_window() {
    let gate = gate(9, 17);
    assert!(!gate.is_execution_permitted(&at(8, 59)));
    assert!(gate.is_execution_permitted(&at(9, 0)));
    assert!(gate.is_execution_permitted(&at(16, 59)));
    assert!(!gate.is_execution_permitted(&at(17, 0)));
}

#[test]
fn test_equal_bounds_permit_whole_day() {
    let gate = gate(5, 5);
    for hour in 0..24 {
        assert!(gate.is_execution_permitted(&at(hour, 0)), "hour {hour}");
    }
}

#[test]
fn test_threshold_follows_window() {
    let gate = gate(22, 7);
    assert!((gate.current_threshold(&at(23, 0)) - 80.0).abs() < f64::EPSILON);
    assert!((gate.current_threshold(&at(12, 0)) - 20.0).abs() < f64::EPSILON);
    assert!((gate.current_threshold(&at(7, 0)) - 20.0).abs() < f64::EPSILON);
}
