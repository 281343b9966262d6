//! Time-of-day execution window and usage threshold selection.

use chrono::Timelike;
use serde::{Deserialize, Serialize};

/// Night window bounds and the usage ceilings that apply inside and outside it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutionWindow {
    /// First hour (0-23) inside the window.
    pub start_hour: u8,
    /// First hour (0-23) after the window.
    pub end_hour: u8,
    /// Usage ceiling outside the window.
    pub day_threshold_pct: f64,
    /// Usage ceiling inside the window.
    pub night_threshold_pct: f64,
}

/// Pure gate over an [`ExecutionWindow`].
///
/// `start_hour > end_hour` wraps midnight (22→7 admits 22:00-06:59).
/// `start_hour == end_hour` admits the whole day.
#[derive(Debug, Clone, Copy)]
pub struct WindowGate {
    window: ExecutionWindow,
}

impl WindowGate {
    /// Create a gate for `window`.
    pub const fn new(window: ExecutionWindow) -> Self {
        Self { window }
    }

    /// The configured window.
    pub const fn window(&self) -> &ExecutionWindow {
        &self.window
    }

    /// Whether a new task may start at `now`.
    pub fn is_execution_permitted<T: Timelike>(&self, now: &T) -> bool {
        let hour = now.hour();
        let start = u32::from(self.window.start_hour);
        let end = u32::from(self.window.end_hour);
        match start.cmp(&end) {
            std::cmp::Ordering::Less => hour >= start && hour < end,
            std::cmp::Ordering::Greater => hour >= start || hour < end,
            std::cmp::Ordering::Equal => true,
        }
    }

    /// Maximum usage percentage that still admits a start at `now`.
    pub fn current_threshold<T: Timelike>(&self, now: &T) -> f64 {
        if self.is_execution_permitted(now) {
            self.window.night_threshold_pct
        } else {
            self.window.day_threshold_pct
        }
    }
}
