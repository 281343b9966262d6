//! Wall-clock abstraction so window gating and timestamps can be driven by tests.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use parking_lot::Mutex;

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current instant in UTC, used for task timestamps.
    fn now_utc(&self) -> DateTime<Utc>;

    /// Current local wall-clock time, used for execution-window decisions.
    fn now_local(&self) -> DateTime<Local> {
        self.now_utc().with_timezone(&Local)
    }
}

/// Clock backed by the operating system.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn now_local(&self) -> DateTime<Local> {
        Local::now()
    }
}

/// Manually driven clock for tests and simulations.
///
/// Stores a local instant; the UTC view is derived from it.
#[derive(Debug, Clone)]
pub struct FixedClock {
    inner: Arc<Mutex<DateTime<Local>>>,
}

impl FixedClock {
    /// Create a clock frozen at `at`.
    pub fn new(at: DateTime<Local>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(at)),
        }
    }

    /// Move the clock to `at`.
    pub fn set(&self, at: DateTime<Local>) {
        *self.inner.lock() = at;
    }

    /// Advance the clock by `delta`.
    pub fn advance(&self, delta: chrono::Duration) {
        let mut guard = self.inner.lock();
        *guard += delta;
    }
}

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.inner.lock().with_timezone(&Utc)
    }

    fn now_local(&self) -> DateTime<Local> {
        *self.inner.lock()
    }
}
