//! A fixed-point clock for assertions that would otherwise race `Utc::now()`.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

/// Hands out a caller-controlled "current time," advanced explicitly instead
/// of by wall-clock drift. Tests that assert on timestamps (queue entries,
/// hit batches) use this instead of `Utc::now()` so repeated runs are exact,
/// not just "close enough."
pub struct TestClock {
    now: Mutex<DateTime<Utc>>,
}

impl TestClock {
    #[must_use]
    pub fn at(start: DateTime<Utc>) -> Self {
        Self { now: Mutex::new(start) }
    }

    #[must_use]
    pub fn epoch() -> Self {
        Self::at(DateTime::UNIX_EPOCH)
    }

    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }

    pub fn advance(&self, delta: chrono::Duration) {
        let mut now = self.now.lock();
        *now += delta;
    }
}
