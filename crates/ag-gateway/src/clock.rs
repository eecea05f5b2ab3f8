// clock.rs — Injectable clock.
//
// Condition evaluation, token expiry, and rate windows all read the
// current instant through this trait. Production uses SystemClock; tests
// pin or advance a FixedClock to exercise time-of-day windows and
// expiries without sleeping.

use std::sync::RwLock;

use chrono::{DateTime, Utc};

/// Source of the current UTC instant. One per process.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// The real wall clock.
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A settable clock for tests.
pub struct FixedClock {
    instant: RwLock<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(instant: DateTime<Utc>) -> Self {
        Self {
            instant: RwLock::new(instant),
        }
    }

    /// Move the clock to a new instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        *self.instant.write().expect("clock lock poisoned") = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.instant.read().expect("clock lock poisoned")
    }
}
