//! Wall-clock source for regeneration and settlement timestamps.
//!
//! RULE: Nothing in the engine reads the system time directly.
//! Tests use ManualClock so stored timestamps are reproducible.

use chrono::{Duration, NaiveDateTime, Timelike, Utc};
use std::cell::Cell;

pub trait Clock: Send {
    fn now(&self) -> NaiveDateTime;
}

/// UTC system time, truncated to whole seconds.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        let now = Utc::now().naive_utc();
        now.with_nanosecond(0).unwrap_or(now)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Clone)]
pub struct ManualClock {
    current: Cell<NaiveDateTime>,
}

impl ManualClock {
    pub fn new(start: NaiveDateTime) -> Self {
        Self { current: Cell::new(start) }
    }

    pub fn advance(&self, by: Duration) {
        self.current.set(self.current.get() + by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> NaiveDateTime {
        self.current.get()
    }
}
