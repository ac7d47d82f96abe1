//! Host time adapter.
//!
//! Implements [`ClockPort`] on top of `std::time::Instant`.  The planner
//! works with wrapping millisecond timestamps, so the value is truncated
//! to 32 bits; it wraps after ~49 days like the firmware tick does.

use std::time::Instant;

use crate::app::ports::{ClockPort, Timestamp};

/// Monotonic clock counting from construction.
pub struct MonotonicClock {
    start: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl ClockPort for MonotonicClock {
    fn now_ms(&self) -> Timestamp {
        // Truncation is the wrap-around.
        (self.start.elapsed().as_millis() & u128::from(u32::MAX)) as Timestamp
    }
}
