//! Retry/cooldown controller.
//!
//! Counts consecutive communication failures and derives the backoff from
//! the count alone:
//!
//! ```text
//! failures   0     1      2      3      4     ...   n
//! cooldown   -    base  2·base 4·base 8·base  ...  min(base·2^(n-1), max)
//! ```
//!
//! Two pieces of state are kept on purpose.  `current` remembers the
//! duration across ticks, `perform` says the very next action must be the
//! nap.  The planner consumes `perform` once per failure, while `current`
//! survives until a success so a failing retry escalates correctly.

use core::time::Duration;

use log::debug;

/// Saturation point of the failure counter.  High enough that any sane
/// base/max pair has hit the ceiling long before.
pub const MAX_FAILED_ATTEMPTS: u8 = 16;

/// Cooldown after `failures` consecutive failures.  `None` for zero.
pub fn cooldown_for(base: Duration, max: Duration, failures: u8) -> Option<Duration> {
    if failures == 0 {
        return None;
    }
    let factor = 1u32
        .checked_shl(u32::from(failures - 1))
        .unwrap_or(u32::MAX);
    Some(base.saturating_mul(factor).min(max))
}

#[derive(Debug, Clone)]
pub struct Cooldown {
    base: Duration,
    max: Duration,
    failed_attempts: u8,
    current: Option<Duration>,
    perform: bool,
}

impl Cooldown {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            failed_attempts: 0,
            current: None,
            perform: false,
        }
    }

    /// Forget every failure.
    pub fn reset(&mut self) {
        self.failed_attempts = 0;
        self.current = None;
        self.perform = false;
    }

    /// The server was reached.
    pub fn record_success(&mut self) {
        self.reset();
    }

    /// The server could not be reached.  Returns the new cooldown and arms
    /// the nap.
    pub fn record_failure(&mut self) -> Duration {
        self.failed_attempts = self
            .failed_attempts
            .saturating_add(1)
            .min(MAX_FAILED_ATTEMPTS);
        let cooldown = cooldown_for(self.base, self.max, self.failed_attempts).unwrap_or(self.base);
        debug!(
            "Cooldown: {} failure(s), next nap {:?}",
            self.failed_attempts, cooldown
        );
        self.current = Some(cooldown);
        self.perform = true;
        cooldown
    }

    /// Consume the pending nap, if armed.  The duration stays remembered.
    pub fn take_pending(&mut self) -> Option<Duration> {
        if !self.perform {
            return None;
        }
        self.perform = false;
        self.current
    }

    pub fn is_pending(&self) -> bool {
        self.perform
    }

    pub fn current(&self) -> Option<Duration> {
        self.current
    }

    pub fn failed_attempts(&self) -> u8 {
        self.failed_attempts
    }
}
