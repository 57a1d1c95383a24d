//! Bounded retry policy.

use std::time::Duration;

/// Default spacing between attempts.
pub const DEFAULT_RETRY_INTERVAL: Duration = Duration::from_millis(200);

/// Default number of retries after the initial attempt.
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 30;

/// Fixed-interval retry with a hard attempt ceiling.
///
/// `max_attempts` counts retries only; the immediate first try is free.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self { interval: DEFAULT_RETRY_INTERVAL, max_attempts: DEFAULT_RETRY_ATTEMPTS }
    }
}

impl RetryPolicy {
    /// Retry every `interval`, at most `max_attempts` times.
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self { interval, max_attempts }
    }

    /// `true` if retry number `attempt` (1-based) is within the ceiling.
    pub fn allows(&self, attempt: u32) -> bool {
        attempt >= 1 && attempt <= self.max_attempts
    }

    /// Time from the first try until the last retry runs.
    pub fn budget(&self) -> Duration {
        self.interval * self.max_attempts
    }
}
