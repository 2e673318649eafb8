//! Backoff policy for completion requests.

use crate::error::ApiError;
use std::time::Duration;

/// Bounded exponential backoff for transient completion failures.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Upper bound on total attempts, including the first request.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles after each failure.
    pub initial_backoff: Duration,
    /// Ceiling for any single delay.
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
        }
    }
}

impl RetryPolicy {
    pub fn with_max_attempts(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::default()
        }
    }

    /// Whether `err` after the zero-based `attempt` earns another try.
    pub fn should_retry(&self, err: &ApiError, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.max_attempts && err.is_transient()
    }

    /// Delay before the attempt following the zero-based `attempt`.
    ///
    /// A `Retry-After` hint longer than the computed backoff wins.
    pub fn delay_for(&self, attempt: u32, err: &ApiError) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        let backoff = self
            .initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff);
        match err.retry_after_secs() {
            Some(secs) => backoff.max(Duration::from_secs(secs).min(self.max_backoff)),
            None => backoff,
        }
    }
}
