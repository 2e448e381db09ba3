use std::time::Duration;

/// Exponential backoff policy
///
/// Attempt numbers start at 0 for the first request. After a failed attempt
/// `n` the fetcher waits `base_delay * 2^n` and retries, as long as
/// `n < max_retries`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Whether a failed attempt may be followed by another one
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Delay to wait after failed attempt `attempt`
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }

    /// Total number of requests this policy allows for one URL
    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }
}
