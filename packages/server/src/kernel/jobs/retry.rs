//! Exponential backoff for failed job attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts a job gets, the first one included
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(5_000),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Delay before attempt `attempt` (1-based): zero for the first,
    /// `base_delay * 2^(attempt - 1)` after that.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 1);
        self.base_delay.saturating_mul(factor)
    }

    /// When the next attempt may run, or `None` once `attempts_made` has used the budget.
    pub fn next_attempt_at(
        &self,
        attempts_made: i32,
        max_attempts: i32,
        now: DateTime<Utc>,
    ) -> Option<DateTime<Utc>> {
        if attempts_made >= max_attempts {
            return None;
        }
        let next = u32::try_from(attempts_made).unwrap_or(0) + 1;
        let delay = chrono::Duration::from_std(self.delay_before(next))
            .unwrap_or_else(|_| chrono::Duration::days(1));
        Some(now + delay)
    }
}
