use crate::domain::config::SubscriptionRetryConfig;
use std::time::Duration;

/// Bounded exponential retry schedule for subscription setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_attempts: u32,
}

impl RetryPolicy {
    /// Delays between consecutive attempts.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            retries: 0,
            limit: self.max_attempts.saturating_sub(1),
            current: self.initial_backoff,
            max: self.max_backoff,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        SubscriptionRetryConfig::default().into()
    }
}

impl From<SubscriptionRetryConfig> for RetryPolicy {
    fn from(config: SubscriptionRetryConfig) -> Self {
        Self {
            initial_backoff: config.initial_backoff,
            max_backoff: config.max_backoff,
            max_attempts: config.max_attempts.max(1),
        }
    }
}

/// Doubling delays, capped at `max`, yielding `limit` items.
pub struct Backoff {
    retries: u32,
    limit: u32,
    current: Duration,
    max: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Self::Item> {
        if self.retries >= self.limit {
            return None;
        }
        self.retries += 1;

        let delay = self.current.min(self.max);
        self.current = self.current.saturating_mul(2);
        Some(delay)
    }
}
