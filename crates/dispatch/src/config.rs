//! Dispatcher configuration.

use std::time::Duration;

/// Tuning for [`OutboxDispatcher`](crate::OutboxDispatcher).
#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Pause between polls when the outbox is drained.
    pub poll_interval: Duration,

    /// Maximum entries claimed per batch.
    pub batch_size: usize,

    /// Failed attempts after which an entry is parked as failed.
    pub max_attempts: u32,

    /// How long a claim hides an entry from other dispatchers.
    pub visibility_timeout: Duration,

    /// Upper bound for a single handler call.
    pub handler_timeout: Duration,

    /// Delay before the first retry. Doubles with every further attempt.
    pub base_backoff: Duration,

    pub max_backoff: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            batch_size: 100,
            max_attempts: 5,
            visibility_timeout: Duration::from_secs(30),
            handler_timeout: Duration::from_secs(5),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(300),
        }
    }
}

impl DispatcherConfig {
    /// Delay before retrying an entry that has now failed `attempts` times.
    pub fn backoff(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        self.base_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}
