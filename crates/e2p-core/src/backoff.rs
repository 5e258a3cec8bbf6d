//! Exponential backoff for transient failures.
//!
//! Used on the ingestion path when the buffer backend reports itself
//! unavailable: the push is retried with growing delays rather than the
//! record being dropped.
//!
//! Backoff formula: min(max_delay, base_delay * 2^attempt) + jitter

use std::time::Duration;

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay for the first retry
    pub base_delay: Duration,
    /// Maximum delay cap
    pub max_delay: Duration,
    /// Maximum number of retries
    pub max_retries: u32,
    /// Whether to add jitter to delays
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 5,
            jitter: true,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with custom settings.
    pub fn new(base_delay: Duration, max_delay: Duration, max_retries: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_retries,
            jitter: true,
        }
    }

    /// Disable jitter (for tests).
    pub fn without_jitter(mut self) -> Self {
        self.jitter = false;
        self
    }

    /// Calculate the backoff delay for a given attempt.
    ///
    /// Jitter, when enabled, shifts the capped delay by up to ±25% to avoid
    /// synchronized retries.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base_ms = self.base_delay.as_millis() as u64;
        let max_ms = self.max_delay.as_millis() as u64;

        let delay_ms = base_ms.saturating_mul(1u64 << attempt.min(20));
        let capped_ms = delay_ms.min(max_ms);

        let final_ms = if self.jitter {
            let jitter_range = capped_ms / 4;
            let jitter = (std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap_or_default()
                .subsec_nanos() as u64)
                % (jitter_range * 2 + 1);
            capped_ms.saturating_sub(jitter_range) + jitter
        } else {
            capped_ms
        };

        Duration::from_millis(final_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_grows_exponentially() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(30), 10)
            .without_jitter();

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::new(Duration::from_millis(100), Duration::from_secs(1), 10)
            .without_jitter();
        assert_eq!(policy.delay_for(10), Duration::from_secs(1));
        // Shift amounts beyond the guard never overflow
        assert_eq!(policy.delay_for(64), Duration::from_secs(1));
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let policy = RetryPolicy::new(Duration::from_millis(1000), Duration::from_secs(30), 10);
        for attempt in 0..5 {
            let capped = 1000u64 << attempt;
            let delay = policy.delay_for(attempt).as_millis() as u64;
            assert!(delay >= capped - capped / 4);
            assert!(delay <= capped + capped / 4);
        }
    }
}
