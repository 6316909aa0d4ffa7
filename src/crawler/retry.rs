use crate::config::CrawlerConfig;
use std::time::Duration;

/// Longest single backoff sleep
const MAX_BACKOFF: Duration = Duration::from_secs(300);

/// Exponential backoff for retriable fetch failures
///
/// Retry `n` (0-based) waits `base_delay * 2^n`: with the default base of
/// one second the sequence is 1s, 2s, 4s, ...
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

    pub fn from_config(config: &CrawlerConfig) -> Self {
        Self::new(config.max_retries, config.retry_base_delay())
    }

    /// Delay before retry number `retry` (0-based)
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(MAX_BACKOFF)
    }

    /// Returns true if another retry is allowed after `retries_done` retries
    pub fn can_retry(&self, retries_done: u32) -> bool {
        retries_done < self.max_retries
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_secs(1))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_sequence() {
        let policy = RetryPolicy::default();
        let delays: Vec<Duration> = (0..3).map(|n| policy.delay_for(n)).collect();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4)
            ]
        );
    }

    #[test]
    fn test_can_retry() {
        let policy = RetryPolicy::new(2, Duration::from_millis(10));
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));

        assert!(!RetryPolicy::new(0, Duration::from_secs(1)).can_retry(0));
    }

    #[test]
    fn test_delay_is_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(40), MAX_BACKOFF);
    }
}
