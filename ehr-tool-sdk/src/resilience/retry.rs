//! Retry budget and exponential backoff for EHR API calls
//!
//! The budget is shared by every retry path of one logical call. Backoff is
//! `base_delay * 2^retry_count` with no ceiling other than the budget.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::ClientConfig;

/// Retry policy configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt (0 means no retries)
    pub max_retries: u32,

    /// Delay before the first transport-error retry
    pub base_delay: Duration,

    /// Retry 5xx responses with backoff
    pub retry_server_errors: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: crate::config::DEFAULT_MAX_RETRIES,
            base_delay: Duration::from_secs(1),
            retry_server_errors: false,
        }
    }
}

impl fmt::Display for RetryPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RetryPolicy {{ max_retries: {}, base_delay: {:?}, retry_server_errors: {} }}",
            self.max_retries, self.base_delay, self.retry_server_errors
        )
    }
}

impl RetryPolicy {
    /// Build the policy described by a client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            retry_server_errors: config.retry_server_errors,
            ..Self::default()
        }
    }

    /// Whether another attempt is allowed after `retry_count` retries
    pub fn can_retry(&self, retry_count: u32) -> bool {
        retry_count < self.max_retries
    }

    /// Delay before the retry that follows `retry_count` previous retries
    pub fn backoff_delay(&self, retry_count: u32) -> Duration {
        let factor = 2u32.checked_pow(retry_count).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

/// Suspends the current task between retries
#[async_trait]
pub trait Sleeper: Send + Sync {
    /// Wait for `duration`
    async fn sleep(&self, duration: Duration);
}

/// Sleeper backed by the tokio timer
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_retry() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(4));
        assert_eq!(policy.backoff_delay(5), Duration::from_secs(32));
    }

    #[test]
    fn test_backoff_saturates_instead_of_overflowing() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff_delay(64), Duration::from_secs(u64::from(u32::MAX)));
    }

    #[test]
    fn test_retry_budget() {
        let policy = RetryPolicy {
            max_retries: 2,
            ..RetryPolicy::default()
        };
        assert!(policy.can_retry(0));
        assert!(policy.can_retry(1));
        assert!(!policy.can_retry(2));
    }

    #[test]
    fn test_zero_delay_sleep_returns() {
        tokio_test::block_on(TokioSleeper.sleep(Duration::ZERO));
    }

    #[tokio::test]
    async fn test_tokio_sleeper_waits() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_millis(10)).await;
        assert!(start.elapsed() >= Duration::from_millis(10));
    }
}
