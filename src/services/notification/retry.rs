use crate::adapters::push::PushError;
use crate::config::PushConfig;
use backon::{ExponentialBuilder, Retryable};
use std::future::Future;
use std::time::Duration;

/// Bounded exponential backoff for calls to the push service.
///
/// Attempt `i` (0-indexed) that fails with a retriable error waits
/// `base_delay * 2^i` before attempt `i + 1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(500))
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_attempts: usize, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    #[must_use]
    pub const fn from_config(config: &PushConfig) -> Self {
        Self::new(config.retry_max_attempts, Duration::from_millis(config.retry_base_delay_ms))
    }

    /// Upper bound on the time spent waiting between attempts:
    /// `base_delay * (2^max_attempts - 1)`.
    #[must_use]
    pub fn max_total_delay(&self) -> Duration {
        let exponent = u32::try_from(self.max_attempts).unwrap_or(u32::MAX).min(31);
        self.base_delay.saturating_mul((1_u32 << exponent) - 1)
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_total_delay())
            .with_factor(2.0)
            .with_max_times(self.max_attempts.saturating_sub(1))
    }
}

/// Runs `operation` until it succeeds, fails terminally, or runs out of attempts.
/// The last error is returned once attempts are exhausted.
///
/// # Errors
/// Returns the first non-retriable error immediately, or the last retriable one.
pub async fn with_retry<T, F, Fut>(policy: &RetryPolicy, operation: &'static str, f: F) -> Result<T, PushError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, PushError>>,
{
    f.retry(policy.backoff())
        .when(PushError::is_retriable)
        .notify(|e: &PushError, delay: Duration| {
            tracing::warn!(error = %e, ?delay, operation, "Push service call failed, retrying");
        })
        .await
}
