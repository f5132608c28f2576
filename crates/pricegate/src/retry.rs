use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::ApiError;

/// Exponential-backoff parameters for consumer-side reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on every further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl From<RetryConfig> for RetryPolicy {
    fn from(config: RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
        }
    }
}

impl RetryPolicy {
    fn backoff(&self, retries_so_far: u32) -> Duration {
        // Cap the shift so a misconfigured attempt count cannot overflow.
        let factor = 1u32 << retries_so_far.min(16);
        self.base_delay.saturating_mul(factor)
    }
}

/// Runs the operation produced by `task_gen` until it succeeds or the policy
/// is exhausted, sleeping with exponential backoff in between.
///
/// A [`Blocked`](ApiError::Blocked) failure aborts immediately: retrying
/// against a backend the breaker already refuses would only look like abuse.
/// Every retry re-enters the operation from scratch, so it goes through the
/// cache and deduplication machinery again rather than around it. Dropping the
/// returned future cancels any scheduled retry.
pub async fn with_retry<G, F, T>(policy: RetryPolicy, task_gen: G) -> Result<T, ApiError>
where
    G: Fn() -> F,
    F: Future<Output = Result<T, ApiError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        let result = task_gen().await;
        attempts += 1;

        let give_up = match &result {
            Ok(_) => true,
            Err(error) => error.is_blocked(),
        };
        if give_up || attempts >= max_attempts {
            break result;
        }

        let delay = policy.backoff(attempts - 1);
        tracing::debug!(
            attempts,
            delay = %humantime::format_duration(delay),
            "api request failed, scheduling retry"
        );
        tokio::time::sleep(delay).await;
    }
}
