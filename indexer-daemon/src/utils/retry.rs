//! Fixed-delay retry
//!
//! Bounded attempt loop used around the body upload. No exponential backoff and no
//! jitter: every failed attempt except the last is followed by the same delay.

use indexer_common::config::UploadConfig;
use indexer_common::time::millis_to_duration;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Attempt budget and delay for one attempt chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, first attempt included
    pub max_attempts: u32,
    /// Wait between a failed attempt and the next
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&UploadConfig::default())
    }
}

impl From<&UploadConfig> for RetryPolicy {
    fn from(config: &UploadConfig) -> Self {
        Self::new(config.max_retries, millis_to_duration(config.retry_delay_ms))
    }
}

/// Last error of an exhausted attempt chain
#[derive(Debug)]
pub struct RetryExhausted<E> {
    pub attempts: u32,
    pub error: E,
}

/// Run `operation` until it succeeds or `policy.max_attempts` is used up
///
/// `operation` receives the zero-based attempt index. The final error is returned
/// unchanged alongside the number of attempts made.
pub async fn retry_fixed_delay<F, Fut, T, E>(
    operation_name: &str,
    policy: RetryPolicy,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => {
                if attempt > 0 {
                    tracing::info!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        max_attempts,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(error) => {
                tracing::warn!(
                    operation = operation_name,
                    attempt = attempt + 1,
                    max_attempts,
                    error = %error,
                    "Attempt failed"
                );

                if attempt + 1 >= max_attempts {
                    return Err(RetryExhausted {
                        attempts: attempt + 1,
                        error,
                    });
                }

                tracing::info!(
                    operation = operation_name,
                    delay_ms = policy.delay.as_millis() as u64,
                    "Retrying after fixed delay"
                );
                tokio::time::sleep(policy.delay).await;
                attempt += 1;
            }
        }
    }
}
