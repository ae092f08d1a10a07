use std::{future::Future, num::NonZeroU32, time::Duration};

use tracing::warn;

use super::ports::FetchError;

const SOURCE: &str = "application::retry";

/// Exponential backoff: attempt `n` (0-based) that fails waits `base_delay * 2^n`
/// before the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: NonZeroU32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: NonZeroU32::new(3).unwrap_or(NonZeroU32::MIN),
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn none() -> Self {
        Self {
            max_attempts: NonZeroU32::MIN,
            base_delay: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2_u32.saturating_pow(attempt))
    }
}

/// Transport-level failures, timeouts and server errors are worth another try;
/// client errors and undecodable bodies are not.
pub fn is_retryable(error: &FetchError) -> bool {
    match error {
        FetchError::Timeout { .. } | FetchError::Transport { .. } => true,
        FetchError::Status { status, .. } => *status >= 500 || *status == 429,
        FetchError::Decode { .. } => false,
    }
}

pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    operation: &'static str,
    mut call: F,
) -> Result<T, FetchError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, FetchError>>,
{
    let attempts = policy.max_attempts.get();
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt + 1 < attempts && is_retryable(&err) => {
                let delay = policy.delay_for(attempt);
                warn!(
                    target_module = SOURCE,
                    operation,
                    attempt = attempt + 1,
                    max_attempts = attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "upstream request failed, retrying"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
