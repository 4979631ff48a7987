use std::time::Duration;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::error::LlmError;

/// Errors the retry loop knows how to classify.
pub trait Retryable: std::fmt::Display {
    fn is_rate_limited(&self) -> bool;
    fn is_retryable(&self) -> bool;
}

impl Retryable for LlmError {
    fn is_rate_limited(&self) -> bool {
        LlmError::is_rate_limited(self)
    }

    fn is_retryable(&self) -> bool {
        LlmError::is_retryable(self)
    }
}

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: usize,
    initial_backoff: Duration,
    rate_limit_backoff: Duration,
    max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(2, 1_000, 2_000, 30_000)
    }
}

impl RetryPolicy {
    pub fn new(
        max_retries: usize,
        initial_backoff_ms: u64,
        rate_limit_backoff_ms: u64,
        max_backoff_ms: u64,
    ) -> Self {
        Self {
            max_retries,
            initial_backoff: Duration::from_millis(initial_backoff_ms),
            rate_limit_backoff: Duration::from_millis(rate_limit_backoff_ms),
            max_backoff: Duration::from_millis(max_backoff_ms),
        }
    }

    pub fn max_retries(&self) -> usize {
        self.max_retries
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: usize, rate_limited: bool) -> Duration {
        let base = if rate_limited {
            self.rate_limit_backoff
        } else {
            self.initial_backoff
        };
        let factor = 1u32 << (attempt.saturating_sub(1)).min(16);
        std::cmp::min(base.saturating_mul(factor), self.max_backoff)
    }

    /// Retry a future with exponential backoff
    pub async fn retry<F, Fut, T, E>(&self, operation_name: &str, mut f: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, E>>,
        E: Retryable,
    {
        let mut attempt = 0;

        loop {
            match f().await {
                Ok(result) => {
                    if attempt > 0 {
                        info!(
                            operation = operation_name,
                            attempts = attempt + 1,
                            "Operation succeeded after retries"
                        );
                    }
                    return Ok(result);
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() {
                        warn!(operation = operation_name, error = %e, "Operation failed, not retrying");
                        return Err(e);
                    }
                    if attempt > self.max_retries {
                        warn!(
                            operation = operation_name,
                            attempts = attempt,
                            error = %e,
                            "Operation failed after max retries"
                        );
                        return Err(e);
                    }

                    let backoff = self.backoff_for(attempt, e.is_rate_limited());
                    warn!(
                        operation = operation_name,
                        attempt = attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        rate_limited = e.is_rate_limited(),
                        error = %e,
                        "Operation failed, retrying"
                    );

                    sleep(backoff).await;
                }
            }
        }
    }
}
