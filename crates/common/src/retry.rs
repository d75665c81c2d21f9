//! Bounded timeout-with-backoff wrapper for outbound calls.

use std::future::Future;
use std::time::Duration;

use crate::error::AppError;

#[derive(Debug, Clone, Copy)]
pub struct TimeoutPolicy {
    /// Deadline for a single call
    pub timeout: Duration,
    /// Extra attempts after a transient failure
    pub retries: u32,
    /// Delay before the first extra attempt, doubled on each further one
    pub backoff: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            retries: 2,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Run `op` under `policy.timeout`, retrying transient failures with exponential backoff.
///
/// Non-transient errors (e.g. an HTTP error status) are returned immediately.
pub async fn with_timeout_retry<T, F, Fut>(
    operation: &str,
    policy: TimeoutPolicy,
    mut op: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, AppError>>,
{
    let mut attempt = 0u32;

    loop {
        let result = match tokio::time::timeout(policy.timeout, op()).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "{} timed out after {}ms",
                operation,
                policy.timeout.as_millis()
            ))),
        };

        match result {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.retries => {
                let delay = policy.backoff * 2u32.saturating_pow(attempt);
                attempt += 1;
                tracing::warn!(
                    operation,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Transient failure, backing off"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(e),
        }
    }
}
