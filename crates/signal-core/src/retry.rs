use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::SignalResult;

/// Exponential backoff for transient provider failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `attempt` (0-based)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u64.saturating_pow(attempt);
        Duration::from_millis(self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms))
    }

    /// Run `op`, retrying only errors that report `is_retryable`.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> SignalResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SignalResult<T>>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt + 1 < attempts => {
                    let wait = self.delay_for(attempt);
                    tracing::warn!(
                        "{} failed ({}), retrying in {}ms ({}/{})",
                        label,
                        e,
                        wait.as_millis(),
                        attempt + 1,
                        attempts - 1
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SignalError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay_ms: 100,
            max_delay_ms: 350,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_failures_until_success() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result = RetryPolicy::default()
            .run("fetch", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(SignalError::ProviderUnavailable("503".into()))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: SignalResult<()> = RetryPolicy::default()
            .run("fetch", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SignalError::ProviderUnavailable("down".into()))
            })
            .await;
        assert!(matches!(result, Err(SignalError::ProviderUnavailable(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_invalid_keyword_is_not_retried() {
        let counter = AtomicU32::new(0);
        let calls = &counter;
        let result: SignalResult<()> = RetryPolicy::default()
            .run("fetch", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(SignalError::InvalidKeyword("??".into()))
            })
            .await;
        assert!(matches!(result, Err(SignalError::InvalidKeyword(_))));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }
}
