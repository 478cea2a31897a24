//! Retry with exponential backoff and jitter (`SPEC_FULL.md` §4.3).
//!
//! Non-retryable error kinds (validation, circuit-open, bulkhead-full,
//! fatal — see [`CoreError::is_retryable`]) pass through on the first
//! attempt without consuming a retry budget.

use std::future::Future;
use std::time::Duration;

use rand::Rng;

use crate::error::CoreError;

#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let capped = base.min(self.max_delay.as_secs_f64());
        let jitter: f64 = rand::thread_rng().gen_range(0.0..capped.max(0.001) * 0.1);
        Duration::from_secs_f64(capped + jitter)
    }
}

/// Run `make_op` (a factory, since a future can only be awaited once)
/// up to `config.max_attempts` times, sleeping between attempts with
/// exponential backoff plus jitter.
pub async fn with_retry<F, Fut, T>(config: &RetryConfig, mut make_op: F) -> Result<T, CoreError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CoreError>>,
{
    let mut attempt = 0;
    loop {
        match make_op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < config.max_attempts => {
                tokio::time::sleep(config.delay_for(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn succeeds_on_first_try() {
        let config = RetryConfig::default();
        let result = with_retry(&config, || async { Ok::<_, CoreError>(1) }).await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test]
    async fn retries_transient_then_succeeds() {
        let config = RetryConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..RetryConfig::default()
        };
        let attempts = AtomicU32::new(0);
        let result = with_retry(&config, || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(CoreError::transient("op", "boom"))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn validation_errors_are_not_retried() {
        let config = RetryConfig::default();
        let attempts = AtomicU32::new(0);
        let result: Result<i32, _> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::validation("bad input")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_returns_last_error() {
        let config = RetryConfig {
            max_attempts: 2,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            multiplier: 2.0,
        };
        let attempts = AtomicU32::new(0);
        let result: Result<i32, _> = with_retry(&config, || {
            attempts.fetch_add(1, Ordering::SeqCst);
            async { Err(CoreError::transient("op", "still failing")) }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }
}
