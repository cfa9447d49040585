//! Retry utilities with exponential backoff and jitter.
//!
//! Opt-in only: nothing in `agent`, `session`, or the strategies calls this
//! module. A concrete `LLMClient` implementation may wrap its own provider
//! calls in [`with_backoff`] to retry transient failures (e.g. a
//! `ProviderError` from a rate limit or a dropped connection); the core
//! executor has no retry semantics of its own and never applies this
//! automatically.

use crate::error::{Error, Result};
use log::{debug, warn};
use rand::Rng;
use std::time::Duration;

/// Backoff schedule for [`with_backoff`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first. `1` means no retry.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Upper bound the delay is clamped to as it grows.
    pub max_delay: Duration,
    /// Factor the delay is multiplied by after each failed attempt.
    pub multiplier: f64,
}

impl RetryConfig {
    pub fn new(max_attempts: u32) -> Self {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// The delay before attempt `attempt` (0-indexed among retries, so `0` is
    /// the delay before the first retry), full-jittered between zero and the
    /// exponential backoff ceiling for that attempt.
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.multiplier.powi(attempt as i32);
        let ceiling_ms = (self.initial_delay.as_millis() as f64 * exp).min(self.max_delay.as_millis() as f64);
        let jittered_ms = rand::thread_rng().gen_range(0.0..=ceiling_ms.max(1.0));
        Duration::from_millis(jittered_ms as u64)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::new(3)
    }
}

/// Run `op`, retrying up to `config.max_attempts` times (in total) while
/// `should_retry` returns `true` for the error. Sleeps a full-jittered
/// exponential backoff between attempts. Returns the first `Ok`, or the last
/// `Err` once attempts are exhausted.
pub async fn with_backoff<T, F, Fut>(config: RetryConfig, should_retry: impl Fn(&Error) -> bool, op: F) -> Result<T>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if attempt + 1 < config.max_attempts && should_retry(&e) => {
                let delay = config.delay_for(attempt);
                warn!(
                    "retry attempt {}/{} failed, retrying in {:?}: {e}",
                    attempt + 1,
                    config.max_attempts,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) => {
                debug!("retry giving up after {} attempt(s): {e}", attempt + 1);
                return Err(e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::new(max_attempts)
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(5))
    }

    #[tokio::test]
    async fn test_succeeds_without_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_backoff(fast_config(3), |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(42)
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_backoff(fast_config(5), |_| true, || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::provider("transient"))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_backoff(fast_config(3), |_| true, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::provider("always fails"))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_should_retry_false_stops_immediately() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_backoff(
            fast_config(5),
            |e| !matches!(e, Error::Cancelled),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(Error::Cancelled)
            },
        )
        .await;
        assert!(matches!(result, Err(Error::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
