//! Retry-with-backoff for gateway calls (§4.C): transient faults are
//! retried with exponential backoff and jitter up to a capped number of
//! attempts; permanent faults and non-gateway errors are never retried.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

/// Monotonic counter mixed into the jitter seed so consecutive calls
/// within the same nanosecond-resolution tick still diverge.
static JITTER_SEQUENCE: AtomicU64 = AtomicU64::new(0);

/// Derives a jitter fraction in `[0.5, 1.0)` from the current time and a
/// process-local sequence counter, mirroring the hash-based determinism
/// used elsewhere in this crate's embedding fallback rather than pulling
/// in a dedicated RNG dependency.
fn jitter_fraction() -> f64 {
    let seq = JITTER_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    let mut hasher = DefaultHasher::new();
    Instant::now().hash(&mut hasher);
    seq.hash(&mut hasher);
    let bits = hasher.finish();
    0.5 + (bits % 5000) as f64 / 10000.0
}

/// Configuration for [`retry_with_backoff`].
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound on any single delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u32) -> Duration {
        let exp = self.base_delay.saturating_mul(1u32.checked_shl(attempt).unwrap_or(u32::MAX));
        let capped = exp.min(self.max_delay);
        capped.mul_f64(jitter_fraction())
    }
}

/// Runs `op`, retrying on [`Error::retriable`] failures per `config`
/// until it succeeds, a non-retriable error occurs, or attempts are
/// exhausted (in which case the last error is returned).
///
/// # Errors
///
/// Returns the final attempt's error if every attempt fails, or
/// immediately returns a non-retriable error without retrying.
pub async fn retry_with_backoff<T, F, Fut>(config: RetryConfig, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= config.max_attempts || !err.retriable() {
                    return Err(err);
                }
                tokio::time::sleep(config.delay_for(attempt - 1)).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GatewayPermanentError;
    use crate::error::GatewayTransientError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
        }
    }

    #[tokio::test]
    async fn succeeds_without_retry() {
        let result = retry_with_backoff(fast_config(), || async { Ok::<_, Error>(42) }).await;
        assert_eq!(result.unwrap(), 42);
    }

    #[tokio::test]
    async fn retries_transient_errors_until_success() {
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(fast_config(), || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < 2 {
                Err(Error::from(GatewayTransientError::RateLimited {
                    provider: "mock".into(),
                }))
            } else {
                Ok(n)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_last_error() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(fast_config(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::from(GatewayTransientError::RateLimited {
                provider: "mock".into(),
            }))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn permanent_errors_are_never_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_with_backoff(fast_config(), || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::from(GatewayPermanentError::Unauthorized {
                provider: "mock".into(),
            }))
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
