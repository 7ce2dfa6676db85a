//! Per-key token bucket rate limiting (§4.C).
//!
//! A single bucket refills at a constant rate up to a cap; callers
//! `acquire` a number of tokens and either proceed immediately or wait
//! until enough have accumulated. Gateways key buckets by provider or
//! API key, but the bucket itself is key-agnostic.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A token bucket rate limiter.
///
/// `capacity` tokens accumulate at `refill_per_sec` tokens/second, never
/// exceeding `capacity`. `try_acquire` is non-blocking; `acquire` waits.
#[derive(Debug)]
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

#[derive(Debug)]
struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// Creates a bucket starting full, refilling at `refill_per_sec`
    /// tokens per second up to `capacity`.
    #[must_use]
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(BucketState {
                tokens: capacity,
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(state: &mut BucketState, capacity: f64, refill_per_sec: f64) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        state.tokens = (state.tokens + elapsed * refill_per_sec).min(capacity);
        state.last_refill = now;
    }

    /// Attempts to take `n` tokens without blocking. Returns `true` and
    /// deducts the tokens on success, `false` (unchanged) otherwise.
    #[must_use]
    pub fn try_acquire(&self, n: f64) -> bool {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::refill(&mut state, self.capacity, self.refill_per_sec);
        if state.tokens >= n {
            state.tokens -= n;
            true
        } else {
            false
        }
    }

    /// How long the caller should sleep before `n` tokens are likely to
    /// be available, given the current fill level. Returns `Duration::ZERO`
    /// if `n` tokens are already available.
    #[must_use]
    pub fn wait_estimate(&self, n: f64) -> Duration {
        let mut state = self.state.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Self::refill(&mut state, self.capacity, self.refill_per_sec);
        if state.tokens >= n {
            return Duration::ZERO;
        }
        let deficit = n - state.tokens;
        Duration::from_secs_f64(deficit / self.refill_per_sec)
    }

    /// Blocks the calling async task until `n` tokens are available,
    /// then deducts them.
    pub async fn acquire(&self, n: f64) {
        loop {
            if self.try_acquire(n) {
                return;
            }
            let wait = self.wait_estimate(n).max(Duration::from_millis(1));
            tokio::time::sleep(wait).await;
        }
    }
}
