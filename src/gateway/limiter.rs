//! Rate-limiting and retrying [`Gateway`] decorator (§4.C): wraps any
//! inner gateway with a per-instance [`TokenBucket`] and
//! [`retry_with_backoff`], so every provider implementation gets the
//! same enforcement without duplicating it.

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use super::{retry_with_backoff, CompletionDelta, CompletionRequest, Gateway, RetryConfig, TokenBucket, TokenUsage};
use crate::error::Result;

/// One request "costs" one token regardless of batch size; the bucket
/// caps requests/sec, not tokens/sec, matching the token-bucket
/// description in §4.C ("per-key rate limits").
const REQUEST_COST: f64 = 1.0;

/// Wraps `inner` with rate limiting and retry-with-backoff.
pub struct RateLimitedGateway<G> {
    inner: G,
    bucket: TokenBucket,
    retry: RetryConfig,
}

impl<G: Gateway> RateLimitedGateway<G> {
    /// Creates a decorator limiting `inner` to `rps` requests/second,
    /// retrying transient faults per `retry`.
    #[must_use]
    pub fn new(inner: G, rps: f64, retry: RetryConfig) -> Self {
        Self {
            inner,
            bucket: TokenBucket::new(rps.max(1.0), rps),
            retry,
        }
    }
}

#[async_trait]
impl<G: Gateway> Gateway for RateLimitedGateway<G> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        retry_with_backoff(self.retry, || async {
            self.bucket.acquire(REQUEST_COST).await;
            self.inner.embed(texts).await
        })
        .await
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage)> {
        retry_with_backoff(self.retry, || async {
            self.bucket.acquire(REQUEST_COST).await;
            self.inner.complete(request).await
        })
        .await
    }

    async fn stream_complete(&self, request: &CompletionRequest) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        self.bucket.acquire(REQUEST_COST).await;
        self.inner.stream_complete(request).await
    }

    fn provider_name(&self) -> &'static str {
        self.inner.provider_name()
    }
}
