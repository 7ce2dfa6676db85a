//! The Embedding/LLM Gateway (§4.C): a single capability wrapping
//! whichever embedding/completion provider is configured, with rate
//! limiting, retry-with-backoff, and transient/permanent fault
//! classification.
//!
//! Grounded in the sibling repo's `agent::provider`-style `LlmProvider`
//! abstraction (async-trait shape, `complete`/`stream_complete`) and
//! `AgentConfig`'s cascading timeout/retry fields.

pub mod limiter;
pub mod mock;
#[cfg(feature = "openai-gateway")]
pub mod openai;
pub mod ratelimit;
pub mod retry;

pub use limiter::RateLimitedGateway;
pub use mock::MockGateway;
#[cfg(feature = "openai-gateway")]
pub use openai::OpenAiGateway;
pub use ratelimit::TokenBucket;
pub use retry::{retry_with_backoff, RetryConfig};

use std::sync::Arc;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::config::{DpaConfig, GatewayKind};
use crate::error::Result;

/// A single completion request to the gateway.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// The prompt text.
    pub prompt: String,
    /// Maximum tokens to generate.
    pub max_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
}

impl CompletionRequest {
    /// Creates a request with the given prompt and sane defaults.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens: 1024,
            temperature: 0.2,
        }
    }
}

/// One non-final chunk of a streamed completion.
#[derive(Debug, Clone)]
pub struct CompletionDelta {
    /// Incremental text content.
    pub text: String,
    /// Whether this is the final delta of the stream.
    pub is_final: bool,
}

/// Token usage reported alongside a completion or embedding call.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenUsage {
    /// Tokens in the prompt/input.
    pub prompt_tokens: u64,
    /// Tokens generated/output.
    pub completion_tokens: u64,
}

/// The capability the core consumes for embeddings and text generation.
///
/// Implementations must be `Send + Sync`; the Pipeline and QA
/// Orchestrator both hold a `Arc<dyn Gateway>` shared across stages.
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Embeds a batch of texts, returning one vector per input in order.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::Error::GatewayTransient`] or
    /// [`crate::error::Error::GatewayPermanent`] on provider failure.
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Generates a completion for `request`.
    ///
    /// # Errors
    ///
    /// Returns a gateway error classified transient or permanent.
    async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage)>;

    /// Streams a completion as a lazy sequence of deltas.
    ///
    /// # Errors
    ///
    /// Returns a gateway error if the stream could not be started.
    async fn stream_complete(&self, request: &CompletionRequest) -> Result<BoxStream<'static, Result<CompletionDelta>>>;

    /// Stable provider name, used in error messages and metrics.
    fn provider_name(&self) -> &'static str;
}

#[async_trait]
impl Gateway for Arc<dyn Gateway> {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        (**self).embed(texts).await
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage)> {
        (**self).complete(request).await
    }

    async fn stream_complete(&self, request: &CompletionRequest) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        (**self).stream_complete(request).await
    }

    fn provider_name(&self) -> &'static str {
        (**self).provider_name()
    }
}

/// Builds the configured [`Gateway`], rate-limited and retried per
/// `config`.
///
/// # Errors
///
/// Returns an error if [`GatewayKind::Live`] is selected but the
/// `openai-gateway` feature is disabled, or if provider construction
/// fails (e.g. a missing API key).
pub fn build_gateway(config: &DpaConfig) -> Result<Arc<dyn Gateway>> {
    let inner: Arc<dyn Gateway> = match config.gateway {
        GatewayKind::Mock => Arc::new(MockGateway::default()),
        GatewayKind::Live => {
            #[cfg(feature = "openai-gateway")]
            {
                Arc::new(OpenAiGateway::new(config)?)
            }
            #[cfg(not(feature = "openai-gateway"))]
            {
                return Err(crate::error::InputError::InvalidArgument {
                    message: "live gateway selected but the crate was built without the \
                              openai-gateway feature"
                        .to_string(),
                }
                .into());
            }
        }
    };

    Ok(Arc::new(RateLimitedGateway::new(inner, config.rate_limit_rps, config.retry)))
}
