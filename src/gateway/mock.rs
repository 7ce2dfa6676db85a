//! A deterministic, in-process [`Gateway`](super::Gateway) used when no
//! real provider is configured (mirrors the crate's hash-based fallback
//! embedder: no network calls, reproducible output, useful for tests
//! and offline operation).

use async_trait::async_trait;
use futures_util::stream::{self, BoxStream, StreamExt};

use super::{CompletionDelta, CompletionRequest, Gateway, TokenUsage};
use crate::embedding::{Embedder, FallbackEmbedder, DEFAULT_DIMENSIONS};
use crate::error::Result;

/// Deterministic gateway with no external dependencies.
///
/// Embeddings come from [`FallbackEmbedder`]; completions are a
/// templated echo of the prompt, useful for exercising pipeline and
/// analyzer logic without a live provider.
pub struct MockGateway {
    embedder: FallbackEmbedder,
}

impl MockGateway {
    /// Creates a mock gateway producing `dimensions`-wide embeddings.
    #[must_use]
    pub const fn new(dimensions: usize) -> Self {
        Self {
            embedder: FallbackEmbedder::new(dimensions),
        }
    }
}

impl Default for MockGateway {
    fn default() -> Self {
        Self::new(DEFAULT_DIMENSIONS)
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
        self.embedder.embed_batch(&refs)
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage)> {
        let text = format!("[mock completion for prompt of {} chars]", request.prompt.len());
        let usage = TokenUsage {
            prompt_tokens: estimate_tokens(&request.prompt),
            completion_tokens: estimate_tokens(&text),
        };
        Ok((text, usage))
    }

    async fn stream_complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        let (text, _) = self.complete(request).await?;
        let words: Vec<String> = text.split_whitespace().map(ToOwned::to_owned).collect();
        let len = words.len();
        let stream = stream::iter(words.into_iter().enumerate().map(move |(i, word)| {
            Ok(CompletionDelta {
                text: word,
                is_final: i + 1 == len,
            })
        }));
        Ok(stream.boxed())
    }

    fn provider_name(&self) -> &'static str {
        "mock"
    }
}

fn estimate_tokens(text: &str) -> u64 {
    (text.split_whitespace().count() as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn embed_is_deterministic_and_dimensioned() {
        let gw = MockGateway::new(64);
        let a = gw.embed(&["hello world".to_string()]).await.unwrap();
        let b = gw.embed(&["hello world".to_string()]).await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a[0].len(), 64);
    }

    #[tokio::test]
    async fn complete_reports_nonzero_usage() {
        let gw = MockGateway::default();
        let (text, usage) = gw.complete(&CompletionRequest::new("hi there")).await.unwrap();
        assert!(!text.is_empty());
        assert!(usage.prompt_tokens > 0);
        assert!(usage.completion_tokens > 0);
    }

    #[tokio::test]
    async fn stream_complete_ends_with_a_final_delta() {
        let gw = MockGateway::default();
        let mut stream = gw.stream_complete(&CompletionRequest::new("hi there")).await.unwrap();
        let mut saw_final = false;
        while let Some(delta) = stream.next().await {
            let delta = delta.unwrap();
            if delta.is_final {
                saw_final = true;
            }
        }
        assert!(saw_final);
    }

    #[test]
    fn provider_name_is_mock() {
        assert_eq!(MockGateway::default().provider_name(), "mock");
    }
}
