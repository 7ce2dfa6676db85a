//! `OpenAI`-compatible Gateway backend (§4.C), behind the
//! `openai-gateway` feature.
//!
//! Supports any `OpenAI`-compatible API (`OpenAI`, Azure, local
//! proxies) via the base URL override in [`DpaConfig`](crate::config::DpaConfig).
//! Adapted from a sibling agent framework's `OpenAiProvider`, which
//! only covers chat completions; embeddings have no precedent there
//! and are added here via `async-openai`'s embeddings endpoint.

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, CreateEmbeddingRequest,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_util::stream::{BoxStream, StreamExt};

use super::{CompletionDelta, CompletionRequest, Gateway, TokenUsage};
use crate::config::DpaConfig;
use crate::error::{Error, GatewayPermanentError, GatewayTransientError, Result};

/// Gateway backed by `async-openai`, usable against `OpenAI` itself or
/// any API implementing its chat-completion and embeddings spec.
pub struct OpenAiGateway {
    client: Client<OpenAIConfig>,
    completion_model: String,
    embedding_model: String,
}

impl OpenAiGateway {
    /// Builds a gateway from resolved runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::InputError::InvalidArgument`] if no API
    /// key is present in `config`.
    pub fn new(config: &DpaConfig) -> Result<Self> {
        let api_key = config.api_key.clone().ok_or_else(|| {
            crate::error::InputError::InvalidArgument {
                message: "OpenAiGateway requires an API key".to_string(),
            }
        })?;

        let mut openai_config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = &config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Ok(Self {
            client: Client::with_config(openai_config),
            completion_model: config.completion_model.clone(),
            embedding_model: config.embedding_model.clone(),
        })
    }

    /// Classifies an SDK error as transient or permanent by matching on
    /// the rendered message, since `async-openai`'s `ApiError` carries
    /// provider-defined `code`/`type` strings rather than a stable enum.
    fn classify(provider: &'static str, err: &async_openai::error::OpenAIError) -> Error {
        let message = err.to_string();
        let lower = message.to_lowercase();

        if matches!(err, async_openai::error::OpenAIError::InvalidArgument(_)) {
            return GatewayPermanentError::BadRequest {
                provider: provider.to_string(),
                message,
            }
            .into();
        }

        if lower.contains("rate limit") || lower.contains("429") {
            GatewayTransientError::RateLimited {
                provider: provider.to_string(),
            }
            .into()
        } else if lower.contains("insufficient_quota") || lower.contains("quota") {
            GatewayPermanentError::QuotaExhausted {
                provider: provider.to_string(),
            }
            .into()
        } else if lower.contains("invalid_api_key") || lower.contains("unauthorized") || lower.contains("401") {
            GatewayPermanentError::Unauthorized {
                provider: provider.to_string(),
            }
            .into()
        } else if lower.contains("invalid_request") || lower.contains("400") {
            GatewayPermanentError::BadRequest {
                provider: provider.to_string(),
                message,
            }
            .into()
        } else {
            GatewayTransientError::ServerError {
                provider: provider.to_string(),
                message,
            }
            .into()
        }
    }
}

impl std::fmt::Debug for OpenAiGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGateway")
            .field("completion_model", &self.completion_model)
            .field("embedding_model", &self.embedding_model)
            .finish()
    }
}

#[async_trait]
impl Gateway for OpenAiGateway {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = CreateEmbeddingRequest {
            model: self.embedding_model.clone(),
            input: async_openai::types::EmbeddingInput::StringArray(texts.to_vec()),
            ..Default::default()
        };

        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| Self::classify("openai", &e))?;

        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<(String, TokenUsage)> {
        let openai_request = CreateChatCompletionRequest {
            model: self.completion_model.clone(),
            messages: vec![user_message(&request.prompt)],
            temperature: Some(request.temperature),
            max_completion_tokens: Some(request.max_tokens),
            ..Default::default()
        };

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| Self::classify("openai", &e))?;

        let choice = response.choices.first();
        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();
        let usage = response.usage.map_or_else(TokenUsage::default, |u| TokenUsage {
            prompt_tokens: u64::from(u.prompt_tokens),
            completion_tokens: u64::from(u.completion_tokens),
        });

        Ok((content, usage))
    }

    async fn stream_complete(&self, request: &CompletionRequest) -> Result<BoxStream<'static, Result<CompletionDelta>>> {
        let openai_request = CreateChatCompletionRequest {
            model: self.completion_model.clone(),
            messages: vec![user_message(&request.prompt)],
            temperature: Some(request.temperature),
            max_completion_tokens: Some(request.max_tokens),
            stream: Some(true),
            ..Default::default()
        };

        let upstream = self
            .client
            .chat()
            .create_stream(openai_request)
            .await
            .map_err(|e| Self::classify("openai", &e))?;

        let mapped = upstream.map(|result| match result {
            Ok(chunk) => {
                let choice = chunk.choices.first();
                let text = choice.and_then(|c| c.delta.content.clone()).unwrap_or_default();
                let is_final = choice.is_some_and(|c| c.finish_reason.is_some());
                Ok(CompletionDelta { text, is_final })
            }
            Err(e) => Err(Self::classify("openai", &e)),
        });

        Ok(mapped.boxed())
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}

fn user_message(prompt: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
        content: ChatCompletionRequestUserMessageContent::Text(prompt.to_string()),
        name: None,
    })
}
