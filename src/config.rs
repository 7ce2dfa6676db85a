//! Runtime configuration (§6.2): gateway provider selection, rate
//! limiting, retry bounds, and pipeline stage timeout, resolved with
//! the same cascading precedence the sibling repo's `AgentConfig`
//! documents — explicit builder values override environment
//! variables, which override hardcoded defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::{InputError, Result};
use crate::gateway::RetryConfig;
use crate::pipeline::DEFAULT_STAGE_TIMEOUT_SECS;
use crate::store::DEFAULT_DB_PATH;

/// Default gateway completion/embedding rate limit, requests/sec.
pub const DEFAULT_RATE_LIMIT_RPS: f64 = 5.0;

/// Default maximum retry attempts for a transient gateway fault.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Which Gateway (§4.C) implementation the CLI wires up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GatewayKind {
    /// Deterministic hash-based embeddings and canned completions; no
    /// network calls, the default so the CLI works offline.
    #[default]
    Mock,
    /// An OpenAI-compatible provider, behind the `openai-gateway` feature.
    Live,
}

impl GatewayKind {
    /// Parses a `--gateway` flag value, defaulting to [`Self::Mock`]
    /// for anything unrecognized.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "live" | "openai" => Self::Live,
            _ => Self::Mock,
        }
    }
}

/// Resolved runtime configuration for the engine.
#[derive(Debug, Clone)]
pub struct DpaConfig {
    /// Path to the SQLite state database.
    pub db_path: PathBuf,
    /// Which Gateway implementation to construct.
    pub gateway: GatewayKind,
    /// API key for a live gateway provider.
    pub api_key: Option<String>,
    /// Optional base URL override (proxies, compatible APIs).
    pub base_url: Option<String>,
    /// Completion model name.
    pub completion_model: String,
    /// Embedding model name.
    pub embedding_model: String,
    /// Gateway rate limit, requests/sec.
    pub rate_limit_rps: f64,
    /// Gateway retry policy for transient faults.
    pub retry: RetryConfig,
    /// Per-stage pipeline timeout.
    pub stage_timeout: Duration,
}

impl DpaConfig {
    /// Creates a new builder.
    #[must_use]
    pub fn builder() -> DpaConfigBuilder {
        DpaConfigBuilder::default()
    }

    /// Resolves configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Propagates [`DpaConfigBuilder::build`]'s errors.
    pub fn from_env() -> Result<Self> {
        Self::builder().from_env().build()
    }
}

/// Builder for [`DpaConfig`].
#[derive(Debug, Clone, Default)]
pub struct DpaConfigBuilder {
    db_path: Option<PathBuf>,
    gateway: Option<GatewayKind>,
    api_key: Option<String>,
    base_url: Option<String>,
    completion_model: Option<String>,
    embedding_model: Option<String>,
    rate_limit_rps: Option<f64>,
    max_retries: Option<u32>,
    stage_timeout: Option<Duration>,
}

impl DpaConfigBuilder {
    /// Populates unset fields from `DPA_*` environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.db_path.is_none() {
            self.db_path = std::env::var("DPA_DB_PATH").ok().map(PathBuf::from);
        }
        if self.gateway.is_none() {
            self.gateway = std::env::var("DPA_GATEWAY").ok().map(|v| GatewayKind::parse(&v));
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("DPA_API_KEY").ok();
        }
        if self.base_url.is_none() {
            self.base_url = std::env::var("DPA_BASE_URL").ok();
        }
        if self.completion_model.is_none() {
            self.completion_model = std::env::var("DPA_COMPLETION_MODEL").ok();
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("DPA_EMBEDDING_MODEL").ok();
        }
        if self.rate_limit_rps.is_none() {
            self.rate_limit_rps = std::env::var("DPA_RATE_LIMIT_RPS").ok().and_then(|v| v.parse().ok());
        }
        if self.max_retries.is_none() {
            self.max_retries = std::env::var("DPA_MAX_RETRIES").ok().and_then(|v| v.parse().ok());
        }
        if self.stage_timeout.is_none() {
            self.stage_timeout = std::env::var("DPA_STAGE_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs);
        }
        self
    }

    /// Sets the database path.
    #[must_use]
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets which gateway implementation to construct.
    #[must_use]
    pub const fn gateway(mut self, kind: GatewayKind) -> Self {
        self.gateway = Some(kind);
        self
    }

    /// Sets the live-provider API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets a base URL override.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the gateway rate limit, requests/sec.
    #[must_use]
    pub const fn rate_limit_rps(mut self, rps: f64) -> Self {
        self.rate_limit_rps = Some(rps);
        self
    }

    /// Sets the maximum retry attempts for a transient gateway fault.
    #[must_use]
    pub const fn max_retries(mut self, n: u32) -> Self {
        self.max_retries = Some(n);
        self
    }

    /// Sets the per-stage pipeline timeout.
    #[must_use]
    pub const fn stage_timeout(mut self, timeout: Duration) -> Self {
        self.stage_timeout = Some(timeout);
        self
    }

    /// Builds the [`DpaConfig`], applying defaults to anything unset.
    ///
    /// # Errors
    ///
    /// Returns [`InputError::InvalidArgument`] if [`GatewayKind::Live`]
    /// was selected without an API key.
    pub fn build(self) -> Result<DpaConfig> {
        let gateway = self.gateway.unwrap_or_default();
        if gateway == GatewayKind::Live && self.api_key.is_none() {
            return Err(InputError::InvalidArgument {
                message: "live gateway selected but no API key was provided (--api-key or DPA_API_KEY)".to_string(),
            }
            .into());
        }

        Ok(DpaConfig {
            db_path: self.db_path.unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            gateway,
            api_key: self.api_key,
            base_url: self.base_url,
            completion_model: self.completion_model.unwrap_or_else(|| "gpt-4o-mini".to_string()),
            embedding_model: self.embedding_model.unwrap_or_else(|| "text-embedding-3-small".to_string()),
            rate_limit_rps: self.rate_limit_rps.unwrap_or(DEFAULT_RATE_LIMIT_RPS),
            retry: RetryConfig {
                max_attempts: self.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
                ..RetryConfig::default()
            },
            stage_timeout: self.stage_timeout.unwrap_or(Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_defaults_to_mock_gateway() {
        let config = DpaConfig::builder().build().unwrap();
        assert_eq!(config.gateway, GatewayKind::Mock);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.retry.max_attempts, DEFAULT_MAX_RETRIES);
    }

    #[test]
    fn live_gateway_without_api_key_errors() {
        let result = DpaConfig::builder().gateway(GatewayKind::Live).build();
        assert!(result.is_err());
    }

    #[test]
    fn live_gateway_with_api_key_builds() {
        let config = DpaConfig::builder()
            .gateway(GatewayKind::Live)
            .api_key("sk-test")
            .build()
            .unwrap();
        assert_eq!(config.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn custom_values_override_defaults() {
        let config = DpaConfig::builder()
            .rate_limit_rps(10.0)
            .max_retries(5)
            .stage_timeout(Duration::from_secs(30))
            .build()
            .unwrap();
        assert_eq!(config.rate_limit_rps, 10.0);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.stage_timeout, Duration::from_secs(30));
    }

    #[test]
    fn gateway_kind_parse_is_case_insensitive() {
        assert_eq!(GatewayKind::parse("LIVE"), GatewayKind::Live);
        assert_eq!(GatewayKind::parse("mock"), GatewayKind::Mock);
        assert_eq!(GatewayKind::parse("unknown"), GatewayKind::Mock);
    }
}
