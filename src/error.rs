//! Error hierarchy for the document analysis engine.
//!
//! Mirrors the abstract error kinds of the core specification
//! (`InputError`, `NotFound`, `Conflict`, `GatewayTransient`,
//! `GatewayPermanent`, `StoreUnavailable`, `Cancelled`, `Internal`) as a
//! crate-root [`Error`] enum with one variant per kind, each wrapping a
//! richer per-subsystem sub-error via `#[from]`.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error classification surfaced to callers of the public API.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid arguments, unsupported mime type, or an empty upload.
    #[error("invalid input: {0}")]
    Input(#[from] InputError),

    /// An unknown `doc_id`, `pipeline_id`, or artifact type was requested.
    #[error("not found: {0}")]
    NotFound(#[from] NotFoundError),

    /// A request conflicts with an invariant (second active pipeline,
    /// resuming a pipeline that is not resumable).
    #[error("conflict: {0}")]
    Conflict(#[from] ConflictError),

    /// Chunking failed or was misconfigured.
    #[error(transparent)]
    Chunking(#[from] ChunkingError),

    /// The embedding/LLM gateway failed transiently (retried, then
    /// surfaced once the retry budget is exhausted).
    #[error("gateway transient error: {0}")]
    GatewayTransient(#[from] GatewayTransientError),

    /// The embedding/LLM gateway failed permanently (not retried).
    #[error("gateway permanent error: {0}")]
    GatewayPermanent(#[from] GatewayPermanentError),

    /// A downstream store (vector/graph/kv/blob/relational) is
    /// unavailable and the operation could not degrade gracefully.
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    /// The operation was cancelled by an interrupt request or deadline.
    #[error("cancelled: {0}")]
    Cancelled(#[from] CancelledError),

    /// Anything else; always logged with full context before
    /// conversion to this variant.
    #[error("internal error: {message}")]
    Internal {
        /// Human-readable description, safe to surface to callers.
        message: String,
    },
}

impl Error {
    /// Machine-readable error code, stable across releases.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::Input(_) => "InputError",
            Self::NotFound(_) => "NotFound",
            Self::Conflict(_) => "Conflict",
            Self::Chunking(_) => "ChunkingError",
            Self::GatewayTransient(_) => "GatewayTransient",
            Self::GatewayPermanent(_) => "GatewayPermanent",
            Self::StoreUnavailable(_) => "StoreUnavailable",
            Self::Cancelled(_) => "Cancelled",
            Self::Internal { .. } => "Internal",
        }
    }

    /// Whether the Pipeline runner should retry the operation that
    /// produced this error.
    #[must_use]
    pub const fn retriable(&self) -> bool {
        matches!(self, Self::GatewayTransient(_) | Self::StoreUnavailable(_))
    }

    /// Construct an [`Error::Internal`] from a context string.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

/// Structured, user-visible failure object per §7 of the specification.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ErrorObject {
    /// Machine-readable code, e.g. `"GatewayPermanent"`.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Whether the caller may retry the operation.
    pub retriable: bool,
}

impl From<&Error> for ErrorObject {
    fn from(err: &Error) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
            retriable: err.retriable(),
        }
    }
}

impl fmt::Display for ErrorObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}, retriable={})",
            self.message, self.code, self.retriable
        )
    }
}

/// Invalid-argument errors.
#[derive(Debug, thiserror::Error)]
pub enum InputError {
    /// The upload payload was empty.
    #[error("uploaded document is empty")]
    EmptyDocument,

    /// The mime type is not one the engine understands.
    #[error("unsupported mime type: {mime}")]
    UnsupportedMime {
        /// The rejected mime type.
        mime: String,
    },

    /// A required field or option was missing or malformed.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of what was wrong.
        message: String,
    },
}

/// Entity-not-found errors.
#[derive(Debug, thiserror::Error)]
pub enum NotFoundError {
    /// No document with this id exists.
    #[error("document not found: {doc_id}")]
    Document {
        /// The missing document id.
        doc_id: String,
    },

    /// No pipeline with this id exists.
    #[error("pipeline not found: {pipeline_id}")]
    Pipeline {
        /// The missing pipeline id.
        pipeline_id: String,
    },

    /// No artifact of the requested type exists for the document.
    #[error("artifact not found: doc_id={doc_id} type={artifact_type}")]
    Artifact {
        /// Owning document id.
        doc_id: String,
        /// Requested artifact type.
        artifact_type: String,
    },

    /// No conversation with this id exists.
    #[error("conversation not found: {conversation_id}")]
    Conversation {
        /// The missing conversation id.
        conversation_id: String,
    },
}

/// Invariant-violation errors.
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// The document already has an active (non-terminal) pipeline.
    #[error("document {doc_id} already has an active pipeline {pipeline_id}")]
    ActivePipelineExists {
        /// The document already under processing.
        doc_id: String,
        /// The already-active pipeline.
        pipeline_id: String,
    },

    /// The caller tried to resume a pipeline that cannot be resumed.
    #[error("pipeline {pipeline_id} cannot be resumed (can_resume=false)")]
    NotResumable {
        /// The pipeline the caller tried to resume.
        pipeline_id: String,
    },

    /// The caller tried to interrupt a pipeline that has already
    /// reached a terminal state.
    #[error("pipeline {pipeline_id} has already terminated")]
    AlreadyTerminal {
        /// The pipeline in question.
        pipeline_id: String,
    },
}

/// Errors arising from the Hybrid Chunker.
#[derive(Debug, thiserror::Error)]
pub enum ChunkingError {
    /// The text to chunk was empty.
    #[error("cannot chunk empty text")]
    EmptyInput,

    /// `chunk_size` was zero.
    #[error("chunk size must be greater than zero")]
    InvalidConfig,

    /// `min_chunk_size > max_chunk_size`.
    #[error("min_chunk_size ({min}) must not exceed max_chunk_size ({max})")]
    MinExceedsMax {
        /// Configured minimum.
        min: usize,
        /// Configured maximum.
        max: usize,
    },

    /// `overlap >= chunk_size`.
    #[error("overlap ({overlap}) must be less than chunk_size ({chunk_size})")]
    OverlapTooLarge {
        /// Configured overlap.
        overlap: usize,
        /// Configured chunk size.
        chunk_size: usize,
    },

    /// `dedup_semantic_threshold` was outside `[0, 1]`.
    #[error("dedup_semantic_threshold must be in [0, 1], got {value}")]
    InvalidThreshold {
        /// The out-of-range value supplied.
        value: f32,
    },

    /// An unknown strategy name was requested from a chunker registry.
    #[error("unknown chunking strategy: {name}")]
    UnknownStrategy {
        /// The unrecognized strategy name.
        name: String,
    },

    /// A regex used by structural detection or key-info extraction
    /// failed to compile.
    #[error("regex error: {0}")]
    Regex(String),

    /// Invalid UTF-8 was encountered while slicing text.
    #[error("invalid UTF-8 in input text: {0}")]
    InvalidUtf8(String),
}

impl From<regex::Error> for ChunkingError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}

impl From<std::string::FromUtf8Error> for ChunkingError {
    fn from(err: std::string::FromUtf8Error) -> Self {
        Self::InvalidUtf8(err.to_string())
    }
}

impl From<std::str::Utf8Error> for ChunkingError {
    fn from(err: std::str::Utf8Error) -> Self {
        Self::InvalidUtf8(err.to_string())
    }
}

/// Transient gateway faults: retried with backoff before surfacing.
#[derive(Debug, thiserror::Error)]
pub enum GatewayTransientError {
    /// The provider returned a 5xx-equivalent status.
    #[error("provider {provider} returned a server error: {message}")]
    ServerError {
        /// Provider name.
        provider: String,
        /// Error detail from the provider.
        message: String,
    },

    /// The provider rate-limited the request (429-equivalent).
    #[error("provider {provider} rate limited the request")]
    RateLimited {
        /// Provider name.
        provider: String,
    },

    /// The request exceeded its deadline.
    #[error("provider {provider} request timed out after {elapsed_ms}ms")]
    Timeout {
        /// Provider name.
        provider: String,
        /// Elapsed time before the timeout fired.
        elapsed_ms: u64,
    },
}

/// Permanent gateway faults: never retried.
#[derive(Debug, thiserror::Error)]
pub enum GatewayPermanentError {
    /// The provider rejected the request as malformed (4xx-equivalent).
    #[error("provider {provider} rejected the request: {message}")]
    BadRequest {
        /// Provider name.
        provider: String,
        /// Error detail from the provider.
        message: String,
    },

    /// The provider key's quota has been exhausted.
    #[error("provider {provider} quota exhausted")]
    QuotaExhausted {
        /// Provider name.
        provider: String,
    },

    /// Authentication with the provider failed.
    #[error("provider {provider} rejected credentials")]
    Unauthorized {
        /// Provider name.
        provider: String,
    },
}

/// Errors arising from a Store Adapter (§4.D).
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The underlying `SQLite` relational store failed.
    #[error("relational store error: {0}")]
    Relational(String),

    /// The vector store is unavailable.
    #[error("vector store unavailable: {reason}")]
    VectorUnavailable {
        /// Why the store could not be reached.
        reason: String,
    },

    /// The graph store is unavailable.
    #[error("graph store unavailable: {reason}")]
    GraphUnavailable {
        /// Why the store could not be reached.
        reason: String,
    },

    /// The KV cache is unavailable.
    #[error("kv cache unavailable: {reason}")]
    KvUnavailable {
        /// Why the store could not be reached.
        reason: String,
    },

    /// The blob store is unavailable.
    #[error("blob store unavailable: {reason}")]
    BlobUnavailable {
        /// Why the store could not be reached.
        reason: String,
    },

    /// All retrieval sources failed; degradation is no longer possible.
    #[error("all retrieval sources failed")]
    AllSourcesFailed,
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Relational(err.to_string())
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::StoreUnavailable(StoreError::from(err))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Relational(format!("serialization error: {err}"))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::StoreUnavailable(StoreError::from(err))
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("io error: {err}"),
        }
    }
}

/// Cancellation reasons.
#[derive(Debug, thiserror::Error)]
pub enum CancelledError {
    /// An explicit `interrupt_pipeline` request was honored.
    #[error("stage was interrupted")]
    Interrupted,

    /// The stage deadline elapsed before it completed.
    #[error("stage exceeded its deadline of {deadline_secs}s")]
    DeadlineExceeded {
        /// Configured deadline, in seconds.
        deadline_secs: u64,
    },
}
