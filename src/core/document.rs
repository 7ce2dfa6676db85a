//! The `Document` entity (§3): identity `doc_id`, uploaded bytes, and a
//! lifecycle status that advances monotonically through whichever
//! stages its pipeline enables.
//!
//! Generalizes the teacher's `core::buffer::Buffer` (source text plus
//! inferred content type) to the specification's richer document
//! record (ownership, project scoping, lifecycle status).

use serde::{Deserialize, Serialize};

/// Lifecycle status of a [`Document`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Uploaded, no processing requested yet.
    Uploaded,
    /// SUMMARY stage running.
    Summarizing,
    /// SUMMARY stage completed.
    Summarized,
    /// INDEX stage running.
    Indexing,
    /// INDEX stage completed.
    Indexed,
    /// ANALYSIS stage running.
    Analyzing,
    /// ANALYSIS stage completed (or the highest enabled stage
    /// completed, if ANALYSIS was not requested).
    Analyzed,
    /// A stage failed and the pipeline will not progress further
    /// without manual intervention.
    Failed,
}

impl DocumentStatus {
    /// Whether this status is terminal (no further automatic
    /// transition will occur).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Analyzed | Self::Failed)
    }
}

/// An uploaded document and its processing lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    /// Opaque, unique identity.
    pub doc_id: String,
    /// Original filename as uploaded.
    pub filename: String,
    /// Declared mime type.
    pub mime: String,
    /// Raw document bytes.
    pub bytes: Vec<u8>,
    /// Owning user id.
    pub owner_id: String,
    /// Owning project id.
    pub project_id: String,
    /// Current lifecycle status.
    pub status: DocumentStatus,
    /// Creation timestamp, Unix seconds.
    pub created_at: i64,
    /// Last-updated timestamp, Unix seconds.
    pub updated_at: i64,
}

impl Document {
    /// Creates a freshly uploaded document in the `Uploaded` state.
    #[must_use]
    pub fn new(
        doc_id: impl Into<String>,
        filename: impl Into<String>,
        mime: impl Into<String>,
        bytes: Vec<u8>,
        owner_id: impl Into<String>,
        project_id: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            doc_id: doc_id.into(),
            filename: filename.into(),
            mime: mime.into(),
            bytes,
            owner_id: owner_id.into(),
            project_id: project_id.into(),
            status: DocumentStatus::Uploaded,
            created_at: now,
            updated_at: now,
        }
    }

    /// The document's text content, lossily decoded as UTF-8 for
    /// text-ish mime types. Binary documents should be routed through
    /// a dedicated extractor before reaching the cognitive core; that
    /// extractor is out of scope (§1) and this is a best-effort
    /// fallback for the mimes the core does understand.
    #[must_use]
    pub fn text(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Size in bytes.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.bytes.len()
    }

    /// Advances `status` and bumps `updated_at`. Does not validate
    /// that the transition is monotonic; callers (the Pipeline runner)
    /// are responsible for only calling this with forward transitions.
    pub fn set_status(&mut self, status: DocumentStatus, now: i64) {
        self.status = status;
        self.updated_at = now;
    }
}

/// Mime types the engine recognizes as processable text.
#[must_use]
pub fn is_supported_mime(mime: &str) -> bool {
    matches!(
        mime,
        "text/plain" | "text/markdown" | "text/html" | "application/json"
    )
}
