//! The `Artifact` entity (§3): a produced, persisted, versioned result
//! of analysis keyed by document and type.
//!
//! New entity — the teacher has no equivalent — but its persistence
//! pattern (JSON content column, `serde_json`) is grounded in the
//! teacher's `Context` save/load through `storage::sqlite`.

use serde::{Deserialize, Serialize};

/// The kind of artifact produced by a pipeline stage or the analyzer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactType {
    /// The SUMMARY stage's persisted summary (the 500-word macro
    /// level — see the Open Question resolution in `DESIGN.md`).
    Summary,
    /// A multi-dimensional outline (logical/topical/temporal/causal).
    Outline,
    /// Entities + relations extracted by the `explore` analyzer stage.
    KnowledgeGraph,
    /// The full analyzer state view, persisted by the `output` stage.
    AnalysisReport,
}

impl ArtifactType {
    /// Stable string form used as the relational store's discriminator.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Outline => "outline",
            Self::KnowledgeGraph => "knowledge_graph",
            Self::AnalysisReport => "analysis_report",
        }
    }
}

/// A versioned, persisted analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    /// Database identity, `None` until persisted.
    pub id: Option<i64>,
    /// Owning document id.
    pub doc_id: String,
    /// Artifact kind.
    pub artifact_type: ArtifactType,
    /// Monotonically increasing version within `(doc_id, artifact_type)`.
    pub version: u32,
    /// Inline JSON content. Large content may instead be a blob
    /// reference stored in this same field as `{"blob_ref": "..."}`;
    /// the distinction is opaque to the relational store.
    pub content: serde_json::Value,
    /// Creation timestamp, Unix seconds.
    pub created_at: i64,
    /// Model/provider that produced this artifact, if any.
    pub model_used: Option<String>,
    /// Token usage incurred producing this artifact, if any.
    pub token_usage: Option<u64>,
}

impl Artifact {
    /// Creates the first version (`version = 1`) of an artifact.
    #[must_use]
    pub fn new(
        doc_id: impl Into<String>,
        artifact_type: ArtifactType,
        content: serde_json::Value,
        now: i64,
    ) -> Self {
        Self {
            id: None,
            doc_id: doc_id.into(),
            artifact_type,
            version: 1,
            content,
            created_at: now,
            model_used: None,
            token_usage: None,
        }
    }

    /// Derives the content hash used by the round-trip idempotence
    /// check in §8: "writing the same analysis twice produces version
    /// N and N+1 with identical content hash."
    #[must_use]
    pub fn content_hash(&self) -> String {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};

        let mut hasher = DefaultHasher::new();
        // `serde_json::Value` does not implement `Hash`; hash its
        // canonical string form instead.
        self.content.to_string().hash(&mut hasher);
        format!("{:016x}", hasher.finish())
    }

    /// Builds the next version of this artifact with new content,
    /// bumping `version` by exactly one.
    #[must_use]
    pub fn next_version(&self, content: serde_json::Value, now: i64) -> Self {
        Self {
            id: None,
            doc_id: self.doc_id.clone(),
            artifact_type: self.artifact_type,
            version: self.version + 1,
            content,
            created_at: now,
            model_used: self.model_used.clone(),
            token_usage: self.token_usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn new_artifact_starts_at_version_one() {
        let art = Artifact::new("d1", ArtifactType::Summary, json!({"text": "hi"}), 0);
        assert_eq!(art.version, 1);
    }

    #[test]
    fn next_version_increments_by_one() {
        let a1 = Artifact::new("d1", ArtifactType::Summary, json!("x"), 0);
        let a2 = a1.next_version(json!("x"), 10);
        assert_eq!(a2.version, 2);
    }

    #[test]
    fn identical_content_hashes_equal_across_versions() {
        let a1 = Artifact::new("d1", ArtifactType::Summary, json!({"text": "same"}), 0);
        let a2 = a1.next_version(json!({"text": "same"}), 10);
        assert_eq!(a1.content_hash(), a2.content_hash());
    }

    #[test]
    fn different_content_hashes_differ() {
        let a1 = Artifact::new("d1", ArtifactType::Summary, json!("a"), 0);
        let a2 = a1.next_version(json!("b"), 10);
        assert_ne!(a1.content_hash(), a2.content_hash());
    }

    #[test]
    fn artifact_type_string_form() {
        assert_eq!(ArtifactType::KnowledgeGraph.as_str(), "knowledge_graph");
    }
}
