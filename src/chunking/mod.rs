//! The Hybrid Chunker (§4.B): content-aware text segmentation combining
//! sentence/structure/semantic strategies plus contextual and sliding
//! windows, producing chunks scored for retrieval suitability.
//!
//! Individual strategies (`fixed`, `semantic`, `structure`, `keyinfo`,
//! `dedup`) are composable building blocks; [`hybrid::HybridChunker`]
//! is the orchestrator most callers should use.

pub mod dedup;
pub mod fixed;
pub mod hybrid;
pub mod keyinfo;
pub mod semantic;
pub mod structure;
pub mod traits;

pub use dedup::dedup_chunks;
pub use fixed::FixedChunker;
pub use hybrid::HybridChunker;
pub use keyinfo::extract_key_info;
pub use semantic::SemanticChunker;
pub use traits::{ChunkConfig, Chunker, ChunkingOutcome};

/// Default target chunk size in characters (~1000 tokens at 4 chars/token,
/// per §4.B's default).
pub const DEFAULT_CHUNK_SIZE: usize = 4_000;

/// Default minimum chunk size (~500 tokens).
pub const MIN_CHUNK_SIZE: usize = 2_000;

/// Default maximum chunk size (~2000 tokens).
pub const MAX_CHUNK_SIZE_DEFAULT: usize = 8_000;

/// Default overlap size in characters (~200 tokens).
pub const DEFAULT_OVERLAP: usize = 800;

/// Hard ceiling no chunker will exceed regardless of config.
pub const MAX_CHUNK_SIZE_HARD: usize = 200_000;

/// Creates the default chunker (the Hybrid Chunker at default config).
#[must_use]
pub fn default_chunker() -> HybridChunker {
    HybridChunker::new()
}

/// Creates a chunker by name, for CLI/test selection of a single
/// strategy rather than the full hybrid pipeline.
///
/// # Errors
///
/// Returns [`crate::error::ChunkingError::UnknownStrategy`] if the
/// strategy name is not recognized.
pub fn create_chunker(name: &str) -> crate::error::Result<Box<dyn Chunker>> {
    match name.to_lowercase().as_str() {
        "fixed" | "fallback" => Ok(Box::new(FixedChunker::new())),
        "semantic" => Ok(Box::new(SemanticChunker::new())),
        "hybrid" => Ok(Box::new(HybridChunker::new())),
        _ => Err(crate::error::ChunkingError::UnknownStrategy {
            name: name.to_string(),
        }
        .into()),
    }
}

/// Lists available chunking strategy names.
#[must_use]
pub fn available_strategies() -> Vec<&'static str> {
    vec!["fixed", "semantic", "hybrid"]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_chunker_known_names() {
        assert!(create_chunker("fixed").is_ok());
        assert!(create_chunker("semantic").is_ok());
        assert!(create_chunker("HYBRID").is_ok());
    }

    #[test]
    fn create_chunker_unknown_name() {
        assert!(create_chunker("nonexistent").is_err());
    }

    #[test]
    fn available_strategies_lists_three() {
        assert_eq!(available_strategies().len(), 3);
    }
}
