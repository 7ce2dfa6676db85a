//! Chunker trait and shared chunking configuration.
//!
//! Generalizes the teacher's `Chunker` trait (unchanged shape) and its
//! `ChunkMetadata` input struct into `ChunkConfig`, covering every knob
//! the Hybrid Chunker's algorithm steps consume.

use crate::core::Chunk;
use crate::error::Result;

/// Trait for chunking text into processable segments.
///
/// Implementations must be `Send + Sync` to support parallel processing.
/// Each chunker should produce consistent, deterministic output for the
/// same input.
pub trait Chunker: Send + Sync {
    /// Chunks the input text into segments.
    ///
    /// # Errors
    ///
    /// Returns an error if chunking fails (e.g., invalid configuration).
    fn chunk(&self, doc_id: &str, text: &str, config: Option<&ChunkConfig>) -> Result<Vec<Chunk>>;

    /// Returns the name of the chunking strategy.
    fn name(&self) -> &'static str;

    /// Returns whether this chunker supports parallel processing.
    fn supports_parallel(&self) -> bool {
        false
    }

    /// Returns a description of the chunking strategy.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Validates configuration before chunking.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk size is zero, `min > max`, or overlap
    /// exceeds the target chunk size.
    fn validate(&self, config: Option<&ChunkConfig>) -> Result<()> {
        if let Some(cfg) = config {
            if cfg.target_chunk_size == 0 {
                return Err(crate::error::ChunkingError::InvalidConfig.into());
            }
            if cfg.min_chunk_size > cfg.max_chunk_size {
                return Err(crate::error::ChunkingError::MinExceedsMax {
                    min: cfg.min_chunk_size,
                    max: cfg.max_chunk_size,
                }
                .into());
            }
            if cfg.overlap >= cfg.target_chunk_size {
                return Err(crate::error::ChunkingError::OverlapTooLarge {
                    overlap: cfg.overlap,
                    chunk_size: cfg.target_chunk_size,
                }
                .into());
            }
        }
        Ok(())
    }
}

/// The outcome of a Hybrid Chunker run (§4.B, redesign flag): every
/// caller must be able to tell primary, fully-featured output apart
/// from a degraded fallback split produced when semantic services
/// (embeddings) are unavailable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkingOutcome {
    /// The full pipeline ran: structure, sentence packing, and
    /// whichever optional steps the config enabled.
    Primary(Vec<Chunk>),
    /// Semantic services were unavailable; chunks came from a raw
    /// fixed-size split and carry `strategy = "fallback"`.
    Fallback(Vec<Chunk>),
}

impl ChunkingOutcome {
    /// Borrows the chunks regardless of which variant produced them.
    #[must_use]
    pub fn chunks(&self) -> &[Chunk] {
        match self {
            Self::Primary(chunks) | Self::Fallback(chunks) => chunks,
        }
    }

    /// Consumes the outcome, returning the chunks regardless of variant.
    #[must_use]
    pub fn into_chunks(self) -> Vec<Chunk> {
        match self {
            Self::Primary(chunks) | Self::Fallback(chunks) => chunks,
        }
    }

    /// Whether this outcome came from the degraded fallback path.
    #[must_use]
    pub const fn is_fallback(&self) -> bool {
        matches!(self, Self::Fallback(_))
    }
}

/// Configuration accepted by the Hybrid Chunker and its component
/// strategies (§4.B).
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// Target chunk size in characters (spec units are tokens; the
    /// text utilities convert, see [`crate::text::estimate_tokens`]).
    pub target_chunk_size: usize,
    /// Minimum chunk size.
    pub min_chunk_size: usize,
    /// Maximum chunk size.
    pub max_chunk_size: usize,
    /// Overlap between consecutive primary/sliding-window chunks.
    pub overlap: usize,
    /// Enable sentence-boundary primary segmentation.
    pub use_sentence: bool,
    /// Enable the structural pre-pass.
    pub use_structure: bool,
    /// Enable embedding-similarity boundary refinement.
    pub use_semantic: bool,
    /// Annotate chunks with preceding/following context text.
    pub use_context_window: bool,
    /// Additionally emit an overlapping sliding-window chunk set.
    pub use_sliding_window: bool,
    /// Extract definitions/numeric facts/conclusions as `key_info`
    /// chunks.
    pub extract_key_info: bool,
    /// Cosine-similarity threshold above which two chunks are
    /// considered near-duplicates, in `[0, 1]`. `None` disables dedup.
    pub dedup_semantic_threshold: Option<f32>,
    /// Maximum chunks to produce (0 = unlimited).
    pub max_chunks: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            target_chunk_size: super::DEFAULT_CHUNK_SIZE,
            min_chunk_size: super::MIN_CHUNK_SIZE,
            max_chunk_size: super::MAX_CHUNK_SIZE_DEFAULT,
            overlap: super::DEFAULT_OVERLAP,
            use_sentence: true,
            use_structure: true,
            use_semantic: false,
            use_context_window: true,
            use_sliding_window: false,
            extract_key_info: true,
            dedup_semantic_threshold: Some(0.92),
            max_chunks: 0,
        }
    }
}

impl ChunkConfig {
    /// Creates a config with the given target size and its remaining
    /// fields at default.
    #[must_use]
    pub fn with_size(target_chunk_size: usize) -> Self {
        Self {
            target_chunk_size,
            ..Self::default()
        }
    }

    /// Validates the invariants §4.B's edge cases name explicitly:
    /// `min <= max`, `target_chunk_size > 0`,
    /// `overlap < target_chunk_size`, threshold in `[0, 1]`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::ChunkingError`] describing the first
    /// violated invariant.
    pub fn validate(&self) -> Result<()> {
        if self.target_chunk_size == 0 {
            return Err(crate::error::ChunkingError::InvalidConfig.into());
        }
        if self.min_chunk_size > self.max_chunk_size {
            return Err(crate::error::ChunkingError::MinExceedsMax {
                min: self.min_chunk_size,
                max: self.max_chunk_size,
            }
            .into());
        }
        if self.overlap >= self.target_chunk_size {
            return Err(crate::error::ChunkingError::OverlapTooLarge {
                overlap: self.overlap,
                chunk_size: self.target_chunk_size,
            }
            .into());
        }
        if let Some(threshold) = self.dedup_semantic_threshold
            && !(0.0..=1.0).contains(&threshold)
        {
            return Err(crate::error::ChunkingError::InvalidThreshold { value: threshold }.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ChunkConfig::default().validate().unwrap();
    }

    #[test]
    fn min_exceeds_max_is_rejected() {
        let cfg = ChunkConfig {
            min_chunk_size: 2000,
            max_chunk_size: 500,
            ..ChunkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn overlap_too_large_is_rejected() {
        let cfg = ChunkConfig {
            target_chunk_size: 100,
            overlap: 100,
            ..ChunkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn threshold_out_of_range_is_rejected() {
        let cfg = ChunkConfig {
            dedup_semantic_threshold: Some(1.5),
            ..ChunkConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn chunking_outcome_unwraps_either_variant() {
        let primary = ChunkingOutcome::Primary(vec![]);
        let fallback = ChunkingOutcome::Fallback(vec![]);
        assert!(!primary.is_fallback());
        assert!(fallback.is_fallback());
    }
}
