//! Sentence-boundary-aware primary segmentation (§4.B step 2).
//!
//! Packs sentences greedily up to `target_chunk_size`, never splitting
//! a sentence, while respecting `min_chunk_size`/`max_chunk_size`.

use crate::chunking::traits::{ChunkConfig, Chunker};
use crate::core::{Chunk, ChunkBuilder};
use crate::error::{ChunkingError, Result};
use crate::text::split_sentences;

/// Sentence-packing chunker; the primary strategy inside the Hybrid
/// Chunker when `use_sentence` is set.
#[derive(Debug, Clone)]
pub struct SemanticChunker {
    /// Target chunk size in characters.
    chunk_size: usize,
    /// Overlap between consecutive chunks.
    overlap: usize,
    /// Minimum chunk size; a trailing short chunk is merged into its
    /// predecessor rather than emitted on its own.
    min_chunk_size: usize,
}

impl Default for SemanticChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl SemanticChunker {
    /// Creates a new semantic chunker with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: super::DEFAULT_CHUNK_SIZE,
            overlap: super::DEFAULT_OVERLAP,
            min_chunk_size: super::MIN_CHUNK_SIZE,
        }
    }

    /// Creates a semantic chunker with custom chunk size and no overlap.
    #[must_use]
    pub const fn with_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            overlap: 0,
            min_chunk_size: 100,
        }
    }

    /// Creates a semantic chunker with custom size and overlap.
    #[must_use]
    pub const fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            min_chunk_size: 100,
        }
    }

    /// Sets the minimum chunk size.
    #[must_use]
    pub const fn min_chunk_size(mut self, size: usize) -> Self {
        self.min_chunk_size = size;
        self
    }

    /// Packs the section's sentences into chunks, greedily filling to
    /// `chunk_size` without ever splitting a sentence.
    fn pack(&self, doc_id: &str, text: &str, section_offset: usize, start_index: usize) -> Vec<Chunk> {
        let sentences = split_sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut cur_start = sentences[0].start;
        let mut cur_end = sentences[0].start;
        let mut index = start_index;

        for sentence in &sentences {
            let candidate_len = sentence.end - cur_start;
            if candidate_len > self.chunk_size && cur_end > cur_start {
                chunks.push(self.emit(doc_id, text, cur_start, cur_end, section_offset, index));
                index += 1;
                cur_start = sentence.start;
            }
            cur_end = sentence.end;
        }
        if cur_end > cur_start {
            chunks.push(self.emit(doc_id, text, cur_start, cur_end, section_offset, index));
        }

        // Merge a too-small trailing chunk into its predecessor.
        if chunks.len() > 1 {
            let last_len = chunks.last().map(Chunk::size).unwrap_or_default();
            if last_len < self.min_chunk_size {
                let last = chunks.pop().expect("checked len > 1");
                let prev = chunks.last_mut().expect("checked len > 1");
                let merged_start = prev.range.start;
                let merged_end = last.range.end;
                prev.text = text[merged_start - section_offset..merged_end - section_offset].to_string();
                prev.range = merged_start..merged_end;
                prev.compute_hash();
            }
        }

        chunks
    }

    fn emit(&self, doc_id: &str, section_text: &str, local_start: usize, local_end: usize, offset: usize, index: usize) -> Chunk {
        let slice = &section_text[local_start..local_end];
        ChunkBuilder::new()
            .doc_id(doc_id)
            .text(slice)
            .range((offset + local_start)..(offset + local_end))
            .index(index)
            .strategy("sentence")
            .build()
    }
}

impl Chunker for SemanticChunker {
    fn chunk(&self, doc_id: &str, text: &str, config: Option<&ChunkConfig>) -> Result<Vec<Chunk>> {
        let (chunk_size, overlap) = config.map_or((self.chunk_size, self.overlap), |cfg| {
            (cfg.target_chunk_size, cfg.overlap)
        });
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig.into());
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::OverlapTooLarge {
                overlap,
                chunk_size,
            }
            .into());
        }
        if text.is_empty() {
            return Err(ChunkingError::EmptyInput.into());
        }

        let sized = Self {
            chunk_size,
            overlap,
            min_chunk_size: self.min_chunk_size,
        };
        Ok(sized.pack(doc_id, text, 0, 0))
    }

    fn name(&self) -> &'static str {
        "sentence"
    }

    fn supports_parallel(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Sentence-boundary-aware greedy packing, never splitting a sentence"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_is_rejected() {
        let chunker = SemanticChunker::new();
        assert!(chunker.chunk("d1", "", None).is_err());
    }

    #[test]
    fn small_text_yields_one_chunk() {
        let chunker = SemanticChunker::new();
        let text = "Hello, world!";
        let chunks = chunker.chunk("d1", text, None).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, text);
    }

    #[test]
    fn never_splits_a_sentence() {
        let chunker = SemanticChunker::with_size(20);
        let text = "First sentence here. Second sentence here. Third sentence here.";
        let chunks = chunker.chunk("d1", text, None).unwrap();
        for chunk in &chunks {
            let trimmed = chunk.text.trim();
            assert!(trimmed.ends_with('.') || chunk.index == chunks.len() - 1);
        }
    }

    #[test]
    fn ranges_are_exact_slices_of_source() {
        let chunker = SemanticChunker::with_size(15);
        let text = "One. Two. Three. Four. Five.";
        let chunks = chunker.chunk("d1", text, None).unwrap();
        for chunk in &chunks {
            assert_eq!(&text[chunk.range.clone()], chunk.text);
        }
    }

    #[test]
    fn overlap_too_large_is_rejected() {
        let chunker = SemanticChunker::with_size_and_overlap(10, 15);
        assert!(chunker.chunk("d1", "test content here", None).is_err());
    }

    #[test]
    fn strategy_name_is_sentence() {
        let chunker = SemanticChunker::new();
        assert_eq!(chunker.name(), "sentence");
        let chunks = chunker.chunk("d1", "Hello!", None).unwrap();
        assert_eq!(chunks[0].strategy, "sentence");
    }
}
