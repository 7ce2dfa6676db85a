//! Fixed-size chunking strategy.
//!
//! The fallback strategy (§4.B edge case: "falls back to raw fixed-size
//! split when semantic services are unavailable"). Splits text into
//! fixed-size segments, respecting UTF-8 character boundaries.

use crate::chunking::traits::{ChunkConfig, Chunker};
use crate::chunking::MAX_CHUNK_SIZE_HARD;
use crate::core::{Chunk, ChunkBuilder};
use crate::error::{ChunkingError, Result};

/// Fixed-size chunker that splits text at character boundaries.
#[derive(Debug, Clone)]
pub struct FixedChunker {
    /// Target chunk size in characters.
    chunk_size: usize,
    /// Overlap between consecutive chunks.
    overlap: usize,
    /// Whether to align chunk ends to line boundaries.
    line_aware: bool,
}

impl Default for FixedChunker {
    fn default() -> Self {
        Self::new()
    }
}

impl FixedChunker {
    /// Creates a new fixed chunker with default settings.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            chunk_size: super::DEFAULT_CHUNK_SIZE,
            overlap: super::DEFAULT_OVERLAP,
            line_aware: true,
        }
    }

    /// Creates a fixed chunker with custom chunk size and no overlap.
    #[must_use]
    pub const fn with_size(chunk_size: usize) -> Self {
        Self {
            chunk_size,
            overlap: 0,
            line_aware: true,
        }
    }

    /// Creates a fixed chunker with custom size and overlap.
    #[must_use]
    pub const fn with_size_and_overlap(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            line_aware: true,
        }
    }

    /// Sets whether to align chunk ends to line boundaries.
    #[must_use]
    pub const fn line_aware(mut self, enabled: bool) -> Self {
        self.line_aware = enabled;
        self
    }

    /// Finds a valid chunk boundary respecting UTF-8 and optionally lines.
    fn find_boundary(&self, text: &str, target_pos: usize) -> usize {
        let mut pos = target_pos.min(text.len());
        while !text.is_char_boundary(pos) && pos > 0 {
            pos -= 1;
        }
        if self.line_aware && pos > 0 {
            let search_start = pos.saturating_sub(self.chunk_size / 10);
            if let Some(newline_offset) = text[search_start..pos].rfind('\n') {
                let newline_pos = search_start + newline_offset + 1;
                if newline_pos > search_start {
                    return newline_pos;
                }
            }
        }
        pos
    }
}

impl Chunker for FixedChunker {
    fn chunk(&self, doc_id: &str, text: &str, config: Option<&ChunkConfig>) -> Result<Vec<Chunk>> {
        let (chunk_size, overlap) = config.map_or((self.chunk_size, self.overlap), |cfg| {
            (cfg.target_chunk_size, cfg.overlap)
        });

        if chunk_size == 0 {
            return Err(ChunkingError::InvalidConfig.into());
        }
        if chunk_size > MAX_CHUNK_SIZE_HARD {
            return Err(ChunkingError::MinExceedsMax {
                min: chunk_size,
                max: MAX_CHUNK_SIZE_HARD,
            }
            .into());
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

        if text.len() <= chunk_size {
            return Ok(vec![ChunkBuilder::new()
                .doc_id(doc_id)
                .text(text)
                .range(0..text.len())
                .strategy("fallback")
                .build()]);
        }

        let mut chunks = Vec::new();
        let mut start = 0;
        let mut index = 0;

        while start < text.len() {
            let target_end = (start + chunk_size).min(text.len());
            let end = if target_end >= text.len() {
                text.len()
            } else {
                self.find_boundary(text, target_end)
            };
            let end = if end <= start {
                (start + chunk_size).min(text.len())
            } else {
                end
            };

            let mut builder = ChunkBuilder::new()
                .doc_id(doc_id)
                .text(&text[start..end])
                .range(start..end)
                .index(index)
                .strategy("fallback");
            if index > 0 && overlap > 0 {
                builder = builder.quality_score(0.4);
            }
            chunks.push(builder.build());

            if let Some(cfg) = config
                && cfg.max_chunks > 0
                && chunks.len() >= cfg.max_chunks
            {
                break;
            }
            if end >= text.len() {
                break;
            }

            let next_start = if overlap > 0 { end.saturating_sub(overlap) } else { end };
            start = if next_start <= start { end } else { next_start };
            index += 1;
        }

        Ok(chunks)
    }

    fn name(&self) -> &'static str {
        "fallback"
    }

    fn description(&self) -> &'static str {
        "Fixed-size chunking used when semantic services are unavailable"
    }
}
