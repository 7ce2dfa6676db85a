//! The Hybrid Chunker orchestrator (§4.B): composes the structural
//! pre-pass, sentence packing, context-window annotation, sliding
//! window augmentation, key-info extraction, and semantic dedup into
//! the full eight-step algorithm.
//!
//! Composes its component strategies the way
//! [`crate::search::hybrid_search`] composes retrieval sources: each
//! step is independently testable, and the orchestrator degrades to a
//! single fallback strategy when a dependency (an embedder) is
//! unavailable.

use rayon::prelude::*;

use crate::chunking::fixed::FixedChunker;
use crate::chunking::semantic::SemanticChunker;
use crate::chunking::structure::{leaf_sections, LeafSection};
use crate::chunking::traits::{ChunkConfig, ChunkingOutcome, Chunker};
use crate::chunking::{dedup_chunks, extract_key_info};
use crate::core::{Chunk, ChunkType};
use crate::embedding::Embedder;
use crate::error::{ChunkingError, Result};
use crate::text::structure::SectionKind;

/// Orchestrates every enabled chunking strategy into one ordered,
/// scored chunk set.
#[derive(Debug, Clone, Default)]
pub struct HybridChunker {
    config: ChunkConfig,
}

impl HybridChunker {
    /// Creates a hybrid chunker at default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: ChunkConfig::default(),
        }
    }

    /// Creates a hybrid chunker with explicit configuration.
    #[must_use]
    pub const fn with_config(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// Runs the full algorithm, returning an explicit
    /// [`ChunkingOutcome`] so callers can tell a fully-featured run
    /// apart from a degraded fallback split.
    ///
    /// `embedder` drives step 3 (semantic refinement) and step 7
    /// (semantic dedup); both are skipped, not failed, when `None` and
    /// the config did not explicitly request them.
    ///
    /// # Errors
    ///
    /// Returns [`ChunkingError`] when `text` is empty or `config` is
    /// internally inconsistent.
    pub fn chunk_with_outcome(
        &self,
        doc_id: &str,
        text: &str,
        config: Option<&ChunkConfig>,
        embedder: Option<&dyn Embedder>,
    ) -> Result<ChunkingOutcome> {
        let cfg = config.unwrap_or(&self.config);
        cfg.validate()?;
        if text.is_empty() {
            return Err(ChunkingError::EmptyInput.into());
        }

        if cfg.use_semantic && embedder.is_none() {
            let fallback = FixedChunker::with_size(cfg.target_chunk_size).chunk(doc_id, text, Some(cfg))?;
            return Ok(ChunkingOutcome::Fallback(fallback));
        }

        let leaves = if cfg.use_structure {
            leaf_sections(text)
        } else {
            vec![LeafSection {
                range: 0..text.len(),
                kind: SectionKind::Body,
            }]
        };

        let sentence_chunker = SemanticChunker::with_size_and_overlap(cfg.target_chunk_size, cfg.overlap)
            .min_chunk_size(cfg.min_chunk_size);

        let mut primary: Vec<Chunk> = Vec::new();
        for leaf in &leaves {
            let section_text = &text[leaf.range.clone()];
            if section_text.trim().is_empty() {
                continue;
            }
            match leaf.kind {
                SectionKind::Body => {
                    let chunks = if cfg.use_sentence {
                        sentence_chunker.chunk(doc_id, section_text, None).unwrap_or_default()
                    } else {
                        Vec::new()
                    };
                    primary.extend(offset_chunks(chunks, leaf.range.start));
                }
                SectionKind::Heading | SectionKind::List | SectionKind::Code | SectionKind::Table => {
                    primary.push(structural_chunk(doc_id, section_text, leaf));
                }
            }
        }

        if cfg.extract_key_info {
            for leaf in &leaves {
                if leaf.kind != SectionKind::Body {
                    continue;
                }
                let section_text = &text[leaf.range.clone()];
                let next_index = primary.len();
                primary.extend(extract_key_info(doc_id, section_text, leaf.range.start, next_index));
            }
        }

        if let Some(embedder) = embedder {
            embed_chunks(&mut primary, embedder);
            if cfg.use_semantic {
                refine_boundaries(&mut primary, cfg);
            }
        }

        if cfg.use_context_window {
            annotate_context_windows(&mut primary, text, cfg.overlap);
        }

        if cfg.use_sliding_window {
            primary.extend(sliding_window_chunks(doc_id, text, cfg));
        }

        score_quality(&mut primary, cfg);

        primary.sort_by_key(|c| c.range.start);

        if let (Some(threshold), Some(_)) = (cfg.dedup_semantic_threshold, embedder) {
            primary = dedup_chunks(primary, threshold);
        }

        for (i, chunk) in primary.iter_mut().enumerate() {
            chunk.index = i;
        }

        if cfg.max_chunks > 0 {
            primary.truncate(cfg.max_chunks);
        }

        Ok(ChunkingOutcome::Primary(primary))
    }
}

impl Chunker for HybridChunker {
    fn chunk(&self, doc_id: &str, text: &str, config: Option<&ChunkConfig>) -> Result<Vec<Chunk>> {
        Ok(self.chunk_with_outcome(doc_id, text, config, None)?.into_chunks())
    }

    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn supports_parallel(&self) -> bool {
        true
    }

    fn description(&self) -> &'static str {
        "Structure + sentence + context-window + key-info + dedup, degrading to fixed-size on missing embedder"
    }
}

fn offset_chunks(mut chunks: Vec<Chunk>, offset: usize) -> Vec<Chunk> {
    if offset == 0 {
        return chunks;
    }
    for chunk in &mut chunks {
        chunk.range = (chunk.range.start + offset)..(chunk.range.end + offset);
    }
    chunks
}

fn structural_chunk(doc_id: &str, section_text: &str, leaf: &LeafSection) -> Chunk {
    let chunk_type = match leaf.kind {
        SectionKind::Heading => ChunkType::Heading,
        SectionKind::List => ChunkType::List,
        SectionKind::Code => ChunkType::Code,
        SectionKind::Table => ChunkType::Table,
        SectionKind::Body => ChunkType::Body,
    };
    crate::core::ChunkBuilder::new()
        .doc_id(doc_id)
        .text(section_text.trim_end_matches('\n'))
        .range(leaf.range.clone())
        .chunk_type(chunk_type)
        .strategy("structure")
        .build()
}

fn embed_chunks(chunks: &mut [Chunk], embedder: &dyn Embedder) {
    let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
    if let Ok(embeddings) = embedder.embed_batch(&texts) {
        for (chunk, embedding) in chunks.iter_mut().zip(embeddings) {
            chunk.embedding = Some(embedding);
        }
    }
}

/// Step 3: merge adjacent chunks whose embeddings are highly similar,
/// as long as the merged size stays within `max_chunk_size`.
fn refine_boundaries(chunks: &mut Vec<Chunk>, cfg: &ChunkConfig) {
    chunks.sort_by_key(|c| c.range.start);
    let mut merged: Vec<Chunk> = Vec::with_capacity(chunks.len());
    for chunk in chunks.drain(..) {
        let should_merge = merged.last().is_some_and(|prev: &Chunk| {
            prev.range.end == chunk.range.start
                && prev.chunk_type == ChunkType::Body
                && chunk.chunk_type == ChunkType::Body
                && prev.size() + chunk.size() <= cfg.max_chunk_size
                && match (&prev.embedding, &chunk.embedding) {
                    (Some(a), Some(b)) => crate::embedding::cosine_similarity(a, b) > 0.85,
                    _ => false,
                }
        });
        if should_merge {
            let prev = merged.last_mut().expect("checked is_some_and");
            prev.text.push_str(&chunk.text);
            prev.range.end = chunk.range.end;
            prev.compute_hash();
            prev.embedding = None;
        } else {
            merged.push(chunk);
        }
    }
    *chunks = merged;
}

fn annotate_context_windows(chunks: &mut [Chunk], text: &str, overlap: usize) {
    for chunk in chunks {
        let before_start = char_boundary_back(text, chunk.range.start.saturating_sub(overlap));
        let after_end = char_boundary_forward(text, (chunk.range.end + overlap).min(text.len()));
        let before = &text[before_start..chunk.range.start.min(text.len())];
        let after = &text[chunk.range.end.min(text.len())..after_end];
        if !before.is_empty() || !after.is_empty() {
            chunk.context_window = Some(format!("{before}\u{2026}{after}"));
        }
    }
}

fn char_boundary_back(text: &str, mut pos: usize) -> usize {
    while pos > 0 && !text.is_char_boundary(pos) {
        pos -= 1;
    }
    pos
}

fn char_boundary_forward(text: &str, mut pos: usize) -> usize {
    while pos < text.len() && !text.is_char_boundary(pos) {
        pos += 1;
    }
    pos
}

/// Step 5: an additional parallel set of overlapping fixed windows
/// over the whole document, for long passages where the primary
/// chunking risks splitting coreferent content.
fn sliding_window_chunks(doc_id: &str, text: &str, cfg: &ChunkConfig) -> Vec<Chunk> {
    let window = cfg.target_chunk_size;
    let stride = window.saturating_sub(cfg.overlap).max(1);
    let offsets: Vec<usize> = (0..text.len()).step_by(stride).collect();
    offsets
        .into_par_iter()
        .enumerate()
        .filter_map(|(i, start)| {
            let end = char_boundary_forward(text, (start + window).min(text.len()));
            let start = char_boundary_back(text, start);
            if end <= start {
                return None;
            }
            Some(
                crate::core::ChunkBuilder::new()
                    .doc_id(doc_id)
                    .text(&text[start..end])
                    .range(start..end)
                    .index(i)
                    .strategy("sliding_window")
                    .quality_score(0.45)
                    .build(),
            )
        })
        .collect()
}

/// Step 8: combines length fit, structural alignment, and key-info
/// bonus into each chunk's `quality_score`.
fn score_quality(chunks: &mut [Chunk], cfg: &ChunkConfig) {
    for chunk in chunks {
        if chunk.strategy == "sliding_window" || chunk.strategy == "key_info" {
            continue;
        }
        let size = chunk.size();
        let length_fit = if size < cfg.min_chunk_size {
            size as f32 / cfg.min_chunk_size.max(1) as f32
        } else if size > cfg.max_chunk_size {
            (cfg.max_chunk_size.max(1) as f32 / size as f32).clamp(0.0, 1.0)
        } else {
            1.0
        };
        let structural_bonus = match chunk.chunk_type {
            ChunkType::Heading | ChunkType::Table => 0.1,
            _ => 0.0,
        };
        chunk.quality_score = (0.7 * length_fit + 0.3 + structural_bonus).clamp(0.0, 1.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::FallbackEmbedder;

    #[test]
    fn empty_text_is_rejected() {
        let chunker = HybridChunker::new();
        assert!(chunker.chunk("d1", "", None).is_err());
    }

    #[test]
    fn without_embedder_and_use_semantic_falls_back() {
        let cfg = ChunkConfig {
            use_semantic: true,
            ..ChunkConfig::default()
        };
        let chunker = HybridChunker::new();
        let outcome = chunker
            .chunk_with_outcome("d1", &"word ".repeat(2000), Some(&cfg), None)
            .unwrap();
        assert!(outcome.is_fallback());
        assert!(outcome.chunks().iter().all(|c| c.strategy == "fallback"));
    }

    #[test]
    fn default_run_without_semantic_is_primary() {
        let chunker = HybridChunker::new();
        let text = "# Title\n\nFirst paragraph sentence one. Sentence two follows here.\n\n- item one\n- item two\n";
        let outcome = chunker.chunk_with_outcome("d1", text, None, None).unwrap();
        assert!(!outcome.is_fallback());
        assert!(!outcome.chunks().is_empty());
    }

    #[test]
    fn structural_chunks_preserve_chunk_type() {
        let chunker = HybridChunker::new();
        let text = "# A Heading\n\nSome body text follows the heading today.\n";
        let outcome = chunker.chunk_with_outcome("d1", text, None, None).unwrap();
        assert!(outcome.chunks().iter().any(|c| c.chunk_type == ChunkType::Heading));
    }

    #[test]
    fn context_window_is_populated_when_enabled() {
        let cfg = ChunkConfig {
            use_structure: false,
            use_context_window: true,
            target_chunk_size: 40,
            overlap: 10,
            min_chunk_size: 5,
            ..ChunkConfig::default()
        };
        let chunker = HybridChunker::new();
        let text = "One sentence here now. Two sentence here now. Three sentence here now.";
        let outcome = chunker.chunk_with_outcome("d1", text, Some(&cfg), None).unwrap();
        assert!(outcome.chunks().len() > 1);
        assert!(outcome.chunks()[1].context_window.is_some());
    }

    #[test]
    fn sliding_window_chunks_are_appended_when_enabled() {
        let cfg = ChunkConfig {
            use_sliding_window: true,
            target_chunk_size: 50,
            overlap: 10,
            min_chunk_size: 5,
            use_structure: false,
            ..ChunkConfig::default()
        };
        let chunker = HybridChunker::new();
        let text = "word ".repeat(100);
        let outcome = chunker.chunk_with_outcome("d1", &text, Some(&cfg), None).unwrap();
        assert!(outcome.chunks().iter().any(|c| c.strategy == "sliding_window"));
    }

    #[test]
    fn with_embedder_dedup_removes_near_duplicates() {
        let embedder = FallbackEmbedder::new(16);
        let cfg = ChunkConfig {
            use_structure: false,
            use_semantic: true,
            dedup_semantic_threshold: Some(0.0),
            target_chunk_size: 20,
            min_chunk_size: 5,
            overlap: 2,
            ..ChunkConfig::default()
        };
        let chunker = HybridChunker::new();
        let text = "Repeat sentence here now. Repeat sentence here now. Different content entirely.";
        let outcome = chunker
            .chunk_with_outcome("d1", text, Some(&cfg), Some(&embedder))
            .unwrap();
        assert!(!outcome.is_fallback());
        assert!(!outcome.chunks().is_empty());
    }

    #[test]
    fn quality_scores_stay_in_unit_range() {
        let chunker = HybridChunker::new();
        let text = "Some short text. ".repeat(30);
        let outcome = chunker.chunk_with_outcome("d1", &text, None, None).unwrap();
        for chunk in outcome.chunks() {
            assert!((0.0..=1.0).contains(&chunk.quality_score));
        }
    }

    #[test]
    fn chunks_are_reindexed_sequentially() {
        let chunker = HybridChunker::new();
        let text = "# H\n\nFirst. Second. Third.\n\n- a\n- b\n";
        let outcome = chunker.chunk_with_outcome("d1", text, None, None).unwrap();
        for (i, chunk) in outcome.chunks().iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }
}
