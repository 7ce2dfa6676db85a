//! The `Chunk` entity (§3): a contiguous text span of a document with
//! metadata and an embedding, the unit of retrieval.
//!
//! Generalizes the teacher's `core::chunk::Chunk` (byte-range based
//! chunk with hashing/preview helpers) with the fields the
//! specification's data model adds: `chunk_type`, `strategy`,
//! `quality_score`, `context_window`, and `embedding`.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::Range;

use serde::{Deserialize, Serialize};

/// Structural role of a chunk, used both for retrieval weighting and
/// for filtering in the Hybrid Retriever.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkType {
    /// Ordinary prose.
    Body,
    /// A heading line promoted to its own chunk.
    Heading,
    /// A list or list fragment.
    List,
    /// A source code block.
    Code,
    /// A table.
    Table,
    /// A chunk produced by key-info extraction (definitions, numeric
    /// facts, conclusions) rather than generic segmentation.
    KeyInfo,
}

impl Default for ChunkType {
    fn default() -> Self {
        Self::Body
    }
}

/// A contiguous span of document text plus retrieval metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    /// Database identity, `None` until persisted.
    pub id: Option<i64>,
    /// Owning document id.
    pub doc_id: String,
    /// The chunk's text content.
    pub text: String,
    /// Half-open byte range `[start_char, end_char)` into the source
    /// document. Named `start_char`/`end_char` in the spec; stored as
    /// byte offsets so slicing stays UTF-8-safe without a separate
    /// char-index pass over the whole document.
    pub range: Range<usize>,
    /// Position among the document's chunks, in source order.
    pub index: usize,
    /// Structural role.
    pub chunk_type: ChunkType,
    /// Which chunking strategy produced this chunk (e.g. `"sentence"`,
    /// `"sliding_window"`, `"fallback"`).
    pub strategy: String,
    /// Retrieval-suitability score in `[0, 1]`, assigned at creation.
    pub quality_score: f32,
    /// Optional neighboring text (not part of `text` itself) kept to
    /// aid retrieval rerank.
    pub context_window: Option<String>,
    /// Embedding vector, populated once (C) has embedded the chunk.
    pub embedding: Option<Vec<f32>>,
    /// Free-form metadata (estimated token count, content hash, etc).
    pub metadata: ChunkMetadata,
}

/// Derived/auxiliary metadata for a [`Chunk`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Estimated token count (see [`crate::text::estimate_tokens`]).
    pub token_count: Option<usize>,
    /// Hex-encoded hash of `text`, for dedup and round-trip checks.
    pub content_hash: Option<String>,
    /// Whether this chunk overlaps its neighbor by design (sliding
    /// window chunks do; primary chunks normally do not).
    pub has_overlap: bool,
}

impl Chunk {
    /// Creates a new chunk with default metadata and no embedding.
    #[must_use]
    pub fn new(doc_id: impl Into<String>, text: String, range: Range<usize>, index: usize) -> Self {
        Self {
            id: None,
            doc_id: doc_id.into(),
            text,
            range,
            index,
            chunk_type: ChunkType::Body,
            strategy: String::from("unspecified"),
            quality_score: 0.5,
            context_window: None,
            embedding: None,
            metadata: ChunkMetadata::default(),
        }
    }

    /// Character (byte) count of the chunk's text.
    #[must_use]
    pub fn size(&self) -> usize {
        self.text.len()
    }

    /// Size implied by the byte range, independent of `text.len()` —
    /// the two should agree for chunks produced by the chunker, but
    /// this is useful for verifying that invariant in tests.
    #[must_use]
    pub const fn range_size(&self) -> usize {
        self.range.end - self.range.start
    }

    /// Start offset of the chunk's range.
    #[must_use]
    pub const fn start(&self) -> usize {
        self.range.start
    }

    /// End offset of the chunk's range.
    #[must_use]
    pub const fn end(&self) -> usize {
        self.range.end
    }

    /// Whether this chunk's range overlaps `other`'s.
    #[must_use]
    pub const fn overlaps_with(&self, other: &Self) -> bool {
        self.start() < other.end() && other.start() < self.end()
    }

    /// Computes and stores a stable hash of `text` in `metadata`.
    pub fn compute_hash(&mut self) {
        let mut hasher = DefaultHasher::new();
        self.text.hash(&mut hasher);
        self.metadata.content_hash = Some(format!("{:016x}", hasher.finish()));
    }

    /// Sets the estimated token count.
    pub const fn set_token_count(&mut self, count: usize) {
        self.metadata.token_count = Some(count);
    }
}

/// Fluent builder for [`Chunk`], mirroring the teacher's `ChunkBuilder`.
#[derive(Debug, Default)]
pub struct ChunkBuilder {
    doc_id: Option<String>,
    text: Option<String>,
    range: Option<Range<usize>>,
    index: usize,
    chunk_type: ChunkType,
    strategy: String,
    quality_score: f32,
    context_window: Option<String>,
}

impl ChunkBuilder {
    /// Starts a new builder.
    #[must_use]
    pub fn new() -> Self {
        Self {
            strategy: String::from("unspecified"),
            quality_score: 0.5,
            ..Self::default()
        }
    }

    /// Sets the owning document id.
    #[must_use]
    pub fn doc_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    /// Sets the chunk text.
    #[must_use]
    pub fn text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    /// Sets the byte range.
    #[must_use]
    pub fn range(mut self, range: Range<usize>) -> Self {
        self.range = Some(range);
        self
    }

    /// Sets the source-order index.
    #[must_use]
    pub const fn index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    /// Sets the structural role.
    #[must_use]
    pub const fn chunk_type(mut self, chunk_type: ChunkType) -> Self {
        self.chunk_type = chunk_type;
        self
    }

    /// Sets the producing strategy name.
    #[must_use]
    pub fn strategy(mut self, strategy: impl Into<String>) -> Self {
        self.strategy = strategy.into();
        self
    }

    /// Sets the quality score, clamped to `[0, 1]`.
    #[must_use]
    pub fn quality_score(mut self, score: f32) -> Self {
        self.quality_score = score.clamp(0.0, 1.0);
        self
    }

    /// Sets the context window text.
    #[must_use]
    pub fn context_window(mut self, text: impl Into<String>) -> Self {
        self.context_window = Some(text.into());
        self
    }

    /// Builds the chunk. Missing `doc_id`/`text`/`range` default to an
    /// empty document id, empty text, and `0..0` respectively rather
    /// than panicking, since a builder is meant to be infallible.
    #[must_use]
    pub fn build(self) -> Chunk {
        let text = self.text.unwrap_or_default();
        let range = self.range.unwrap_or(0..text.len());
        let mut chunk = Chunk {
            id: None,
            doc_id: self.doc_id.unwrap_or_default(),
            text,
            range,
            index: self.index,
            chunk_type: self.chunk_type,
            strategy: self.strategy,
            quality_score: self.quality_score,
            context_window: self.context_window,
            embedding: None,
            metadata: ChunkMetadata::default(),
        };
        chunk.compute_hash();
        chunk
    }
}
