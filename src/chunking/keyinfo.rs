//! Key-info extraction (§4.B step 6): scans sentence-level text for
//! definitions, numeric facts, and conclusion sentences, promoting
//! them to `chunk_type = key_info` chunks with a higher default
//! `quality_score`.

use regex::Regex;
use std::sync::LazyLock;

use crate::core::{ChunkBuilder, ChunkType};
use crate::core::Chunk;
use crate::text::split_sentences;

static DEFINITION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\w[\w\s]{0,40}\b\s+(is defined as|refers to|means that|is a)\s").expect("valid regex")
});

static NUMERIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d[\d,.]*\s?(%|percent|million|billion|thousand)?\b").expect("valid regex"));

static CONCLUSION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(in conclusion|therefore|thus|in summary|overall|as a result)\b").expect("valid regex")
});

/// Scans `text` (normally one leaf section) for key-info sentences and
/// emits them as standalone `key_info` chunks. Offsets in the returned
/// chunks are relative to `section_offset`.
#[must_use]
pub fn extract_key_info(doc_id: &str, text: &str, section_offset: usize, start_index: usize) -> Vec<Chunk> {
    let mut chunks = Vec::new();
    let mut index = start_index;

    for sentence in split_sentences(text) {
        let trimmed = sentence.text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let is_key = DEFINITION_RE.is_match(trimmed)
            || CONCLUSION_RE.is_match(trimmed)
            || (NUMERIC_RE.is_match(trimmed) && trimmed.len() > 20);
        if !is_key {
            continue;
        }

        chunks.push(
            ChunkBuilder::new()
                .doc_id(doc_id)
                .text(trimmed)
                .range((section_offset + sentence.start)..(section_offset + sentence.end))
                .index(index)
                .chunk_type(ChunkType::KeyInfo)
                .strategy("key_info")
                .quality_score(0.8)
                .build(),
        );
        index += 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_nothing() {
        assert!(extract_key_info("d1", "", 0, 0).is_empty());
    }

    #[test]
    fn detects_definition_sentence() {
        let text = "A widget is defined as a small reusable component. Nothing else here.";
        let chunks = extract_key_info("d1", text, 0, 0);
        assert!(chunks.iter().any(|c| c.text.contains("is defined as")));
        assert!(chunks.iter().all(|c| c.chunk_type == ChunkType::KeyInfo));
    }

    #[test]
    fn detects_conclusion_sentence() {
        let text = "Some setup sentence here today. In conclusion, the approach works well in practice.";
        let chunks = extract_key_info("d1", text, 0, 0);
        assert!(chunks.iter().any(|c| c.text.starts_with("In conclusion")));
    }

    #[test]
    fn detects_long_numeric_sentence() {
        let text = "Revenue grew by 42 percent year over year according to the report.";
        let chunks = extract_key_info("d1", text, 0, 0);
        assert!(!chunks.is_empty());
    }

    #[test]
    fn plain_prose_yields_nothing() {
        let text = "The cat sat on the mat and looked around the room.";
        let chunks = extract_key_info("d1", text, 0, 0);
        assert!(chunks.is_empty());
    }

    #[test]
    fn offsets_are_relative_to_section() {
        let text = "A gadget is defined as a tiny device.";
        let chunks = extract_key_info("d1", text, 100, 0);
        assert_eq!(chunks[0].range.start, 100);
    }
}
