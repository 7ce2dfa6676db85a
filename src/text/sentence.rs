//! Sentence boundary detection.
//!
//! Built on `unicode-segmentation`'s UAX#29 sentence-boundary iterator,
//! the same primitive the teacher's semantic chunker kept as an unused
//! helper (`sentence_boundaries`) — here it is the load-bearing
//! segmentation pass for the Hybrid Chunker's primary strategy.

use unicode_segmentation::UnicodeSegmentation;

/// Common abbreviations that the UAX#29 sentence splitter otherwise
/// treats as sentence-final. When a candidate sentence ends in one of
/// these (case-insensitive, trailing period), it is merged with the
/// next candidate instead of being treated as a boundary.
const ABBREVIATIONS: &[&str] = &[
    "mr.", "mrs.", "ms.", "dr.", "prof.", "sr.", "jr.", "vs.", "etc.", "e.g.", "i.e.", "fig.",
    "eq.", "approx.", "no.", "vol.",
];

/// A sentence span within the source text, given as a half-open byte
/// range plus the borrowed text itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentence<'a> {
    /// The sentence text (leading/trailing whitespace trimmed).
    pub text: &'a str,
    /// Byte offset of `text.as_ptr()` within the original string, i.e.
    /// the start of the trimmed span.
    pub start: usize,
    /// Byte offset one past the end of the trimmed span.
    pub end: usize,
}

/// Splits `text` into sentences, respecting quoted spans and merging
/// spurious breaks after common abbreviations.
///
/// Works for mixed CJK/Latin text because `unicode-segmentation`'s
/// sentence-boundary algorithm is Unicode-aware rather than ASCII
/// punctuation matching; CJK full-width terminators (`。`, `！`, `？`)
/// are recognized by the same UAX#29 iterator as Latin `.`/`!`/`?`.
#[must_use]
pub fn split_sentences(text: &str) -> Vec<Sentence<'_>> {
    let raw: Vec<(usize, usize)> = text
        .split_sentence_bound_indices()
        .map(|(offset, piece)| (offset, offset + piece.len()))
        .collect();
    let merged = merge_abbreviation_breaks(raw, text);

    merged
        .into_iter()
        .filter_map(|(start, end)| {
            let piece = &text[start..end];
            let trimmed = piece.trim();
            if trimmed.is_empty() {
                return None;
            }
            let trimmed_start = start + (piece.len() - piece.trim_start().len());
            let trimmed_end = trimmed_start + trimmed.len();
            Some(Sentence {
                text: trimmed,
                start: trimmed_start,
                end: trimmed_end,
            })
        })
        .collect()
}

/// Merges a sentence-bound split with the following one whenever the
/// split piece ends with a known abbreviation, since UAX#29 has no
/// notion of "abbreviation" and will otherwise treat `"Dr."` as final.
fn merge_abbreviation_breaks(raw: Vec<(usize, usize)>, text: &str) -> Vec<(usize, usize)> {
    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(raw.len());
    for (start, end) in raw {
        let should_merge = merged.last().is_some_and(|&(prev_start, prev_end)| {
            let prev = text[prev_start..prev_end].trim_end();
            let lower_tail = prev
                .rsplit(char::is_whitespace)
                .next()
                .unwrap_or(prev)
                .to_lowercase();
            ABBREVIATIONS.contains(&lower_tail.as_str())
        });

        if should_merge {
            if let Some(last) = merged.last_mut() {
                last.1 = end;
            }
        } else {
            merged.push((start, end));
        }
    }
    merged
}
