//! Token-count estimation.
//!
//! Keeps the teacher's `len / 4` (`div_ceil`) heuristic
//! (see `core::chunk::Chunk::estimate_tokens`) as the default "generic"
//! model family, and adds a small table of per-family divisors so
//! callers can pick a closer estimate for code-heavy or CJK-heavy
//! content without pulling in a real tokenizer dependency.

/// Coarse model family used to pick a characters-per-token divisor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ModelFamily {
    /// General-purpose English/Latin prose (~4 chars/token). Matches
    /// the teacher's `Chunk::estimate_tokens` heuristic exactly.
    #[default]
    Generic,
    /// Source code tends to tokenize denser (~3 chars/token: short
    /// identifiers, punctuation-heavy).
    Code,
    /// CJK text tokenizes far denser per character (~1.5 chars/token
    /// for most BPE tokenizers, since each character often costs its
    /// own token or more).
    Cjk,
}

impl ModelFamily {
    const fn chars_per_token(self) -> usize {
        match self {
            Self::Generic => 4,
            Self::Code => 3,
            Self::Cjk => 2,
        }
    }
}

/// Estimates the number of tokens `text` would consume for `family`,
/// using `div_ceil` so the estimate never rounds down to zero for
/// non-empty input (matching the teacher's `estimate_tokens`).
#[must_use]
pub fn estimate_tokens(text: &str, family: ModelFamily) -> usize {
    text.chars().count().div_ceil(family.chars_per_token())
}
