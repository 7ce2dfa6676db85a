//! A simple, deterministic language classifier.
//!
//! Distinguishes script family by Unicode block counting, then votes
//! among a short stopword list for Latin-script text. No network
//! access, no bundled model — matches the spec's requirement that Text
//! Utilities be "pure and deterministic given the same input."

/// Detected language or script family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Language {
    /// English prose (Latin script, English stopword majority).
    English,
    /// Another Latin-script language (stopword vote did not match
    /// English, or was inconclusive).
    OtherLatin,
    /// CJK (Chinese/Japanese/Korean) script dominant.
    Cjk,
    /// Cyrillic script dominant.
    Cyrillic,
    /// Not enough signal to classify (empty or punctuation-only text).
    Unknown,
}

const ENGLISH_STOPWORDS: &[&str] = &[
    "the", "and", "is", "are", "of", "to", "in", "a", "that", "it", "for", "was", "with", "on",
    "as", "this", "be", "by", "an",
];

/// Classifies the dominant language/script of `text`.
#[must_use]
pub fn detect_language(text: &str) -> Language {
    let mut cjk = 0usize;
    let mut cyrillic = 0usize;
    let mut latin = 0usize;
    let mut letters = 0usize;

    for ch in text.chars() {
        if !ch.is_alphabetic() {
            continue;
        }
        letters += 1;
        if is_cjk(ch) {
            cjk += 1;
        } else if is_cyrillic(ch) {
            cyrillic += 1;
        } else if ch.is_ascii_alphabetic() || ch.is_alphabetic() {
            latin += 1;
        }
    }

    if letters == 0 {
        return Language::Unknown;
    }

    if cjk * 2 > letters {
        return Language::Cjk;
    }
    if cyrillic * 2 > letters {
        return Language::Cyrillic;
    }
    if latin * 2 > letters {
        return english_or_other_latin(text);
    }
    Language::Unknown
}

fn english_or_other_latin(text: &str) -> Language {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
        .collect();

    if words.is_empty() {
        return Language::OtherLatin;
    }

    let hits = words
        .iter()
        .filter(|w| ENGLISH_STOPWORDS.contains(&w.as_str()))
        .count();

    // Require at least 8% stopword density to call it English; prose
    // in other Latin-script languages rarely shares this vocabulary.
    if hits * 100 >= words.len() * 8 {
        Language::English
    } else {
        Language::OtherLatin
    }
}

fn is_cjk(ch: char) -> bool {
    matches!(ch as u32,
        0x4E00..=0x9FFF   // CJK Unified Ideographs
        | 0x3400..=0x4DBF // CJK Extension A
        | 0x3040..=0x30FF // Hiragana + Katakana
        | 0xAC00..=0xD7A3 // Hangul syllables
    )
}

fn is_cyrillic(ch: char) -> bool {
    matches!(ch as u32, 0x0400..=0x04FF)
}
