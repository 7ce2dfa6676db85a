//! Text Utilities (§4.A): sentence segmentation, structural detection,
//! token-count estimation, and language classification.
//!
//! Pure and deterministic given the same input — no network calls, no
//! randomness, no mutable global state.

pub mod lang;
pub mod sentence;
pub mod structure;
pub mod tokens;

pub use lang::{Language, detect_language};
pub use sentence::split_sentences;
pub use structure::{SectionKind, SectionNode, detect_structure};
pub use tokens::{ModelFamily, estimate_tokens};
