//! Structural pre-pass (§4.B step 1): reduces a document to leaf
//! sections (the text between consecutive top-level structural
//! boundaries) that the primary segmentation step packs independently,
//! so a chunk never straddles a heading/list/code/table boundary.

use crate::text::{detect_structure, SectionKind};

/// One leaf section: a contiguous span that primary segmentation
/// should treat as a single unit (it will still be split internally
/// by sentence packing if it exceeds `target_chunk_size`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafSection {
    /// Byte range into the source document.
    pub range: std::ops::Range<usize>,
    /// The dominant structural kind of this span.
    pub kind: SectionKind,
}

/// Splits `text` into leaf sections using the structural detector.
/// Consecutive `Body` lines are merged into a single leaf; headings,
/// lists, code, and tables each become their own leaf so they can be
/// promoted to a dedicated `chunk_type` later.
#[must_use]
pub fn leaf_sections(text: &str) -> Vec<LeafSection> {
    let nodes = detect_structure(text);
    if nodes.is_empty() {
        return Vec::new();
    }

    let mut leaves: Vec<LeafSection> = Vec::new();
    for node in nodes {
        if node.kind == SectionKind::Body {
            if let Some(last) = leaves.last_mut() {
                if last.kind == SectionKind::Body && last.range.end == node.start {
                    last.range.end = node.end;
                    continue;
                }
            }
        }
        leaves.push(LeafSection {
            range: node.start..node.end,
            kind: node.kind,
        });
    }
    leaves
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_text_yields_no_leaves() {
        assert!(leaf_sections("").is_empty());
    }

    #[test]
    fn adjacent_body_lines_merge_into_one_leaf() {
        let text = "line one\nline two\nline three\n";
        let leaves = leaf_sections(text);
        assert_eq!(leaves.len(), 1);
        assert_eq!(leaves[0].kind, SectionKind::Body);
        assert_eq!(leaves[0].range, 0..text.len());
    }

    #[test]
    fn heading_interrupts_body_merge() {
        let text = "intro line\n# Heading\nmore body\n";
        let leaves = leaf_sections(text);
        assert!(leaves.iter().any(|l| l.kind == SectionKind::Heading));
        assert!(leaves.len() >= 2);
    }

    #[test]
    fn leaves_cover_entire_text_contiguously() {
        let text = "para one\n\n# Heading\n\n- item one\n- item two\n\ncode below:\n```\nfn x() {}\n```\n";
        let leaves = leaf_sections(text);
        let mut cursor = 0;
        for leaf in &leaves {
            assert_eq!(leaf.range.start, cursor);
            cursor = leaf.range.end;
        }
        assert_eq!(cursor, text.len());
    }
}
