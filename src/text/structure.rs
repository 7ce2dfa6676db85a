//! Structural pre-pass: detects Markdown-like structural cues (headings,
//! list items, fenced code blocks, tables) and builds a section tree.
//!
//! New code, written in the teacher's idiom (a small line-oriented
//! scanner, similar in spirit to the teacher's boundary-search helpers
//! in `chunking::semantic`) since the teacher has no structural
//! detection of its own.

/// The structural role of a section, mirroring the `chunk_type`
/// vocabulary of the Chunk entity (§3) minus `key_info`, which is
/// assigned later by key-info extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionKind {
    /// A heading line (`#`, `##`, ... or a title-cased short line).
    Heading,
    /// A contiguous run of list items.
    List,
    /// A fenced code block (triple backtick or four-space indented).
    Code,
    /// A Markdown-style table (pipe-delimited rows).
    Table,
    /// Ordinary prose.
    Body,
}

/// One leaf section of the structural pre-pass, a half-open byte range
/// into the original document text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionNode {
    /// Structural role of this section.
    pub kind: SectionKind,
    /// Start byte offset (inclusive).
    pub start: usize,
    /// End byte offset (exclusive).
    pub end: usize,
    /// Heading depth (1 for `#`, 2 for `##`, ...), zero for non-headings.
    pub depth: u8,
}

/// Splits `text` into an ordered, non-overlapping, covering list of
/// [`SectionNode`]s using line-oriented structural cues.
#[must_use]
pub fn detect_structure(text: &str) -> Vec<SectionNode> {
    if text.is_empty() {
        return Vec::new();
    }

    let mut sections = Vec::new();
    let mut offset = 0usize;
    let mut in_code_fence = false;
    let mut current_kind = SectionKind::Body;
    let mut current_start = 0usize;

    let mut push_section = |kind: SectionKind, start: usize, end: usize, sections: &mut Vec<SectionNode>| {
        if end > start {
            let depth = if kind == SectionKind::Heading {
                heading_depth(&text[start..end])
            } else {
                0
            };
            sections.push(SectionNode {
                kind,
                start,
                end,
                depth,
            });
        }
    };

    for line in text.split_inclusive('\n') {
        let line_start = offset;
        let line_end = offset + line.len();
        let trimmed = line.trim_end_matches('\n').trim();

        let line_kind = if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            in_code_fence = !in_code_fence;
            SectionKind::Code
        } else if in_code_fence {
            SectionKind::Code
        } else if heading_depth(trimmed) > 0 {
            SectionKind::Heading
        } else if is_list_item(trimmed) {
            SectionKind::List
        } else if is_table_row(trimmed) {
            SectionKind::Table
        } else {
            SectionKind::Body
        };

        if line_kind != current_kind {
            push_section(current_kind, current_start, line_start, &mut sections);
            current_kind = line_kind;
            current_start = line_start;
        }

        // Headings are always their own single-line section.
        if line_kind == SectionKind::Heading {
            push_section(SectionKind::Heading, current_start, line_end, &mut sections);
            current_kind = SectionKind::Body;
            current_start = line_end;
        }

        offset = line_end;
    }

    push_section(current_kind, current_start, text.len(), &mut sections);
    sections
}

fn heading_depth(trimmed: &str) -> u8 {
    if !trimmed.starts_with('#') {
        return 0;
    }
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return 0;
    }
    match trimmed.as_bytes().get(hashes) {
        Some(b' ') | None => u8::try_from(hashes).unwrap_or(6),
        _ => 0,
    }
}

fn is_list_item(trimmed: &str) -> bool {
    let bullet = trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || trimmed.starts_with("+ ");
    if bullet {
        return true;
    }
    // Ordered list: digits followed by '.' or ')' then a space.
    let mut chars = trimmed.char_indices();
    let mut digit_end = 0;
    for (idx, ch) in chars.by_ref() {
        if ch.is_ascii_digit() {
            digit_end = idx + 1;
        } else {
            break;
        }
    }
    if digit_end == 0 {
        return false;
    }
    matches!(trimmed.as_bytes().get(digit_end), Some(b'.') | Some(b')'))
        && trimmed.as_bytes().get(digit_end + 1) == Some(&b' ')
}

fn is_table_row(trimmed: &str) -> bool {
    trimmed.starts_with('|') && trimmed.ends_with('|') && trimmed.len() > 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_heading_levels() {
        let text = "# Title\n\nBody text here.\n";
        let sections = detect_structure(text);
        let heading = sections
            .iter()
            .find(|s| s.kind == SectionKind::Heading)
            .expect("heading section");
        assert_eq!(heading.depth, 1);
    }

    #[test]
    fn detects_nested_heading() {
        assert_eq!(heading_depth("## Sub"), 2);
        assert_eq!(heading_depth("###### Deep"), 6);
        assert_eq!(heading_depth("####### TooDeep"), 0);
        assert_eq!(heading_depth("#NoSpace"), 0);
    }

    #[test]
    fn detects_bullet_and_ordered_lists() {
        assert!(is_list_item("- item"));
        assert!(is_list_item("* item"));
        assert!(is_list_item("1. item"));
        assert!(is_list_item("42) item"));
        assert!(!is_list_item("not a list"));
    }

    #[test]
    fn detects_code_fence_span() {
        let text = "intro\n```\ncode line 1\ncode line 2\n```\noutro\n";
        let sections = detect_structure(text);
        assert!(sections.iter().any(|s| s.kind == SectionKind::Code));
        let code_chars: usize = sections
            .iter()
            .filter(|s| s.kind == SectionKind::Code)
            .map(|s| s.end - s.start)
            .sum();
        assert!(code_chars > 0);
    }

    #[test]
    fn detects_table_rows() {
        let text = "| a | b |\n| - | - |\n| 1 | 2 |\n";
        let sections = detect_structure(text);
        assert!(sections.iter().any(|s| s.kind == SectionKind::Table));
    }

    #[test]
    fn sections_cover_entire_text_without_overlap() {
        let text = "# H\nbody line one\nbody line two\n- list item\n";
        let sections = detect_structure(text);
        let mut expected_start = 0;
        for section in &sections {
            assert_eq!(section.start, expected_start);
            assert!(section.end > section.start);
            expected_start = section.end;
        }
        assert_eq!(expected_start, text.len());
    }

    #[test]
    fn empty_text_yields_no_sections() {
        assert!(detect_structure("").is_empty());
    }
}
