//! Utility functions for source rewriting.
//!
//! - JS string escaping (injection-safe)
//! - Span-based text edits
//! - Import specifier removal ranges

use std::ops::Range;

// ---------------------------------------------------------------------------
// JS String Escaping
// ---------------------------------------------------------------------------

/// Escape a string for safe embedding inside a JS double-quoted string literal.
pub fn escape_js_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 16);
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            c => out.push(c),
        }
    }
    out
}

/// `s` as a double-quoted JS string literal.
pub fn js_string_literal(s: &str) -> String {
    format!("\"{}\"", escape_js_string(s))
}

// ---------------------------------------------------------------------------
// Edits
// ---------------------------------------------------------------------------

/// Replace a byte range of the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edit {
    pub range: Range<usize>,
    pub replacement: String,
}

impl Edit {
    pub fn replace(range: Range<usize>, replacement: impl Into<String>) -> Self {
        Self {
            range,
            replacement: replacement.into(),
        }
    }

    pub fn delete(range: Range<usize>) -> Self {
        Self::replace(range, "")
    }
}

/// Apply non-overlapping edits. Overlapping edits after the first are dropped.
pub fn apply_edits(source: &str, mut edits: Vec<Edit>) -> String {
    edits.sort_by_key(|edit| (edit.range.start, edit.range.end));

    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;
    for edit in edits {
        if edit.range.start < cursor || edit.range.end > source.len() {
            continue;
        }
        out.push_str(&source[cursor..edit.range.start]);
        out.push_str(&edit.replacement);
        cursor = edit.range.end;
    }
    out.push_str(&source[cursor..]);
    out
}

// ---------------------------------------------------------------------------
// Import Cleanup
// ---------------------------------------------------------------------------

/// Extend an import declaration span over its trailing line break.
pub fn declaration_removal_range(source: &str, declaration: Range<usize>) -> Range<usize> {
    let rest = &source[declaration.end..];
    let trailing = rest.len() - rest.trim_start_matches([' ', '\t']).len();
    let mut end = declaration.end + trailing;
    if source[end..].starts_with("\r\n") {
        end += 2;
    } else if source[end..].starts_with('\n') {
        end += 1;
    }
    declaration.start..end
}

/// Extend a named specifier span over the comma that separates it from its
/// neighbour: the following one when present, otherwise the preceding one.
pub fn specifier_removal_range(source: &str, specifier: Range<usize>) -> Range<usize> {
    let after = &source[specifier.end..];
    let gap = after.len() - after.trim_start().len();
    if after[gap..].starts_with(',') {
        let past_comma = &after[gap + 1..];
        let space = past_comma.len() - past_comma.trim_start().len();
        return specifier.start..specifier.end + gap + 1 + space;
    }

    let before = &source[..specifier.start];
    let trimmed = before.trim_end();
    if trimmed.ends_with(',') {
        return trimmed.len() - 1..specifier.end;
    }
    specifier
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_escape_js_string() {
        assert_eq!(escape_js_string(r#"he said "hi""#), r#"he said \"hi\""#);
        assert_eq!(escape_js_string("line1\nline2"), "line1\\nline2");
        assert_eq!(js_string_literal("flow-1a2b3c4d"), "\"flow-1a2b3c4d\"");
    }

    #[test]
    fn test_apply_edits_out_of_order() {
        let source = "aaa bbb ccc";
        let edits = vec![Edit::replace(8..11, "C"), Edit::replace(0..3, "A")];
        assert_eq!(apply_edits(source, edits), "A bbb C");
    }

    #[test]
    fn test_apply_edits_skips_overlap() {
        let source = "abcdef";
        let edits = vec![Edit::replace(0..4, "X"), Edit::replace(2..5, "Y")];
        assert_eq!(apply_edits(source, edits), "Xef");
    }

    #[test]
    fn test_declaration_removal_takes_line_break() {
        let source = "import { css } from \"x\";  \nconst a = 1;";
        let range = declaration_removal_range(source, 0..24);
        assert_eq!(&source[range.end..], "const a = 1;");
    }

    #[test]
    fn test_specifier_removal_first() {
        let source = "import { css, cx } from \"x\";";
        let range = specifier_removal_range(source, 9..12);
        assert_eq!(apply_edits(source, vec![Edit::delete(range)]), "import { cx } from \"x\";");
    }

    #[test]
    fn test_specifier_removal_last() {
        let source = "import { cx, css } from \"x\";";
        let range = specifier_removal_range(source, 13..16);
        assert_eq!(apply_edits(source, vec![Edit::delete(range)]), "import { cx } from \"x\";");
    }
}
