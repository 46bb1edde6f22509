//! Mirrors of the editor's open documents, kept current from didOpen /
//! didChange / didClose traffic so completion requests can be annotated with
//! the text before the cursor.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Zero-based position counted in UTF-16 code units, as on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

/// One entry of a didChange `contentChanges` array. A change without a range
/// replaces the whole document. The deprecated `rangeLength` field some
/// editors still send is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentChange {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
}

/// Full text of every open document, keyed by uri.
#[derive(Debug, Default)]
pub struct DocumentStore {
    docs: HashMap<String, String>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&mut self, uri: impl Into<String>, text: impl Into<String>) {
        self.docs.insert(uri.into(), text.into());
    }

    pub fn close(&mut self, uri: &str) {
        self.docs.remove(uri);
    }

    pub fn text(&self, uri: &str) -> Option<&str> {
        self.docs.get(uri).map(String::as_str)
    }

    /// Applies one content change. Changes must be applied in the order the
    /// editor sent them; the caller owns that ordering.
    pub fn apply(&mut self, uri: &str, change: &ContentChange) -> Result<()> {
        let text = self
            .docs
            .get_mut(uri)
            .ok_or_else(|| Error::Protocol(format!("change for unknown document {uri}")))?;
        let Some(range) = change.range else {
            *text = change.text.clone();
            return Ok(());
        };
        let start = byte_offset(text, range.start)?;
        let end = byte_offset(text, range.end)?;
        if start > end {
            return Err(Error::Protocol(format!(
                "inverted change range in {uri}: {range:?}"
            )));
        }
        text.replace_range(start..end, &change.text);
        Ok(())
    }

    /// Text on the position's line strictly before the position. Empty at
    /// column zero; `None` when the document is unknown or the line does not
    /// exist.
    pub fn pretext(&self, uri: &str, pos: Position) -> Option<String> {
        let text = self.docs.get(uri)?;
        let line_start = byte_offset(
            text,
            Position {
                line: pos.line,
                character: 0,
            },
        )
        .ok()?;
        let at = byte_offset(text, pos).ok()?;
        Some(text[line_start..at].to_string())
    }
}

/// Resolves a wire position to a byte offset. Walks line boundaries first
/// (a missing line is an error), then UTF-16 code units within the line,
/// clamping `character` at the end of the line.
fn byte_offset(text: &str, pos: Position) -> Result<usize> {
    let mut idx = 0usize;
    for _ in 0..pos.line {
        match text[idx..].find('\n') {
            Some(nl) => idx += nl + 1,
            None => {
                return Err(Error::Protocol(format!(
                    "position line {} is out of range",
                    pos.line
                )))
            }
        }
    }
    let mut units = 0u32;
    for (off, ch) in text[idx..].char_indices() {
        if units >= pos.character || ch == '\n' {
            return Ok(idx + off);
        }
        units += ch.len_utf16() as u32;
    }
    Ok(text.len())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn pos(line: u32, character: u32) -> Position {
        Position { line, character }
    }

    fn ranged(start: Position, end: Position, text: &str) -> ContentChange {
        ContentChange {
            text: text.to_string(),
            range: Some(Range { start, end }),
        }
    }

    #[test]
    fn test_ranged_change_replaces_span() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "abc\ndef");
        docs.apply("file:///a", &ranged(pos(1, 0), pos(1, 3), "xyz"))
            .expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("abc\nxyz"));
    }

    #[test]
    fn test_pretext_mid_line() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "abc\ndef");
        assert_eq!(docs.pretext("file:///a", pos(1, 2)), Some("de".to_string()));
    }

    #[test]
    fn test_pretext_at_column_zero_is_empty() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "abc\ndef");
        assert_eq!(docs.pretext("file:///a", pos(1, 0)), Some(String::new()));
    }

    #[test]
    fn test_full_replacement_without_range() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "old");
        docs.apply(
            "file:///a",
            &ContentChange {
                text: "entirely new".to_string(),
                range: None,
            },
        )
        .expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("entirely new"));
    }

    #[test]
    fn test_changes_compose_in_order() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "\n");
        docs.apply("file:///a", &ranged(pos(0, 0), pos(1, 0), "this is a test\n"))
            .expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("this is a test\n"));
        docs.apply(
            "file:///a",
            &ranged(pos(0, 7), pos(1, 0), "\nyet another\ntest!\n"),
        )
        .expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("this is\nyet another\ntest!\n"));
        docs.apply("file:///a", &ranged(pos(1, 0), pos(1, 0), "ano\n"))
            .expect("apply failed");
        assert_eq!(
            docs.text("file:///a"),
            Some("this is\nano\nyet another\ntest!\n")
        );
    }

    #[test]
    fn test_positions_count_utf16_units() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "a😀b\n");
        assert_eq!(
            docs.pretext("file:///a", pos(0, 3)),
            Some("a😀".to_string())
        );
        docs.apply("file:///a", &ranged(pos(0, 1), pos(0, 3), ""))
            .expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("ab\n"));
    }

    #[test]
    fn test_character_clamped_to_line_end() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "ab\ncd");
        docs.apply("file:///a", &ranged(pos(0, 9), pos(0, 9), "!"))
            .expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("ab!\ncd"));
    }

    #[test]
    fn test_missing_line_is_an_error() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "one line");
        let result = docs.apply("file:///a", &ranged(pos(5, 0), pos(5, 0), "x"));
        assert!(result.is_err());
    }

    #[test]
    fn test_unknown_document() {
        let mut docs = DocumentStore::new();
        assert!(docs.apply("file:///nope", &ranged(pos(0, 0), pos(0, 0), "x")).is_err());
        assert_eq!(docs.pretext("file:///nope", pos(0, 0)), None);
    }

    #[test]
    fn test_close_forgets_the_document() {
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "text");
        docs.close("file:///a");
        assert_eq!(docs.text("file:///a"), None);
        assert_eq!(docs.pretext("file:///a", pos(0, 0)), None);
    }

    #[test]
    fn test_range_length_field_is_tolerated() {
        let change: ContentChange = serde_json::from_value(json!({
            "text": "x",
            "range": {
                "start": {"line": 0, "character": 0},
                "end": {"line": 0, "character": 1}
            },
            "rangeLength": 1
        }))
        .expect("deserialize failed");
        let mut docs = DocumentStore::new();
        docs.open("file:///a", "abc");
        docs.apply("file:///a", &change).expect("apply failed");
        assert_eq!(docs.text("file:///a"), Some("xbc"));
    }
}
