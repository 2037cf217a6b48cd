//! Editable text documents and editor change descriptions.

use serde::{Deserialize, Serialize};

use crate::primitives::edit::{validate_range, EditError};

/// Line/character position. Lines are 0-indexed; `ch` counts characters
/// within the line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub ch: usize,
}

impl Position {
    pub fn new(line: usize, ch: usize) -> Self {
        Self { line, ch }
    }
}

/// An editor change: replace `from..to` with `text`, given as lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentChange {
    pub from: Position,
    pub to: Position,
    pub text: Vec<String>,
}

impl DocumentChange {
    pub fn new(from: Position, to: Position, text: &str) -> Self {
        Self {
            from,
            to,
            text: text.split('\n').map(str::to_string).collect(),
        }
    }

    pub fn insert(at: Position, text: &str) -> Self {
        Self::new(at, at, text)
    }

    pub fn inserted_text(&self) -> String {
        self.text.join("\n")
    }
}

/// A change resolved to byte offsets in the document it applies to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedEdit {
    pub from: usize,
    pub to: usize,
    pub text: String,
}

/// Text plus a version that increases on every modification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextDocument {
    text: String,
    version: u64,
}

impl TextDocument {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            version: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.text.len()
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn line_count(&self) -> usize {
        self.text.split('\n').count()
    }

    /// Byte offset of `pos`. Positions past the end of a line clamp to the
    /// line end; lines past the end clamp to the end of the document.
    pub fn offset_of(&self, pos: Position) -> usize {
        let mut line_start = 0;
        for (i, line) in self.text.split('\n').enumerate() {
            if i == pos.line {
                let within = line
                    .char_indices()
                    .nth(pos.ch)
                    .map(|(b, _)| b)
                    .unwrap_or(line.len());
                return line_start + within;
            }
            line_start += line.len() + 1;
        }
        self.text.len()
    }

    pub fn position_of(&self, offset: usize) -> Position {
        let offset = offset.min(self.text.len());
        let before = &self.text[..floor_char_boundary(&self.text, offset)];
        let line = before.matches('\n').count();
        let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
        Position::new(line, before[line_start..].chars().count())
    }

    /// Resolve a change against the current contents without applying it.
    pub fn resolve(&self, change: &DocumentChange) -> Result<ResolvedEdit, EditError> {
        let from = self.offset_of(change.from);
        let to = self.offset_of(change.to);
        let range = validate_range(&self.text, from, to)?;
        Ok(ResolvedEdit {
            from: range.start,
            to: range.end,
            text: change.inserted_text(),
        })
    }

    pub fn apply(&mut self, change: &DocumentChange) -> Result<ResolvedEdit, EditError> {
        let edit = self.resolve(change)?;
        self.replace_range(edit.from, edit.to, &edit.text)?;
        Ok(edit)
    }

    pub fn replace_range(&mut self, from: usize, to: usize, text: &str) -> Result<(), EditError> {
        let range = validate_range(&self.text, from, to)?;
        self.text.replace_range(range, text);
        self.version += 1;
        Ok(())
    }

    /// Replace the whole contents. Returns false (and keeps the version) if
    /// the text is unchanged.
    pub fn set_text(&mut self, text: &str) -> bool {
        if self.text == text {
            return false;
        }
        self.text = text.to_string();
        self.version += 1;
        true
    }
}

fn floor_char_boundary(s: &str, mut i: usize) -> usize {
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// The smallest single replacement turning `old` into `new`, or `None` if
/// they are equal.
pub fn minimal_edit(old: &str, new: &str) -> Option<ResolvedEdit> {
    if old == new {
        return None;
    }
    let prefix = old
        .char_indices()
        .zip(new.chars())
        .find(|((_, a), b)| a != b)
        .map(|((i, _), _)| i)
        .unwrap_or_else(|| old.len().min(new.len()));
    let prefix = floor_char_boundary(new, floor_char_boundary(old, prefix));

    let max_suffix = (old.len() - prefix).min(new.len() - prefix);
    let suffix = old[prefix..]
        .chars()
        .rev()
        .zip(new[prefix..].chars().rev())
        .take_while(|(a, b)| a == b)
        .map(|(a, _)| a.len_utf8())
        .scan(0, |total, len| {
            *total += len;
            Some(*total)
        })
        .take_while(|total| *total <= max_suffix)
        .last()
        .unwrap_or(0);

    Some(ResolvedEdit {
        from: prefix,
        to: old.len() - suffix,
        text: new[prefix..new.len() - suffix].to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offsets_clamp_like_an_editor() {
        let doc = TextDocument::new("ab\nc\u{e9}d\n");
        assert_eq!(doc.offset_of(Position::new(0, 1)), 1);
        assert_eq!(doc.offset_of(Position::new(1, 2)), 6);
        assert_eq!(doc.offset_of(Position::new(0, 99)), 2);
        assert_eq!(doc.offset_of(Position::new(9, 0)), doc.len());
        assert_eq!(doc.position_of(6), Position::new(1, 2));
        assert_eq!(doc.line_count(), 3);
    }

    #[test]
    fn test_apply_change_bumps_version() {
        let mut doc = TextDocument::new("G { start = \"a\" }");
        let change = DocumentChange::new(Position::new(0, 13), Position::new(0, 14), "b");
        let edit = doc.apply(&change).unwrap();
        assert_eq!((edit.from, edit.to), (13, 14));
        assert_eq!(doc.text(), "G { start = \"b\" }");
        assert_eq!(doc.version(), 1);

        let multi = DocumentChange::insert(Position::new(0, 0), "// x\n");
        assert_eq!(multi.text, vec!["// x", ""]);
        doc.apply(&multi).unwrap();
        assert!(doc.text().starts_with("// x\nG"));
        assert!(!doc.set_text(doc.text().to_string().as_str()));
        assert_eq!(doc.version(), 2);
    }

    #[test]
    fn test_inverted_change_is_rejected() {
        let mut doc = TextDocument::new("abc");
        let change = DocumentChange::new(Position::new(0, 2), Position::new(0, 1), "");
        assert!(doc.apply(&change).is_err());
        assert_eq!(doc.version(), 0);
    }

    #[test]
    fn test_minimal_edit() {
        assert_eq!(minimal_edit("abc", "abc"), None);
        let edit = minimal_edit("hello world", "hello there world").unwrap();
        assert_eq!((edit.from, edit.to, edit.text.as_str()), (6, 6, "there "));
        let edit = minimal_edit("aaa", "aa").unwrap();
        assert_eq!((edit.from, edit.to, edit.text.as_str()), (2, 3, ""));
        let edit = minimal_edit("x\u{e9}y", "x\u{e8}y").unwrap();
        assert_eq!((edit.from, edit.to), (1, 3));
    }
}
