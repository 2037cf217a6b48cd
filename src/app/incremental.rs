//! The grammar-source matcher, fed by editor changes.

use crate::model::document::{DocumentChange, ResolvedEdit, TextDocument};
use crate::primitives::edit::EditError;
use crate::primitives::grammar::{grammar_of_grammars, MatchError, MatchResult, Matcher};

/// Incremental matcher over the grammar-of-grammars. Edits must be applied
/// before the document they describe is changed.
pub struct IncrementalMatcher {
    matcher: Matcher<'static>,
}

impl IncrementalMatcher {
    pub fn new() -> Self {
        Self {
            matcher: Matcher::new(grammar_of_grammars()),
        }
    }

    pub fn input(&self) -> &str {
        self.matcher.input()
    }

    pub fn set_input(&mut self, text: &str) {
        self.matcher.set_input(text);
    }

    pub fn replace_input_range(&mut self, from: usize, to: usize, text: &str) -> Result<(), EditError> {
        self.matcher.replace_input_range(from, to, text)
    }

    /// Forward an editor change, resolved against `doc` as it is before the
    /// change.
    pub fn apply_change(
        &mut self,
        doc: &TextDocument,
        change: &DocumentChange,
    ) -> Result<ResolvedEdit, EditError> {
        let edit = doc.resolve(change)?;
        if edit.from == 0 && edit.to == doc.len() {
            self.matcher.set_input(&edit.text);
        } else {
            self.matcher.replace_input_range(edit.from, edit.to, &edit.text)?;
        }
        Ok(edit)
    }

    /// Match the current grammar source.
    pub fn match_source(&mut self) -> Result<MatchResult, MatchError> {
        self.matcher.match_rule(None)
    }

    pub fn memo_size(&self) -> usize {
        self.matcher.memo_size()
    }
}

impl Default for IncrementalMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::document::Position;

    #[test]
    fn test_apply_change_tracks_the_document() {
        let mut doc = TextDocument::new("G {\n  start = \"a\"\n}");
        let mut matcher = IncrementalMatcher::new();
        matcher.set_input(doc.text());
        assert!(matcher.match_source().unwrap().succeeded());

        let change = DocumentChange::new(Position::new(1, 10), Position::new(1, 13), "\"b\" rest");
        matcher.apply_change(&doc, &change).unwrap();
        doc.apply(&change).unwrap();
        assert_eq!(matcher.input(), doc.text());
        assert!(matcher.match_source().unwrap().succeeded());

        let broken = DocumentChange::new(Position::new(2, 0), Position::new(2, 1), "");
        matcher.apply_change(&doc, &broken).unwrap();
        doc.apply(&broken).unwrap();
        let result = matcher.match_source().unwrap();
        assert!(result.failed());
        assert_eq!(result, grammar_of_grammars().match_input(doc.text(), None).unwrap());
    }

    #[test]
    fn test_whole_document_change_resets() {
        let doc = TextDocument::new("G { a = \"x\" }");
        let mut matcher = IncrementalMatcher::new();
        matcher.set_input(doc.text());
        matcher.match_source().unwrap();

        let all = DocumentChange::new(Position::new(0, 0), Position::new(0, 99), "H { }");
        matcher.apply_change(&doc, &all).unwrap();
        assert_eq!(matcher.input(), "H { }");
        assert_eq!(matcher.memo_size(), 0);
    }
}
