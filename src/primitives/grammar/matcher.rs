use std::rc::Rc;

use super::eval::{new_memo_table, MatchState, MemoTable};
use super::match_result::MatchResult;
use super::types::{Grammar, MatchError};
use crate::primitives::edit::{validate_range, EditError};

/// Incremental matching session over one grammar.
///
/// The memo table survives input edits: [`Matcher::replace_input_range`]
/// drops only the entries whose evaluation looked at the edited region, so
/// re-matching after a small edit reuses most of the previous work.
pub struct Matcher<'g> {
    grammar: &'g Grammar,
    input: String,
    memo: MemoTable,
}

impl<'g> Matcher<'g> {
    pub fn new(grammar: &'g Grammar) -> Self {
        Self {
            grammar,
            input: String::new(),
            memo: new_memo_table(0),
        }
    }

    pub fn grammar(&self) -> &'g Grammar {
        self.grammar
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    /// Replace the whole input, discarding all memoized results.
    pub fn set_input(&mut self, text: &str) {
        self.input = text.to_string();
        self.memo = new_memo_table(text.len());
    }

    /// Replace `from..to` with `text`, keeping memo entries the edit cannot
    /// affect.
    pub fn replace_input_range(&mut self, from: usize, to: usize, text: &str) -> Result<(), EditError> {
        let range = validate_range(&self.input, from, to)?;
        self.input.replace_range(range.clone(), text);
        self.memo
            .splice(range, std::iter::repeat_with(|| None).take(text.len()));
        for (pos, slot) in self.memo.iter_mut().enumerate().take(from) {
            if let Some(memo) = slot {
                memo.clear_obsolete_entries(pos, from);
            }
        }
        Ok(())
    }

    pub fn match_rule(&mut self, start_rule: Option<&str>) -> Result<MatchResult, MatchError> {
        let grammar = self.grammar;
        let name = start_rule
            .or(grammar.default_start_rule())
            .ok_or_else(|| MatchError::NoStartRule {
                grammar: grammar.name().to_string(),
            })?;
        let rule = grammar.rule(name).ok_or_else(|| MatchError::UnknownRule {
            grammar: grammar.name().to_string(),
            rule: name.to_string(),
        })?;
        let outcome = MatchState::new(grammar, &self.input, &mut self.memo, false).run(&rule.name);
        if outcome.too_deep() {
            // Entries recorded while unwinding from the cap are not real failures
            self.memo = new_memo_table(self.input.len());
            return Err(grammar.too_deep(&rule.name));
        }
        Ok(outcome.into_result(Rc::from(self.input.as_str()), &rule.name))
    }

    /// Total number of memoized rule results.
    pub fn memo_size(&self) -> usize {
        self.memo.iter().flatten().map(|slot| slot.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::grammar::eval::MAX_APPLICATION_DEPTH;
    use crate::primitives::grammar::pexpr::PExpr;
    use crate::primitives::grammar::types::RuleInfo;

    fn words() -> Grammar {
        // start = word* ; word = "a".."z"+ " "?
        let mut g = Grammar::new("Words", None);
        g.define_rule(RuleInfo::new("start", PExpr::star(PExpr::apply("word")), "Words"));
        g.define_rule(RuleInfo::new(
            "word",
            PExpr::seq(vec![
                PExpr::plus(PExpr::range('a', 'z')),
                PExpr::opt(PExpr::terminal(" ")),
            ]),
            "Words",
        ));
        g.set_default_start_rule("start");
        g
    }

    #[test]
    fn test_edit_keeps_entries_before_the_edit() {
        let g = words();
        let mut m = Matcher::new(&g);
        m.set_input("ab cd ef");
        assert!(m.match_rule(None).unwrap().succeeded());
        let before = m.memo_size();

        m.replace_input_range(6, 8, "gh").unwrap();
        assert_eq!(m.input(), "ab cd gh");
        // "ab " and "cd " stay memoized
        assert!(m.memo_size() >= 2);
        assert!(m.memo_size() < before);

        let incremental = m.match_rule(None).unwrap();
        let fresh = g.match_input("ab cd gh", None).unwrap();
        assert_eq!(incremental, fresh);
    }

    #[test]
    fn test_depth_cap_reports_too_deep_and_recovers() {
        // start = "a" start | end
        let mut g = Grammar::new("Nest", None);
        g.define_rule(RuleInfo::new(
            "start",
            PExpr::alt(vec![
                PExpr::seq(vec![PExpr::terminal("a"), PExpr::apply("start")]),
                PExpr::End,
            ]),
            "Nest",
        ));
        g.set_default_start_rule("start");

        let len = MAX_APPLICATION_DEPTH + 1;
        let mut m = Matcher::new(&g);
        m.set_input(&"a".repeat(len));
        assert_eq!(
            m.match_rule(None),
            Err(MatchError::TooDeep {
                grammar: "Nest".into(),
                rule: "start".into()
            })
        );
        assert_eq!(m.memo_size(), 0);

        m.replace_input_range(100, len, "").unwrap();
        let result = m.match_rule(None).unwrap();
        assert!(result.succeeded());
        assert_eq!(result.match_length(), 100);
    }

    #[test]
    fn test_edit_rejects_bad_ranges() {
        let g = words();
        let mut m = Matcher::new(&g);
        m.set_input("abc");
        assert!(m.replace_input_range(2, 1, "").is_err());
        assert!(m.replace_input_range(0, 9, "").is_err());
        assert_eq!(m.input(), "abc");
    }

    #[test]
    fn test_failed_match_after_edit() {
        let g = words();
        let mut m = Matcher::new(&g);
        m.set_input("ab");
        assert!(m.match_rule(None).unwrap().succeeded());
        m.replace_input_range(2, 2, "1").unwrap();
        let result = m.match_rule(None).unwrap();
        assert!(result.failed());
        assert_eq!(result.rightmost_failure_position(), Some(2));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use crate::primitives::grammar::meta::grammar_of_grammars;
    use proptest::prelude::*;

    /// Text built from grammar tokens so edits regularly move between valid
    /// and invalid sources.
    fn grammar_text() -> impl Strategy<Value = String> {
        let token = prop::sample::select(vec![
            "G", "H", " ", "\n", "{", "}", "=", "start", "\"a\"", "|", "*", "+", "(", ")",
            "-- x", "<:", "//c\n", "digit", "~",
        ]);
        prop::collection::vec(token, 0..24).prop_map(|tokens| tokens.concat())
    }

    /// (start, length, replacement) with positions as fractions of the
    /// current length.
    fn edits() -> impl Strategy<Value = Vec<(f64, f64, String)>> {
        prop::collection::vec((0.0..=1.0f64, 0.0..=0.5f64, grammar_text()), 1..6)
    }

    proptest! {
        /// Any sequence of range edits leaves the matcher equivalent to one
        /// that was given the final text directly
        #[test]
        fn edits_match_a_fresh_parse(initial in grammar_text(), edits in edits()) {
            let meta = grammar_of_grammars();
            let mut incremental = Matcher::new(meta);
            incremental.set_input(&initial);
            incremental.match_rule(None).unwrap();

            let mut expected = initial.clone();
            for (start, length, text) in edits {
                let from = (start * expected.len() as f64) as usize;
                let to = (from + (length * expected.len() as f64) as usize).min(expected.len());
                incremental.replace_input_range(from, to, &text).unwrap();
                expected.replace_range(from..to, &text);
                prop_assert_eq!(incremental.input(), expected.as_str());

                let result = incremental.match_rule(None).unwrap();
                let mut fresh = Matcher::new(meta);
                fresh.set_input(&expected);
                prop_assert_eq!(&result, &fresh.match_rule(None).unwrap());
                prop_assert_eq!(result.message(), fresh.match_rule(None).unwrap().message());
            }
        }

        /// Matching twice without edits gives the same result
        #[test]
        fn match_is_idempotent(text in grammar_text()) {
            let mut matcher = Matcher::new(grammar_of_grammars());
            matcher.set_input(&text);
            let first = matcher.match_rule(None).unwrap();
            let second = matcher.match_rule(None).unwrap();
            prop_assert_eq!(first, second);
        }
    }
}
