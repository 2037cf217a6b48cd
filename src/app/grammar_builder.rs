//! Turning a grammar-source match into the current grammar.

use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::primitives::grammar::{
    build_grammars, excerpt, grammar_of_grammars, line_and_column, BuildError, Grammar, Interval,
    MatchError, MatchResult, Namespace,
};

/// Why a grammar source did not produce a grammar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GrammarError {
    pub message: String,
    pub short_message: String,
    pub interval: Interval,
}

impl GrammarError {
    /// Syntax error: the source did not match the grammar-of-grammars.
    pub fn from_match(result: &MatchResult) -> Self {
        Self {
            message: result.message(),
            short_message: result.short_message(),
            interval: result.interval(),
        }
    }

    /// The source could not be matched at all, e.g. it nests too deeply.
    pub fn from_match_error(error: &MatchError) -> Self {
        Self {
            message: error.to_string(),
            short_message: error.to_string(),
            interval: Interval::default(),
        }
    }

    /// Semantic error found while building a syntactically valid source.
    pub fn from_build(source: &str, error: &BuildError) -> Self {
        let lc = line_and_column(source, error.interval.start);
        Self {
            message: format!(
                "Line {}, col {}:\n{}{}",
                lc.line,
                lc.column,
                excerpt(source, error.interval.start),
                error.message
            ),
            short_message: format!("Line {}, col {}: {}", lc.line, lc.column, error.message),
            interval: error.interval,
        }
    }
}

impl fmt::Display for GrammarError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_message)
    }
}

impl std::error::Error for GrammarError {}

/// Result of building from one grammar-source match.
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub result: Rc<MatchResult>,
    pub grammar: Option<Rc<Grammar>>,
    pub error: Option<GrammarError>,
}

/// Build the first grammar declared in a grammar-source match. A source with
/// no grammars yields neither a grammar nor an error.
pub fn build_from_match(result: Rc<MatchResult>) -> BuildOutcome {
    if result.failed() {
        let error = GrammarError::from_match(&result);
        return BuildOutcome {
            result,
            grammar: None,
            error: Some(error),
        };
    }
    match build_grammars(&result) {
        Ok(namespace) => BuildOutcome {
            grammar: namespace.first().cloned(),
            result,
            error: None,
        },
        Err(e) => {
            let error = GrammarError::from_build(result.input(), &e);
            BuildOutcome {
                result,
                grammar: None,
                error: Some(error),
            }
        }
    }
}

/// Parse and build every grammar in `source` in one step.
pub fn build(source: &str) -> Result<Namespace, GrammarError> {
    let result = grammar_of_grammars()
        .match_input(source, None)
        .map_err(|e| GrammarError::from_match_error(&e))?;
    if result.failed() {
        return Err(GrammarError::from_match(&result));
    }
    build_grammars(&result).map_err(|e| GrammarError::from_build(source, &e))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(source: &str) -> BuildOutcome {
        let result = grammar_of_grammars().match_input(source, None).unwrap();
        build_from_match(Rc::new(result))
    }

    #[test]
    fn test_first_grammar_wins() {
        let out = outcome("A { a = \"a\" }\nB { b = \"b\" }");
        assert!(out.error.is_none());
        assert_eq!(out.grammar.unwrap().name(), "A");
    }

    #[test]
    fn test_syntax_error_is_captured() {
        let out = outcome("G { start = }");
        assert!(out.grammar.is_none());
        let err = out.error.unwrap();
        assert!(!err.message.is_empty());
        assert_eq!(err.interval, Interval::at(12));
        assert!(err.short_message.starts_with("Line 1, col 13: expected"));
    }

    #[test]
    fn test_semantic_error_is_captured() {
        let out = outcome("G {\n  start = nope\n}");
        assert!(out.grammar.is_none());
        let err = out.error.unwrap();
        assert_eq!(
            err.short_message,
            "Line 2, col 11: Rule nope is not declared in grammar G"
        );
        assert_eq!(err.interval, Interval::new(14, 18));
        assert!(err.message.contains("> 2 |   start = nope\n"));
    }

    #[test]
    fn test_empty_source_has_no_grammar_and_no_error() {
        let out = outcome("  // nothing here\n");
        assert!(out.result.succeeded());
        assert!(out.grammar.is_none());
        assert!(out.error.is_none());
    }
}
