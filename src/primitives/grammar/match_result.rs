use std::rc::Rc;

use super::cst::{CstCursor, Node};
use super::failure::{Failure, FailureSet};
use super::interval::{excerpt, line_and_column, Interval};

/// Outcome of matching an input against a grammar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    input: Rc<str>,
    start_rule: String,
    cst: Option<Rc<Node>>,
    /// Offset of the root node; non-zero when a syntactic start rule skipped
    /// leading spaces
    cst_offset: usize,
    failures: FailureSet,
}

impl MatchResult {
    pub(crate) fn new(
        input: Rc<str>,
        start_rule: String,
        cst: Option<(usize, Rc<Node>)>,
        failures: FailureSet,
    ) -> Self {
        let (cst_offset, cst) = match cst {
            Some((offset, node)) => (offset, Some(node)),
            None => (0, None),
        };
        Self {
            input,
            start_rule,
            cst,
            cst_offset,
            failures,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.cst.is_some()
    }

    pub fn failed(&self) -> bool {
        !self.succeeded()
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn start_rule(&self) -> &str {
        &self.start_rule
    }

    pub fn cst(&self) -> Option<CstCursor<'_>> {
        self.cst
            .as_ref()
            .map(|node| CstCursor::new(node, self.cst_offset, &self.input))
    }

    /// Number of input bytes consumed by the start rule.
    pub fn match_length(&self) -> usize {
        self.cst.as_ref().map(|n| n.match_length()).unwrap_or(0)
    }

    /// Offset of the rightmost failure. For a failed match this is where the
    /// error is reported.
    pub fn rightmost_failure_position(&self) -> Option<usize> {
        self.failures.position()
    }

    pub fn rightmost_failures(&self) -> Vec<Failure> {
        self.failures.failures()
    }

    fn failure_offset(&self) -> usize {
        self.failures.position().unwrap_or(0)
    }

    /// Where the failure is reported; an empty interval at the failure offset.
    pub fn interval(&self) -> Interval {
        if self.succeeded() {
            Interval::new(self.cst_offset, self.cst_offset + self.match_length())
        } else {
            Interval::at(self.failure_offset())
        }
    }

    /// Multi-line failure message with a source excerpt. Empty on success.
    pub fn message(&self) -> String {
        if self.succeeded() {
            return String::new();
        }
        let offset = self.failure_offset();
        let lc = line_and_column(&self.input, offset);
        format!(
            "Line {}, col {}:\n{}Expected {}",
            lc.line,
            lc.column,
            excerpt(&self.input, offset),
            self.failures.expected_text()
        )
    }

    /// One-line failure message. Empty on success.
    pub fn short_message(&self) -> String {
        if self.succeeded() {
            return String::new();
        }
        let lc = line_and_column(&self.input, self.failure_offset());
        format!(
            "Line {}, col {}: expected {}",
            lc.line,
            lc.column,
            self.failures.expected_text()
        )
    }
}
