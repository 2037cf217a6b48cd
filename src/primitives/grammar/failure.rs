//! Rightmost-failure bookkeeping.
//!
//! A failed match is reported at the furthest position where any expression
//! failed, together with everything that was expected there.

use std::fmt;

use serde::Serialize;

use super::pexpr::quote;

/// Something the matcher expected to find at a failure position.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Expected {
    Terminal(String),
    Range(char, char),
    Any,
    End,
    /// The description of a rule, e.g. "a digit"
    Description(String),
    /// Negative lookahead on the given expression
    Not(String),
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expected::Terminal(s) => write!(f, "{}", quote(s)),
            Expected::Range(lo, hi) => {
                write!(f, "{}..{}", quote(&lo.to_string()), quote(&hi.to_string()))
            }
            Expected::Any => write!(f, "any character"),
            Expected::End => write!(f, "end of input"),
            Expected::Description(d) => write!(f, "{d}"),
            Expected::Not(e) => write!(f, "not {e}"),
        }
    }
}

/// A single expectation at an absolute input offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub offset: usize,
    pub expected: Expected,
}

/// The failures recorded at the rightmost failure position.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureSet {
    pos: Option<usize>,
    expected: Vec<Expected>,
}

impl FailureSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(pos: usize, expected: Expected) -> Self {
        Self {
            pos: Some(pos),
            expected: vec![expected],
        }
    }

    pub fn position(&self) -> Option<usize> {
        self.pos
    }

    pub fn expected(&self) -> &[Expected] {
        &self.expected
    }

    pub fn is_empty(&self) -> bool {
        self.pos.is_none()
    }

    pub fn record(&mut self, pos: usize, expected: Expected) {
        match self.pos {
            Some(current) if pos < current => {}
            Some(current) if pos == current => {
                if !self.expected.contains(&expected) {
                    self.expected.push(expected);
                }
            }
            _ => {
                self.pos = Some(pos);
                self.expected.clear();
                self.expected.push(expected);
            }
        }
    }

    pub fn merge(&mut self, other: &FailureSet) {
        if let Some(pos) = other.pos {
            for e in &other.expected {
                self.record(pos, e.clone());
            }
        }
    }

    /// Re-express this set relative to `base` (for storage in a memo entry).
    pub fn relative_to(&self, base: usize) -> FailureSet {
        FailureSet {
            pos: self.pos.map(|p| p.saturating_sub(base)),
            expected: self.expected.clone(),
        }
    }

    /// Inverse of [`FailureSet::relative_to`].
    pub fn absolute_from(&self, base: usize) -> FailureSet {
        FailureSet {
            pos: self.pos.map(|p| p + base),
            expected: self.expected.clone(),
        }
    }

    pub fn failures(&self) -> Vec<Failure> {
        match self.pos {
            Some(offset) => self
                .expected
                .iter()
                .map(|e| Failure {
                    offset,
                    expected: e.clone(),
                })
                .collect(),
            None => Vec::new(),
        }
    }

    /// "X", "X or Y", "X, Y, or Z"
    pub fn expected_text(&self) -> String {
        let items: Vec<String> = self.expected.iter().map(|e| e.to_string()).collect();
        match items.len() {
            0 => "nothing".to_string(),
            1 => items[0].clone(),
            2 => format!("{} or {}", items[0], items[1]),
            n => format!("{}, or {}", items[..n - 1].join(", "), items[n - 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_keeps_rightmost_only() {
        let mut set = FailureSet::new();
        set.record(3, Expected::Terminal("a".into()));
        set.record(1, Expected::Terminal("b".into()));
        set.record(3, Expected::Terminal("c".into()));
        set.record(3, Expected::Terminal("a".into()));
        assert_eq!(set.position(), Some(3));
        assert_eq!(set.expected().len(), 2);

        set.record(5, Expected::End);
        assert_eq!(set.position(), Some(5));
        assert_eq!(set.expected(), &[Expected::End]);
    }

    #[test]
    fn test_relative_round_trip() {
        let set = FailureSet::single(7, Expected::Any);
        let rel = set.relative_to(4);
        assert_eq!(rel.position(), Some(3));
        assert_eq!(rel.absolute_from(10).position(), Some(13));
    }

    #[test]
    fn test_expected_text() {
        let mut set = FailureSet::new();
        set.record(0, Expected::Terminal("a".into()));
        assert_eq!(set.expected_text(), "\"a\"");
        set.record(0, Expected::Description("a digit".into()));
        assert_eq!(set.expected_text(), "\"a\" or a digit");
        set.record(0, Expected::End);
        assert_eq!(set.expected_text(), "\"a\", a digit, or end of input");
    }
}
