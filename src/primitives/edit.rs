//! Range validation shared by text documents and incremental matchers.

use std::ops::Range;

/// Errors raised when an edit range does not fit the text it is applied to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditError {
    /// `from > to`
    InvertedRange { from: usize, to: usize },
    /// `to` is past the end of the text
    OutOfBounds { to: usize, len: usize },
    /// An offset falls inside a multi-byte character
    NotCharBoundary(usize),
}

impl std::fmt::Display for EditError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EditError::InvertedRange { from, to } => {
                write!(f, "Invalid edit range: start {from} is after end {to}")
            }
            EditError::OutOfBounds { to, len } => {
                write!(f, "Edit range end {to} is past the end of the text (length {len})")
            }
            EditError::NotCharBoundary(offset) => {
                write!(f, "Offset {offset} is not on a character boundary")
            }
        }
    }
}

impl std::error::Error for EditError {}

/// Check that `from..to` is a valid byte range of `text`.
pub fn validate_range(text: &str, from: usize, to: usize) -> Result<Range<usize>, EditError> {
    if from > to {
        return Err(EditError::InvertedRange { from, to });
    }
    if to > text.len() {
        return Err(EditError::OutOfBounds {
            to,
            len: text.len(),
        });
    }
    for offset in [from, to] {
        if !text.is_char_boundary(offset) {
            return Err(EditError::NotCharBoundary(offset));
        }
    }
    Ok(from..to)
}
