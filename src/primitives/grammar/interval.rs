//! Source intervals and line/column excerpts for diagnostics.

use serde::{Deserialize, Serialize};

/// A half-open byte range `[start, end)` into a source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Interval {
    pub start: usize,
    pub end: usize,
}

impl Interval {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Zero-width interval at `offset`
    pub fn at(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// The text covered by this interval. Out-of-range intervals yield "".
    pub fn contents<'s>(&self, source: &'s str) -> &'s str {
        source.get(self.start..self.end).unwrap_or("")
    }
}

/// 1-based line and column of a byte offset (columns count characters).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineAndColumn {
    pub line: usize,
    pub column: usize,
}

pub fn line_and_column(source: &str, offset: usize) -> LineAndColumn {
    let offset = offset.min(source.len());
    let before = source.get(..offset).unwrap_or(source);
    let line = before.matches('\n').count() + 1;
    let line_start = before.rfind('\n').map(|i| i + 1).unwrap_or(0);
    let column = before[line_start..].chars().count() + 1;
    LineAndColumn { line, column }
}

/// Render the lines around `offset` with a caret under the offending column:
///
/// ```text
///   1 | G {
/// > 2 |   start =
///                 ^
///   3 | }
/// ```
pub fn excerpt(source: &str, offset: usize) -> String {
    let LineAndColumn { line, column } = line_and_column(source, offset);
    let lines: Vec<&str> = source.split('\n').collect();
    let prev = line.checked_sub(2).and_then(|i| lines.get(i).map(|l| (line - 1, *l)));
    let current = lines.get(line - 1).copied().unwrap_or("");
    let next = lines.get(line).map(|l| (line + 1, *l));

    let width = next.map(|(n, _)| n).unwrap_or(line).to_string().len();
    let mut out = String::new();
    if let Some((n, text)) = prev {
        out.push_str(&format!("  {n:>width$} | {text}\n"));
    }
    out.push_str(&format!("> {line:>width$} | {current}\n"));
    out.push_str(&" ".repeat(2 + width + 3 + column - 1));
    out.push_str("^\n");
    if let Some((n, text)) = next {
        out.push_str(&format!("  {n:>width$} | {text}\n"));
    }
    out
}
