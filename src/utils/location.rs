//! Source location tracking.
//!
//! Procedures and IR nodes keep a line-level span into the raw source so
//! that diagnostics and the (external) pretty-printer can refer back to the
//! original text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A line span in the original source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Span {
    /// First line of the construct (1-based).
    pub line_start: usize,
    /// Last line of the construct (1-based, inclusive).
    pub line_end: usize,
}

impl Span {
    /// Create a new span covering the given line range.
    pub fn new(line_start: usize, line_end: usize) -> Self {
        Self { line_start, line_end }
    }

    /// Create a span covering a single line.
    pub fn line(line: usize) -> Self {
        Self::new(line, line)
    }

    /// Create a placeholder span for synthesized nodes.
    pub fn dummy() -> Self {
        Self::default()
    }

    /// Merge two spans into the smallest span covering both.
    pub fn merge(&self, other: &Span) -> Span {
        Span {
            line_start: self.line_start.min(other.line_start),
            line_end: self.line_end.max(other.line_end),
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.line_start == self.line_end {
            write!(f, "line {}", self.line_start)
        } else {
            write!(f, "lines {}-{}", self.line_start, self.line_end)
        }
    }
}
