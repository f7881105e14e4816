//! Source locations shared by the analyzer, emitter and binary codec.

use serde::{Deserialize, Serialize};
use std::rc::Rc;

/// A byte range plus 1-indexed line/column positions within a named source file.
///
/// This is the concrete shape the analyzer's external syntax-tree interface
/// promises every node carries (see the crate's `ast` module).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub file: Rc<str>,
    pub start: u32,
    pub end: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub start_column: u32,
    pub end_column: u32,
}

impl SourceLocation {
    pub fn new(
        file: impl Into<Rc<str>>,
        start: u32,
        end: u32,
        start_line: u32,
        end_line: u32,
        start_column: u32,
        end_column: u32,
    ) -> Self {
        Self {
            file: file.into(),
            start,
            end,
            start_line,
            end_line,
            start_column,
            end_column,
        }
    }

    /// A placeholder location for synthesized nodes (e.g. folded literals) that
    /// still need to report a span to the source map.
    pub fn synthetic() -> Self {
        Self::new("<synthetic>", 0, 0, 1, 1, 0, 0)
    }

    pub fn text<'a>(&self, source: &'a str) -> &'a str {
        &source[self.start as usize..self.end as usize]
    }

    /// Spans the gap between the end of `self` and the start of `other`,
    /// used when folding `a op b` into a single literal that must still cover
    /// the original operator's position for the source map.
    pub fn cover(&self, other: &SourceLocation) -> SourceLocation {
        SourceLocation {
            file: self.file.clone(),
            start: self.start.min(other.start),
            end: self.end.max(other.end),
            start_line: self.start_line.min(other.start_line),
            end_line: self.end_line.max(other.end_line),
            start_column: self.start_column,
            end_column: other.end_column,
        }
    }
}
