//! Compiler diagnostics.
//!
//! The analyzer never throws to its caller except for truly unrecoverable
//! (`Critical`) conditions; every other finding is yielded as a `Diagnostic`
//! and the pass keeps going. `Diagnostic` doubles as this crate's compile-time
//! error type (`std::error::Error`) so `?` works in helpers that bail out on
//! the first `Error`/`Critical` notice.

use crate::span::SourceLocation;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DiagnosticKind {
    Info,
    Warning,
    Error,
    Note,
    Debug,
    Critical,
}

impl fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DiagnosticKind::Info => "Info",
            DiagnosticKind::Warning => "Warning",
            DiagnosticKind::Error => "Error",
            DiagnosticKind::Note => "Note",
            DiagnosticKind::Debug => "Debug",
            DiagnosticKind::Critical => "Critical",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub extra: Vec<Diagnostic>,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self {
            kind,
            message: message.into(),
            location,
            extra: Vec::new(),
        }
    }

    pub fn with_extra(mut self, extra: Vec<Diagnostic>) -> Self {
        self.extra = extra;
        self
    }

    pub fn error(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(DiagnosticKind::Error, message, location)
    }

    pub fn warning(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(DiagnosticKind::Warning, message, location)
    }

    pub fn note(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(DiagnosticKind::Note, message, location)
    }

    pub fn critical(message: impl Into<String>, location: Option<SourceLocation>) -> Self {
        Self::new(DiagnosticKind::Critical, message, location)
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self.kind, DiagnosticKind::Error | DiagnosticKind::Critical)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "{}: {} ({}:{}:{})",
                self.kind, self.message, loc.file, loc.start_line, loc.start_column
            ),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

/// A lazily-growing sink for diagnostics emitted while walking the program.
/// Passes push into this rather than returning early, so one bad declaration
/// doesn't stop the rest of the program from being checked.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn extend(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics.extend(diagnostics);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(Diagnostic::is_fatal)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn into_vec(self) -> Vec<Diagnostic> {
        self.diagnostics
    }
}
