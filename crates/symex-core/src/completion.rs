//! Recoverable problems met while exploring a program
//!
//! None of these stop a run. Each one is recorded where it happens and the
//! affected construct degrades to data (`Unset`, a symbolic value or an
//! approximation marker).

use serde::Serialize;
use std::path::PathBuf;

/// Kind of recoverable problem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionKind {
    /// A unit's source could not be parsed
    ParseFailure,
    /// A variable, function, constant or include target could not be resolved
    UnboundReference,
    /// A loop, recursive call or include chain hit its configured bound
    IterationBoundExceeded,
    /// A construct the interpreter does not model
    Unsupported,
}

impl CompletionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionKind::ParseFailure => "parse.failure",
            CompletionKind::UnboundReference => "unbound.reference",
            CompletionKind::IterationBoundExceeded => "iteration.bound",
            CompletionKind::Unsupported => "unsupported",
        }
    }
}

impl std::fmt::Display for CompletionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single recorded problem
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompletionError {
    pub kind: CompletionKind,
    /// Human-readable message
    pub message: String,
    /// Unit being executed when the problem was met
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
    /// Line number (1-based), 0 when unknown
    pub line: u32,
}

impl CompletionError {
    pub fn new(kind: CompletionKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            file: None,
            line: 0,
        }
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }
}

impl std::fmt::Display for CompletionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.file {
            Some(file) if self.line > 0 => {
                write!(f, "{}:{}: [{}] {}", file.display(), self.line, self.kind, self.message)
            }
            Some(file) => write!(f, "{}: [{}] {}", file.display(), self.kind, self.message),
            None => write!(f, "[{}] {}", self.kind, self.message),
        }
    }
}

/// Problems recorded during one run, in the order they were met
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct CompletionErrors {
    errors: Vec<CompletionError>,
}

impl CompletionErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, error: CompletionError) {
        self.errors.push(error);
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = CompletionError>) {
        self.errors.extend(errors);
    }

    pub fn errors(&self) -> &[CompletionError] {
        &self.errors
    }

    pub fn iter(&self) -> impl Iterator<Item = &CompletionError> {
        self.errors.iter()
    }

    pub fn into_errors(self) -> Vec<CompletionError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn count_of(&self, kind: CompletionKind) -> usize {
        self.errors.iter().filter(|e| e.kind == kind).count()
    }

    /// Sort by file, then line, then kind
    pub fn sort(&mut self) {
        self.errors.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then(a.line.cmp(&b.line))
                .then(a.kind.cmp(&b.kind))
        });
    }
}
