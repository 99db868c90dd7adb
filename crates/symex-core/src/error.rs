//! Errors raised by the engine
//!
//! Problems with the analyzed program are recorded as completion errors
//! and never raised. What is raised here means the engine itself, or the
//! export it was asked to perform, failed.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SymexError {
    /// The merge or control propagation bookkeeping is inconsistent
    #[error("Internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SymexError {
    pub fn invariant(message: impl Into<String>) -> Self {
        SymexError::InvariantViolation(message.into())
    }

    /// Whether the run that produced this error must be discarded
    pub fn is_invariant_violation(&self) -> bool {
        matches!(self, SymexError::InvariantViolation(_))
    }
}

pub type Result<T> = std::result::Result<T, SymexError>;
