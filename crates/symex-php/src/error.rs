//! Errors raised by the PHP front-end
//!
//! Problems inside analyzed units are recorded as completion errors. A
//! `PhpError` means the run itself could not be carried out.

use std::path::PathBuf;
use symex_core::SymexError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PhpError {
    #[error("Failed to read {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Engine(#[from] SymexError),
}

impl PhpError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PhpError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, PhpError>;

/// Why a unit could not be turned into a program
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}:{line}: {message}", path.display())]
pub struct ParseFailure {
    pub path: PathBuf,
    pub line: u32,
    pub message: String,
}

impl ParseFailure {
    pub fn new(path: impl Into<PathBuf>, line: u32, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}
