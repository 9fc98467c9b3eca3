//! Transport error types

use std::path::PathBuf;
use thiserror::Error;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Errors that can occur while talking to a child process
#[derive(Debug, Error)]
pub enum TransportError {
    /// I/O error on one of the child's pipes
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The executable could not be found
    #[error("Executable not found: {}", .0.display())]
    NotFound(PathBuf),

    /// Process error (spawn, wait, signal)
    #[error("Process error: {0}")]
    Process(String),

    /// A bounded wait elapsed
    #[error("Timeout")]
    Timeout,

    /// The pipe to the child is no longer usable
    #[error("Connection error: {0}")]
    Connection(String),
}

impl TransportError {
    /// Create a new `Process` error
    pub fn process(msg: impl Into<String>) -> Self {
        Self::Process(msg.into())
    }

    /// Create a new `Connection` error
    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }
}
