//! Error types for consoleprobe
//!
//! Every failure the supervisor can report is a [`ProbeError`]. The core
//! never retries on its own; [`ProbeError::suggested_action`] tells the
//! operator what to look at instead.

use crate::diagnostics::{CrashReport, ExitCode};
use consoleprobe_transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for consoleprobe operations
pub type Result<T> = std::result::Result<T, ProbeError>;

/// Errors that can occur while supervising a console process
#[derive(Error, Debug)]
pub enum ProbeError {
    /// The executable could not be found
    #[error("Binary not found: {}", .0.display())]
    BinaryNotFound(PathBuf),

    /// The executable was found but could not be launched
    #[error("Failed to start {}: {reason}", .binary.display())]
    Spawn {
        /// Executable that failed to launch
        binary: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The process exited before the startup grace period ended
    #[error("Process exited during startup with code {exit_code}")]
    ExitedDuringStartup {
        /// How the process exited
        exit_code: ExitCode,
        /// Crash report captured at the exit
        report: Option<Box<CrashReport>>,
        /// Where the crash report was written, if anywhere
        location: Option<PathBuf>,
    },

    /// No live process to talk to
    #[error("Not connected to a running process")]
    NotConnected,

    /// Writing a command to the process failed
    #[error("Command failed: {0}")]
    Command(String),

    /// The process crashed
    #[error("Process crashed: {0}")]
    CrashDetected(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid regular expression
    #[error("Invalid regex: {0}")]
    Regex(#[from] regex::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl ProbeError {
    /// Create a command error
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the process could not be brought up
    pub fn is_spawn_error(&self) -> bool {
        matches!(
            self,
            Self::BinaryNotFound(_) | Self::Spawn { .. } | Self::ExitedDuringStartup { .. }
        )
    }

    /// What an operator should do about this error
    pub fn suggested_action(&self) -> &'static str {
        match self {
            Self::BinaryNotFound(_) => {
                "Build the console binary or pass its location with --binary."
            }
            Self::Spawn { .. } => "Check that the binary is executable and the project root exists.",
            Self::ExitedDuringStartup { .. } => {
                "The process died while starting. Read the crash report for the exit \
                classification and the stderr tail."
            }
            Self::NotConnected => "Start the process again before sending commands.",
            Self::Command(_) => {
                "The process stopped accepting input. Check whether it crashed and restart it."
            }
            Self::CrashDetected(_) => {
                "Read the crash report and fix the failure before restarting the process."
            }
            Self::Io(err) => match err.kind() {
                std::io::ErrorKind::NotFound => "File not found. Check file path exists.",
                std::io::ErrorKind::PermissionDenied => {
                    "File permission denied. Check file permissions."
                }
                _ => "I/O error occurred. Check file system health and disk space.",
            },
            Self::Json(_) => "Fix the JSON document and run again.",
            Self::Regex(_) => "Fix the regular expression syntax.",
            Self::Config(_) => "Fix the configuration and start a new supervisor.",
        }
    }

    /// Map a transport failure during launch onto the spawn error family
    pub(crate) fn from_spawn(binary: PathBuf, err: TransportError) -> Self {
        match err {
            TransportError::NotFound(path) => Self::BinaryNotFound(path),
            other => Self::Spawn {
                binary,
                reason: other.to_string(),
            },
        }
    }
}

impl From<TransportError> for ProbeError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => Self::Io(e),
            TransportError::NotFound(path) => Self::BinaryNotFound(path),
            TransportError::Connection(_) => Self::NotConnected,
            other => Self::Command(other.to_string()),
        }
    }
}
