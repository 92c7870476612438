//! Error types for undolog
//!
//! Provides a unified error type for all operations. Integrity mismatches
//! are deliberately absent: they are soft findings carried by
//! [`crate::integrity::IntegrityReport`], never raised.

use std::path::PathBuf;

use thiserror::Error;

/// Result type alias using UndoError
pub type Result<T> = std::result::Result<T, UndoError>;

/// Unified error type for undolog operations
#[derive(Debug, Error)]
pub enum UndoError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Unable to {action} '{}': {source}", path.display())]
    IoAt {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Log Errors
    // -------------------------------------------------------------------------
    #[error("Error while parsing line {line} of the backup log: {reason}")]
    Parse { line: usize, reason: String },

    #[error(
        "The permissions of '{}' have been changed since it was created \
         (expected {expected:04o}, found {actual:04o})",
        path.display()
    )]
    PermissionTamper {
        path: PathBuf,
        expected: u32,
        actual: u32,
    },

    #[error("Version line '{0}' carries no parenthesized version")]
    VersionFormat(String),

    #[error("Unable to encode log record: {0}")]
    Encode(String),

    // -------------------------------------------------------------------------
    // Backup Errors
    // -------------------------------------------------------------------------
    #[error("Unable to backup {kind} '{}'", path.display())]
    UnsupportedFileType { path: PathBuf, kind: &'static str },

    #[error("No backup slot numbers left after {0}")]
    SlotsExhausted(u64),
}

impl UndoError {
    /// Attach a path and the attempted action to an I/O error
    pub fn io_at(action: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        UndoError::IoAt {
            action,
            path: path.into(),
            source,
        }
    }

    /// Build a parse error for the given 1-based line
    pub fn parse(line: usize, reason: impl Into<String>) -> Self {
        UndoError::Parse {
            line,
            reason: reason.into(),
        }
    }

    /// True when the error came from a missing file or directory
    pub fn is_not_found(&self) -> bool {
        match self {
            UndoError::Io(e) | UndoError::IoAt { source: e, .. } => {
                e.kind() == std::io::ErrorKind::NotFound
            }
            _ => false,
        }
    }
}
