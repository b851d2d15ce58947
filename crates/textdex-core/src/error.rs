//! Error types for the textdex core.
//!
//! Per-file failures (missing files, unparseable documents, slow parsers) are
//! represented here so they can be logged and isolated by the caller. Only
//! [`TextdexError::Cancelled`] is meant to travel all the way up to the
//! application as a call-level outcome.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for the textdex core.
#[derive(Debug, Error)]
pub enum TextdexError {
    // File system errors
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    // Parsing errors
    #[error("No parser registered for extension {extension:?} ({path})")]
    UnsupportedType { path: PathBuf, extension: String },

    #[error("Parser {parser} failed on {path}: {message}")]
    ParseFailure {
        parser: String,
        path: PathBuf,
        message: String,
    },

    #[error("Parsing {path} exceeded {timeout:?}")]
    ParseTimeout { path: PathBuf, timeout: Duration },

    #[error("Failed to hash {path}: {message}")]
    HashComputationFailure { path: PathBuf, message: String },

    // Store errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    #[error("Full-text index unavailable: {message}")]
    IndexBackendUnavailable { message: String },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Operation was cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(String),
}

/// Result type alias for textdex operations.
pub type Result<T> = std::result::Result<T, TextdexError>;

impl From<std::io::Error> for TextdexError {
    fn from(err: std::io::Error) -> Self {
        TextdexError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for TextdexError {
    fn from(err: serde_json::Error) -> Self {
        TextdexError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for TextdexError {
    fn from(err: rusqlite::Error) -> Self {
        TextdexError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl TextdexError {
    /// Create an IO error with path context.
    ///
    /// A `NotFound` IO error is mapped to [`TextdexError::NotFound`] so callers
    /// can treat a vanished file the same way regardless of where it was noticed.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            return TextdexError::NotFound(path);
        }
        TextdexError::Io {
            message: err.to_string(),
            path: Some(path),
            source: Some(err),
        }
    }

    /// Database error raised when the shared connection mutex is poisoned.
    pub(crate) fn lock_poisoned() -> Self {
        TextdexError::Database {
            message: "Failed to acquire connection lock".to_string(),
            source: None,
        }
    }

    /// True for cooperative cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, TextdexError::Cancelled)
    }

    /// Errors that only concern a single file and must not abort a
    /// multi-file scan or search.
    pub fn is_per_file(&self) -> bool {
        matches!(
            self,
            TextdexError::NotFound(_)
                | TextdexError::Io { .. }
                | TextdexError::UnsupportedType { .. }
                | TextdexError::ParseFailure { .. }
                | TextdexError::ParseTimeout { .. }
                | TextdexError::HashComputationFailure { .. }
        )
    }
}
