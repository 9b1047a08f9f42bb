//! Error types for reconcile-works.
//!
//! Library crates use [`ReconcileError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all reconciliation operations.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Connection, timeout, or unexpected HTTP status from an authority source.
    #[error("network error: {0}")]
    Network(String),

    /// The source kept answering HTTP 429 after the backoff retry.
    #[error("rate limited by {source_name}")]
    RateLimited { source_name: String },

    /// Malformed or unexpected search page / detail record.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Cache backend error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Input validation error (bad file name, missing attribute, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// RDF/XML reading or writing error.
    #[error("document error: {0}")]
    Document(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, ReconcileError>;

impl ReconcileError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Transport failures are recovered per title variant; everything else
    /// is either per-candidate (parse) or fatal.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}
