//! Error types for blockfeed.
//!
//! Library crates use [`BlockfeedError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all blockfeed operations.
#[derive(Debug, thiserror::Error)]
pub enum BlockfeedError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level failure (connect, timeout, body read).
    #[error("network error: {0}")]
    Network(String),

    /// The content API answered with an error status.
    #[error("api error ({}): {message}", status.map_or_else(|| "no status".to_string(), |s| s.to_string()))]
    Api { status: Option<u16>, message: String },

    /// Malformed record or response body.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (ambiguous asset directory, invalid input, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Image decode/encode failure.
    #[error("image error: {0}")]
    Image(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlockfeedError>;

impl BlockfeedError {
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

    /// Create an API error carrying the remote status code.
    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        Self::Api {
            status: Some(status),
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

    /// HTTP-like status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => *status,
            _ => None,
        }
    }

    /// Whether a retry policy may try the failed call again.
    ///
    /// Client errors (4xx) are final; so are local config and validation failures.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Api {
                status: Some(status),
                ..
            } => !(400..500).contains(status),
            Self::Config { .. } | Self::Validation { .. } => false,
            _ => true,
        }
    }
}
