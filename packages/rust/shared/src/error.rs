//! Error types for kbsync.
//!
//! Library crates use [`KbSyncError`] via `thiserror`.
//! The CLI app wraps this with `color-eyre` for rich diagnostics.
//!
//! Every error carries an implicit [`Severity`] that drives the run-level
//! failure policy: credential rejection aborts the whole run, per-target
//! authorization problems drop that target for the rest of the run, and
//! transient network conditions are retried with backoff.

use std::path::PathBuf;

/// Top-level error type for all kbsync operations.
#[derive(Debug, thiserror::Error)]
pub enum KbSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// Transport-level HTTP failure (timeout, connect, body read).
    #[error("network error: {0}")]
    Network(String),

    /// Credential rejected by the catalog service (HTTP 401).
    #[error("authentication rejected: {message}")]
    Unauthorized { message: String },

    /// Access to one destination denied (HTTP 403).
    #[error("access denied for target {target}: {message}")]
    Forbidden { target: String, message: String },

    /// Destination or remote document does not exist (HTTP 404).
    #[error("not found on target {target}: {message}")]
    MissingResource { target: String, message: String },

    /// Rate-limiting or server-side failure (HTTP 429 / 5xx).
    #[error("server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },

    /// Any other non-success API response.
    #[error("catalog API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Unexpected response body shape from the catalog service.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// State file handling error (outside the recoverable corrupt-file path).
    #[error("state error: {message}")]
    State { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbSyncError>;

/// Failure severity classes governing run behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Abort the entire run immediately.
    Fatal,
    /// Drop the affected target for the rest of the run.
    TargetFatal,
    /// Retry with exponential backoff, then fail the single operation.
    Retryable,
    /// Fail the single operation without retrying.
    Operation,
}

impl KbSyncError {
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

    /// Create a state error from any displayable message.
    pub fn state(msg: impl Into<String>) -> Self {
        Self::State {
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

    /// Classify this error into the severity bucket that drives retry,
    /// failover, and abort decisions.
    pub fn severity(&self) -> Severity {
        match self {
            Self::Unauthorized { .. } => Severity::Fatal,
            Self::Forbidden { .. } | Self::MissingResource { .. } => Severity::TargetFatal,
            Self::Network(_) | Self::Server { .. } => Severity::Retryable,
            _ => Severity::Operation,
        }
    }
}
