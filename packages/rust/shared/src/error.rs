//! Error types for svcaudit.
//!
//! Library crates use [`AuditError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Most *per-record* failures never become an `AuditError`: by
//! contract they are recorded as `Error: ...` values inside the output
//! row and the run continues. This type covers run-fatal and
//! infrastructure failures.

use std::path::PathBuf;

/// Top-level error type for all svcaudit operations.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// External command failure (spawn error, non-zero exit, timeout).
    #[error("command error: {0}")]
    Command(String),

    /// Network/HTTP error against the monitoring API or webhook.
    #[error("network error: {0}")]
    Network(String),

    /// Sink or intermediate-store failure.
    #[error("sink error: {0}")]
    Sink(String),

    /// Payload parsing error.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Run-input validation error (missing project list, empty input).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, AuditError>;

impl AuditError {
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_formatting() {
        let err = AuditError::config("missing output directory");
        assert_eq!(err.to_string(), "config error: missing output directory");

        let err = AuditError::validation("no projects listed");
        assert!(err.to_string().contains("no projects listed"));

        let err = AuditError::Command("gcloud exited with status 1".into());
        assert!(err.to_string().starts_with("command error:"));
    }
}
