//! Custom error types for the autonomy loop.
//!
//! Store-level errors are fatal: the loop refuses to start without a readable
//! queue document, and a corrupt document is never treated as an empty one.
//! Execution-outcome errors (agent timeouts, nonzero exits) live in
//! [`crate::agent`] and are absorbed into per-task retry bookkeeping instead
//! of surfacing here.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for autonomy operations
#[derive(Error, Debug)]
pub enum AutonomyError {
    /// Queue document is absent - the loop cannot start
    #[error("Queue document not found: {path} (run your task planner first)")]
    MissingStore { path: PathBuf },

    /// Queue document exists but failed to parse
    #[error("Queue document is corrupt: {path} - {message}")]
    CorruptStore { path: PathBuf, message: String },

    /// Failed to load or parse configuration
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        path: Option<PathBuf>,
    },

    /// Loop execution failed
    #[error("Loop execution error: {message}")]
    Loop { message: String },

    /// IO error wrapper
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON error wrapper
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AutonomyError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            path: None,
        }
    }

    /// Create a configuration error with path
    pub fn config_with_path(message: impl Into<String>, path: PathBuf) -> Self {
        Self::Config {
            message: message.into(),
            path: Some(path),
        }
    }

    /// Create a loop error
    pub fn loop_error(message: impl Into<String>) -> Self {
        Self::Loop {
            message: message.into(),
        }
    }

    /// Check if this error is fatal (should abort the loop)
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingStore { .. } | Self::CorruptStore { .. } | Self::Config { .. }
        )
    }

    /// Get error code for exit status
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::MissingStore { .. } => 2,
            Self::CorruptStore { .. } => 3,
            Self::Config { .. } => 7,
            _ => 1,
        }
    }
}

/// Type alias for autonomy results
pub type Result<T> = std::result::Result<T, AutonomyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = AutonomyError::MissingStore {
            path: PathBuf::from(".autonomy/feature_list.json"),
        };
        assert!(err.to_string().contains("feature_list.json"));
    }

    #[test]
    fn test_corrupt_store_is_fatal() {
        let err = AutonomyError::CorruptStore {
            path: PathBuf::from("q.json"),
            message: "expected value at line 1".into(),
        };
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn test_missing_store_exit_code() {
        let err = AutonomyError::MissingStore {
            path: PathBuf::from("q.json"),
        };
        assert!(err.is_fatal());
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn test_loop_error_is_not_fatal() {
        let err = AutonomyError::loop_error("iteration hiccup");
        assert!(!err.is_fatal());
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_config_with_path() {
        let path = PathBuf::from(".autonomy/config.json");
        let err = AutonomyError::config_with_path("failed to parse", path.clone());
        if let AutonomyError::Config {
            message,
            path: opt_path,
        } = err
        {
            assert_eq!(message, "failed to parse");
            assert_eq!(opt_path, Some(path));
        } else {
            panic!("Wrong error variant");
        }
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err: AutonomyError = io_err.into();
        assert!(matches!(err, AutonomyError::Io(_)));
        assert!(!err.is_fatal());
    }
}
