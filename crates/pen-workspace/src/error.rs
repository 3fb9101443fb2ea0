//! Error types for the editor workspace
//!
//! Provides error handling for:
//! - Draft storage
//! - Import and export of fragment files
//! - Calls to the Pen service

use pen_preview::{ConfigError, PreviewError};
use std::path::PathBuf;

/// Main workspace error type
#[derive(Debug, thiserror::Error)]
pub enum WorkspaceError {
    /// Preview runtime failed
    #[error("preview error: {0}")]
    Preview(#[from] PreviewError),

    /// Draft store failed
    #[error("draft error: {0}")]
    Draft(#[from] DraftError),

    /// Pen service call failed
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Session has no Pen service
    #[error("no pen service configured")]
    ServiceUnavailable,

    /// File import or export failed
    #[error("io error on {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Check if retrying the operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Service(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Draft storage errors
#[derive(Debug, thiserror::Error)]
pub enum DraftError {
    /// Draft file could not be read or written
    #[error("io error on draft {path}: {source}")]
    Io {
        /// Draft file
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}

impl DraftError {
    /// Create IO error for path
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Input rejected before it is sent to the service
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Title outside 3..=100 characters
    #[error("title must be between 3 and 100 characters, got {0}")]
    TitleLength(usize),

    /// Description over 10 000 characters
    #[error("description must be at most 10000 characters, got {0}")]
    DescriptionTooLong(usize),
}

/// Pen service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Request never produced a response
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-success HTTP status
    #[error("status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },

    /// Service answered with `success: false`
    #[error("rejected by service: {message}")]
    Rejected {
        /// Service message
        message: String,
        /// Field errors
        errors: Vec<String>,
    },

    /// Successful envelope without data
    #[error("response carried no data")]
    MissingData,

    /// Request failed local validation
    #[error("invalid request: {0}")]
    Invalid(#[from] ValidationError),

    /// No pen with this id
    #[error("pen not found: {0}")]
    NotFound(i64),
}

impl ServiceError {
    /// Check if retrying the request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(err) => err.is_timeout() || err.is_connect(),
            Self::Status { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_retryable() {
        let err = ServiceError::Status {
            status: 503,
            body: String::new(),
        };
        assert!(err.is_retryable());
        assert!(WorkspaceError::from(err).is_retryable());
    }

    #[test]
    fn rejections_are_not_retryable() {
        let err = ServiceError::Rejected {
            message: "title taken".to_string(),
            errors: vec![],
        };
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "rejected by service: title taken");
    }

    #[test]
    fn validation_error_display() {
        let err = ServiceError::from(ValidationError::TitleLength(2));
        assert!(err.to_string().contains("between 3 and 100"));
    }
}
