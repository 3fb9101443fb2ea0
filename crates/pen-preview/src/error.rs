//! Error types for the preview sandbox
//!
//! Text processing (instrumentation, synthesis) never fails; errors only
//! come from the plumbing around it:
//! - Runtime channel closure
//! - Sandbox host failures and policy violations
//! - Malformed or rejected sandbox messages
//! - Configuration problems

use crate::sandbox::SandboxCapability;
use crate::types::Generation;
use std::path::PathBuf;

/// Main preview error type
#[derive(Debug, thiserror::Error)]
pub enum PreviewError {
    /// The runtime task has stopped
    #[error("preview runtime is closed")]
    Closed,

    /// Sandbox host failed
    #[error("sandbox error: {0}")]
    Sandbox(#[from] SandboxError),

    /// Configuration is invalid
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl PreviewError {
    /// Check if the runtime can keep going after this error
    #[inline]
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Sandbox(SandboxError::RenderFailed { .. }))
    }
}

/// Sandbox host errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SandboxError {
    /// Policy grants a capability that breaks isolation
    #[error("capability not allowed in a sandboxed preview: {0}")]
    ForbiddenCapability(SandboxCapability),

    /// Host could not create the context
    #[error("failed to render generation {generation}: {reason}")]
    RenderFailed {
        /// Generation that failed to render
        generation: Generation,
        /// Host-provided reason
        reason: String,
    },

    /// Host has no message port attached
    #[error("sandbox host is detached")]
    Detached,
}

/// Errors while decoding a message posted by a sandboxed context
#[derive(Debug, thiserror::Error)]
pub enum MessageError {
    /// Payload does not match any known message
    #[error("unrecognized message: {0}")]
    Unrecognized(#[from] serde_json::Error),

    /// Origin rejected by policy
    #[error("origin rejected: {0}")]
    OriginRejected(String),
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A duration or capacity is zero
    #[error("{0} must be greater than zero")]
    ZeroValue(&'static str),

    /// Sandbox policy is invalid
    #[error("invalid sandbox policy: {0}")]
    Sandbox(#[from] SandboxError),

    /// TOML could not be parsed
    #[error("malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// Configuration file could not be read
    #[error("io error reading {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },
}
