//! Error types for the decision logging pipeline.

use thiserror::Error;

/// Errors surfaced to callers of the decision logger.
#[derive(Debug, Error)]
pub enum LoggerError {
    /// The logger has not been initialized, or has been shut down.
    #[error("decision logger is not initialized")]
    NotInitialized,

    /// `initialize` was called on a running logger.
    #[error("decision logger is already initialized")]
    AlreadyInitialized,

    /// Invalid logger configuration.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The submitted decision is missing or malformed.
    #[error("invalid decision: {0}")]
    InvalidDecision(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Internal error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<arbiter_core::ConfigError> for LoggerError {
    fn from(err: arbiter_core::ConfigError) -> Self {
        match err {
            arbiter_core::ConfigError::Config(msg) => Self::Configuration(msg),
            other => Self::Configuration(other.to_string()),
        }
    }
}

/// Failure reported by a sink for one submission.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SinkError {
    /// Temporary failure; the submission may be retried.
    #[error("transient sink failure: {0}")]
    Transient(String),

    /// The sink rejected the submission; retrying will not help.
    #[error("permanent sink failure: {0}")]
    Permanent(String),
}

impl SinkError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// The failure message without the classification prefix.
    pub fn reason(&self) -> &str {
        match self {
            Self::Transient(reason) | Self::Permanent(reason) => reason,
        }
    }
}

impl From<std::io::Error> for SinkError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind;
        match err.kind() {
            ErrorKind::Interrupted | ErrorKind::WouldBlock | ErrorKind::TimedOut => {
                Self::Transient(err.to_string())
            }
            _ => Self::Permanent(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for SinkError {
    fn from(err: serde_json::Error) -> Self {
        Self::Permanent(format!("serialization failed: {err}"))
    }
}
