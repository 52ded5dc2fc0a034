//! Error types for the squeezing engine.

use thiserror::Error;

/// Errors that can occur while configuring or running the engine.
#[derive(Debug, Error)]
pub enum SqueezeError {
    /// Required configuration is missing or out of range.
    #[error("configuration error: {0}")]
    Config(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A merged artifact could not be moved into place.
    #[error("failed to persist artifact: {0}")]
    Persist(String),

    /// A URL could not be parsed or resolved.
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
}

impl SqueezeError {
    /// Returns true if this error should abort startup.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<tempfile::PersistError> for SqueezeError {
    fn from(err: tempfile::PersistError) -> Self {
        Self::Persist(err.error.to_string())
    }
}

/// A specialized Result type for engine operations.
pub type Result<T> = std::result::Result<T, SqueezeError>;
