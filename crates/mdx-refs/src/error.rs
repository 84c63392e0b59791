//! Error types for registry operations.

use thiserror::Error;

/// Errors that can occur during registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// No root has been published under this name.
    #[error("index not registered: {name}")]
    NotFound { name: String },

    /// The index name is invalid.
    #[error("invalid index name: {name}: {reason}")]
    InvalidName { name: String, reason: String },

    /// The registry backend failed.
    #[error("registry backend error: {0}")]
    Backend(String),
}

/// Convenience type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
