//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid package name: {0}")]
    InvalidPackageName(String),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid owner kind: {0}")]
    InvalidOwnerKind(String),

    #[error("the experiment definition was empty")]
    EmptyDefinition,

    #[error("invalid experiment definition: {0}")]
    InvalidDefinition(#[from] serde_json::Error),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
