//! Metadata store error types.

use thiserror::Error;

/// Metadata store operation errors.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("invalid test case state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("invalid experiment definition: {0}")]
    InvalidDefinition(String),

    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Result type for metadata operations.
pub type MetadataResult<T> = std::result::Result<T, MetadataError>;
