//! Cache error types.
//!
//! [`CacheError`] is `Clone`: the single-flight map memoizes whole outcomes,
//! errors included, and hands the same value to every waiter. Non-clonable
//! sources are shared behind an [`Arc`].

use granary_client::ClientError;
use std::sync::Arc;
use thiserror::Error;

/// Errors produced by cache lookups.
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// The registry doesn't know the package or version, or knows it but
    /// exposes nothing to download.
    #[error("no such package")]
    UnknownPackage,

    /// The resolver terminated abnormally; every waiter for the key sees
    /// this same error.
    #[error("resolve panicked")]
    ResolvePanicked,

    /// The waiter's cancellation token fired. The resolver, if running,
    /// keeps going.
    #[error("the lookup was cancelled")]
    Cancelled,

    #[error("registry request failed: {0}")]
    Client(Arc<ClientError>),

    #[error("unable to download from {url}: {source}")]
    Download {
        url: String,
        source: Arc<ClientError>,
    },

    #[error("{context}: {source}")]
    Io {
        context: String,
        source: Arc<std::io::Error>,
    },
}

impl CacheError {
    pub(crate) fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        CacheError::Io {
            context: context.into(),
            source: Arc::new(source),
        }
    }

    pub(crate) fn download(url: impl Into<String>, source: ClientError) -> Self {
        CacheError::Download {
            url: url.into(),
            source: Arc::new(source),
        }
    }
}

impl From<ClientError> for CacheError {
    fn from(source: ClientError) -> Self {
        CacheError::Client(Arc::new(source))
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
