//! Synchroniser error types.

use granary_client::ClientError;
use granary_metadata::MetadataError;
use thiserror::Error;

/// Errors produced while synchronising registries.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unable to fetch all packages for {endpoint}")]
    Fetch {
        endpoint: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to download {name} from {url}")]
    Download {
        name: String,
        url: String,
        #[source]
        source: ClientError,
    },

    #[error("unable to save {name}")]
    Persist {
        name: String,
        #[source]
        source: MetadataError,
    },

    #[error(transparent)]
    Metadata(#[from] MetadataError),

    /// The run's cancellation token fired. Not a failure; swallowed at the
    /// top level.
    #[error("the sync was cancelled")]
    Cancelled,
}

impl SyncError {
    pub fn is_cancellation(&self) -> bool {
        matches!(self, SyncError::Cancelled)
    }
}

/// Result type for synchroniser operations.
pub type SyncResult<T> = std::result::Result<T, SyncError>;
