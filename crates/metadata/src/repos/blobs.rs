//! Content-addressed blob repository.

use crate::error::MetadataResult;
use crate::models::BlobRow;
use async_trait::async_trait;

/// Repository for immutable content-addressed blobs.
#[async_trait]
pub trait BlobRepo: Send + Sync {
    /// Find a blob by digest or insert it. One row per unique content.
    async fn find_or_create_blob(&self, sha256: &str, bytes: &[u8]) -> MetadataResult<BlobRow>;

    /// Fetch a blob by digest.
    async fn get_blob(&self, sha256: &str) -> MetadataResult<Option<BlobRow>>;

    /// Total number of live blobs.
    async fn count_blobs(&self) -> MetadataResult<i64>;
}
