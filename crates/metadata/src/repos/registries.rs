//! Registry repository.

use crate::error::MetadataResult;
use crate::models::{RegistryRow, RegistryStats};
use async_trait::async_trait;

/// Repository for registry records.
#[async_trait]
pub trait RegistryRepo: Send + Sync {
    /// Register a new upstream registry.
    ///
    /// Fails with [`MetadataError::AlreadyExists`](crate::MetadataError) when
    /// a live registry with the same endpoint exists.
    async fn create_registry(&self, endpoint: &str, token: &str) -> MetadataResult<RegistryRow>;

    /// All live registries.
    async fn list_registries(&self) -> MetadataResult<Vec<RegistryRow>>;

    /// Fetch one registry by id.
    async fn get_registry(&self, id: i64) -> MetadataResult<Option<RegistryRow>>;

    /// Soft-delete a registry. Its owners, packages and versions stop being
    /// visible through the registry but stay on disk until a hard delete
    /// cascades through the foreign keys.
    async fn delete_registry(&self, id: i64) -> MetadataResult<()>;

    /// Owner and package counts for `registry list`.
    async fn registry_stats(&self, id: i64) -> MetadataResult<RegistryStats>;
}
