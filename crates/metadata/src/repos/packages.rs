//! Package repository.

use crate::error::MetadataResult;
use crate::models::PackageRow;
use async_trait::async_trait;

/// Repository for packages.
#[async_trait]
pub trait PackageRepo: Send + Sync {
    /// Find a package by `(owner_id, name)` or create it. `registry_id` is
    /// only written on insert.
    async fn find_or_create_package(
        &self,
        owner_id: i64,
        registry_id: i64,
        name: &str,
    ) -> MetadataResult<PackageRow>;

    /// Look up a package by its composite key.
    async fn get_package(&self, owner_id: i64, name: &str) -> MetadataResult<Option<PackageRow>>;
}
