//! Package version repository.

use crate::error::MetadataResult;
use crate::models::{DownloadedVersion, PackageVersionRow, RecordOutcome};
use async_trait::async_trait;

/// Repository for package versions.
#[async_trait]
pub trait VersionRepo: Send + Sync {
    /// Persist one downloaded version, upserting the whole row chain in a
    /// single transaction:
    ///
    /// 1. find-or-create the owner on `(registry_id, name)`,
    /// 2. find-or-create the package on `(owner_id, name)`,
    /// 3. find-or-create a blob per artifact present,
    /// 4. find-or-create the version on `(package_id, version)`.
    ///
    /// Re-running against unchanged input inserts nothing.
    async fn record_version(
        &self,
        registry_id: i64,
        downloaded: &DownloadedVersion,
    ) -> MetadataResult<RecordOutcome>;

    /// Look up a version by its composite key.
    async fn get_version(
        &self,
        package_id: i64,
        version: &str,
    ) -> MetadataResult<Option<PackageVersionRow>>;

    /// Number of live versions across all packages of one registry.
    async fn count_versions(&self, registry_id: i64) -> MetadataResult<i64>;
}
