//! Owner repository.

use crate::error::MetadataResult;
use crate::models::OwnerRow;
use async_trait::async_trait;
use granary_core::OwnerKind;

/// Repository for package owners.
#[async_trait]
pub trait OwnerRepo: Send + Sync {
    /// Find an owner by `(registry_id, name)` or create it.
    ///
    /// Matching ignores `kind`; an existing owner keeps whatever kind it was
    /// first recorded with.
    async fn find_or_create_owner(
        &self,
        registry_id: i64,
        name: &str,
        kind: OwnerKind,
    ) -> MetadataResult<OwnerRow>;

    /// Look up an owner by its composite key.
    async fn get_owner(&self, registry_id: i64, name: &str) -> MetadataResult<Option<OwnerRow>>;
}
