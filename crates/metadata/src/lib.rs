//! Metadata persistence for granary.
//!
//! Everything the synchroniser learns about upstream registries lands here:
//! registries, owners, packages, package versions, content-deduplicated
//! blobs, plus experiments and their test cases. Backed by SQLite through
//! sqlx; access goes through the repository traits in [`repos`] and the
//! combined [`MetadataStore`] trait.

pub mod error;
pub mod models;
pub mod repos;
pub mod store;

pub use error::{MetadataError, MetadataResult};
pub use models::{
    BlobRow, DownloadedVersion, ExperimentRow, OutcomeRow, OwnerRow, PackageRow,
    PackageVersionRow, RecordOutcome, RegistryRow, RegistryStats, TestCaseRow, TestCaseState,
};
pub use store::{MetadataStore, SqliteStore};
