//! Database models mapping to the metadata schema.
//!
//! Every entity carries a surrogate id, creation and update timestamps, and
//! a soft-delete tombstone. Reads filter tombstoned rows.

use granary_core::{ExperimentDefinition, OwnerKind};
use sqlx::FromRow;
use time::OffsetDateTime;

/// A known upstream registry.
#[derive(Debug, Clone, FromRow)]
pub struct RegistryRow {
    pub id: i64,
    /// GraphQL endpoint URL; globally unique.
    pub endpoint: String,
    /// Opaque API token; empty when the registry is public.
    pub token: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// A package owner (user or namespace) within one registry.
#[derive(Debug, Clone, FromRow)]
pub struct OwnerRow {
    pub id: i64,
    pub registry_id: i64,
    pub name: String,
    pub owner_kind: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl OwnerRow {
    /// The typed owner kind.
    pub fn kind(&self) -> crate::MetadataResult<OwnerKind> {
        self.owner_kind
            .parse()
            .map_err(|_| crate::MetadataError::Corrupt(format!("owner kind {:?}", self.owner_kind)))
    }
}

/// A package within one owner.
#[derive(Debug, Clone, FromRow)]
pub struct PackageRow {
    pub id: i64,
    pub owner_id: i64,
    /// Denormalized for per-registry counting without a join through owners.
    pub registry_id: i64,
    pub name: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// One published version of a package.
#[derive(Debug, Clone, FromRow)]
pub struct PackageVersionRow {
    pub id: i64,
    pub package_id: i64,
    /// Semver-shaped but not validated.
    pub version: String,
    /// The registry's opaque primary key for this version.
    pub upstream_id: String,
    pub webc_blob_id: Option<i64>,
    pub tarball_blob_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Immutable content-addressed bytes, shared across package versions.
#[derive(Debug, Clone, FromRow)]
pub struct BlobRow {
    pub id: i64,
    /// Lowercase hex SHA-256 of `bytes`; unique.
    pub sha256: String,
    pub bytes: Vec<u8>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// An experiment and its JSON definition.
#[derive(Debug, Clone, FromRow)]
pub struct ExperimentRow {
    pub id: i64,
    pub definition: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl ExperimentRow {
    /// Parse the stored definition.
    pub fn definition(&self) -> crate::MetadataResult<ExperimentDefinition> {
        ExperimentDefinition::from_json(&self.definition)
            .map_err(|e| crate::MetadataError::Corrupt(format!("experiment {}: {e}", self.id)))
    }
}

/// One (experiment, package version) pairing and its progress.
#[derive(Debug, Clone, FromRow)]
pub struct TestCaseRow {
    pub id: i64,
    pub experiment_id: i64,
    pub package_version_id: i64,
    pub state: String,
    pub outcome_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

impl TestCaseRow {
    /// The typed state.
    pub fn state(&self) -> crate::MetadataResult<TestCaseState> {
        TestCaseState::parse(&self.state)
            .ok_or_else(|| crate::MetadataError::Corrupt(format!("test case state {:?}", self.state)))
    }
}

/// The captured result of a terminated test case.
#[derive(Debug, Clone, FromRow)]
pub struct OutcomeRow {
    pub id: i64,
    pub test_case_id: i64,
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
    pub deleted_at: Option<OffsetDateTime>,
}

/// Test case lifecycle.
///
/// States advance monotonically: `queued -> running -> {errored, succeeded}`.
/// Terminal states are absorbing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TestCaseState {
    Queued,
    Running,
    Errored,
    Succeeded,
}

impl TestCaseState {
    pub fn as_str(&self) -> &'static str {
        match self {
            TestCaseState::Queued => "queued",
            TestCaseState::Running => "running",
            TestCaseState::Errored => "errored",
            TestCaseState::Succeeded => "succeeded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "queued" => Some(TestCaseState::Queued),
            "running" => Some(TestCaseState::Running),
            "errored" => Some(TestCaseState::Errored),
            "succeeded" => Some(TestCaseState::Succeeded),
            _ => None,
        }
    }

    /// Whether no further transitions are allowed out of this state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, TestCaseState::Errored | TestCaseState::Succeeded)
    }

    /// Whether `next` is a legal successor of this state.
    pub fn can_advance_to(&self, next: TestCaseState) -> bool {
        matches!(
            (self, next),
            (TestCaseState::Queued, TestCaseState::Running)
                | (TestCaseState::Running, TestCaseState::Errored)
                | (TestCaseState::Running, TestCaseState::Succeeded)
        )
    }
}

/// Per-registry row counts backing `registry list`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegistryStats {
    pub owner_count: i64,
    pub package_count: i64,
}

/// A fully-downloaded package version, ready to persist.
///
/// Produced by the sync pipeline's download workers; artifact bytes are held
/// in memory and deduplicated into blobs on write.
#[derive(Debug, Clone)]
pub struct DownloadedVersion {
    pub owner: String,
    pub owner_kind: OwnerKind,
    pub package: String,
    pub version: String,
    pub upstream_id: String,
    pub webc: Option<Vec<u8>>,
    pub tarball: Option<Vec<u8>>,
}

impl DownloadedVersion {
    /// `owner/package@version`, for log lines.
    pub fn full_name(&self) -> String {
        format!("{}/{}@{}", self.owner, self.package, self.version)
    }
}

/// What [`record_version`](crate::repos::VersionRepo::record_version) did.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordOutcome {
    /// True when a new package_versions row was inserted; false when the
    /// version was already known and the call was a no-op.
    pub version_created: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_machine_is_monotone() {
        use TestCaseState::*;
        assert!(Queued.can_advance_to(Running));
        assert!(Running.can_advance_to(Errored));
        assert!(Running.can_advance_to(Succeeded));

        assert!(!Queued.can_advance_to(Succeeded));
        assert!(!Running.can_advance_to(Queued));
        assert!(!Errored.can_advance_to(Running));
        assert!(!Succeeded.can_advance_to(Errored));
    }

    #[test]
    fn state_string_roundtrip() {
        use TestCaseState::*;
        for state in [Queued, Running, Errored, Succeeded] {
            assert_eq!(TestCaseState::parse(state.as_str()), Some(state));
        }
        assert_eq!(TestCaseState::parse("finished"), None);
    }
}
