//! Metadata store trait and the SQLite implementation.

use crate::error::{MetadataError, MetadataResult};
use crate::repos::{BlobRepo, ExperimentRepo, OwnerRepo, PackageRepo, RegistryRepo, VersionRepo};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Combined metadata store trait.
#[async_trait]
pub trait MetadataStore:
    RegistryRepo + OwnerRepo + PackageRepo + BlobRepo + VersionRepo + ExperimentRepo + Send + Sync
{
    /// Apply the schema.
    async fn migrate(&self) -> MetadataResult<()>;

    /// Check database connectivity.
    async fn health_check(&self) -> MetadataResult<()>;
}

/// SQLite-based metadata store.
pub struct SqliteStore {
    pool: Pool<Sqlite>,
}

impl SqliteStore {
    /// Open (or create) a store at `path` and apply the schema.
    pub async fn open(path: impl AsRef<Path>) -> MetadataResult<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    MetadataError::Database(sqlx::Error::Io(std::io::Error::new(
                        e.kind(),
                        format!("creating {}: {e}", parent.display()),
                    )))
                })?;
            }
        }

        let opts = SqliteConnectOptions::from_str(&format!("sqlite:{}?mode=rwc", path.display()))?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .foreign_keys(true)
            // Prevent transient "database is locked" errors under concurrent access.
            .busy_timeout(Duration::from_secs(5));

        Self::connect(opts).await
    }

    /// An in-memory store, mainly for tests.
    pub async fn in_memory() -> MetadataResult<Self> {
        let opts = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        Self::connect(opts).await
    }

    async fn connect(opts: SqliteConnectOptions) -> MetadataResult<Self> {
        // A single connection sidesteps SQLite's limited write concurrency;
        // the sync persistor is single-writer anyway.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(opts)
            .await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Get a reference to the connection pool.
    pub fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }
}

#[async_trait]
impl MetadataStore for SqliteStore {
    async fn migrate(&self) -> MetadataResult<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        Ok(())
    }

    async fn health_check(&self) -> MetadataResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

// Repository implementations for SqliteStore
mod sqlite_impl {
    use super::*;
    use crate::models::*;
    use granary_core::{ContentHash, ExperimentDefinition, OwnerKind};
    use sqlx::SqliteConnection;
    use time::OffsetDateTime;

    async fn fetch_owner(
        conn: &mut SqliteConnection,
        registry_id: i64,
        name: &str,
    ) -> MetadataResult<Option<OwnerRow>> {
        let row = sqlx::query_as::<_, OwnerRow>(
            "SELECT * FROM owners WHERE registry_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(registry_id)
        .bind(name)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    /// Find-or-create on `(registry_id, name)`; the kind is written only on
    /// insert.
    async fn owner_or_insert(
        conn: &mut SqliteConnection,
        registry_id: i64,
        name: &str,
        kind: OwnerKind,
    ) -> MetadataResult<OwnerRow> {
        if let Some(owner) = fetch_owner(conn, registry_id, name).await? {
            return Ok(owner);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO owners (registry_id, name, owner_kind, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(registry_id)
        .bind(name)
        .bind(kind.as_str())
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        fetch_owner(conn, registry_id, name)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("owner {name} after insert")))
    }

    async fn fetch_package(
        conn: &mut SqliteConnection,
        owner_id: i64,
        name: &str,
    ) -> MetadataResult<Option<PackageRow>> {
        let row = sqlx::query_as::<_, PackageRow>(
            "SELECT * FROM packages WHERE owner_id = ? AND name = ? AND deleted_at IS NULL",
        )
        .bind(owner_id)
        .bind(name)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    async fn package_or_insert(
        conn: &mut SqliteConnection,
        owner_id: i64,
        registry_id: i64,
        name: &str,
    ) -> MetadataResult<PackageRow> {
        if let Some(package) = fetch_package(conn, owner_id, name).await? {
            return Ok(package);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query(
            "INSERT INTO packages (owner_id, registry_id, name, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(owner_id)
        .bind(registry_id)
        .bind(name)
        .bind(now)
        .bind(now)
        .execute(&mut *conn)
        .await?;

        fetch_package(conn, owner_id, name)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("package {name} after insert")))
    }

    async fn fetch_blob(
        conn: &mut SqliteConnection,
        sha256: &str,
    ) -> MetadataResult<Option<BlobRow>> {
        let row = sqlx::query_as::<_, BlobRow>(
            "SELECT * FROM blobs WHERE sha256 = ? AND deleted_at IS NULL",
        )
        .bind(sha256)
        .fetch_optional(conn)
        .await?;
        Ok(row)
    }

    async fn blob_or_insert(
        conn: &mut SqliteConnection,
        sha256: &str,
        bytes: &[u8],
    ) -> MetadataResult<BlobRow> {
        if let Some(blob) = fetch_blob(conn, sha256).await? {
            return Ok(blob);
        }

        let now = OffsetDateTime::now_utc();
        sqlx::query("INSERT INTO blobs (sha256, bytes, created_at, updated_at) VALUES (?, ?, ?, ?)")
            .bind(sha256)
            .bind(bytes)
            .bind(now)
            .bind(now)
            .execute(&mut *conn)
            .await?;

        fetch_blob(conn, sha256)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("blob {sha256} after insert")))
    }

    #[async_trait]
    impl RegistryRepo for SqliteStore {
        async fn create_registry(&self, endpoint: &str, token: &str) -> MetadataResult<RegistryRow> {
            let existing = sqlx::query_as::<_, RegistryRow>(
                "SELECT * FROM registries WHERE endpoint = ? AND deleted_at IS NULL",
            )
            .bind(endpoint)
            .fetch_optional(&self.pool)
            .await?;
            if existing.is_some() {
                return Err(MetadataError::AlreadyExists(format!(
                    "registry {endpoint:?}"
                )));
            }

            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "INSERT INTO registries (endpoint, token, created_at, updated_at) VALUES (?, ?, ?, ?)",
            )
            .bind(endpoint)
            .bind(token)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            self.get_registry(result.last_insert_rowid())
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("registry {endpoint} after insert")))
        }

        async fn list_registries(&self) -> MetadataResult<Vec<RegistryRow>> {
            let rows = sqlx::query_as::<_, RegistryRow>(
                "SELECT * FROM registries WHERE deleted_at IS NULL ORDER BY id",
            )
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        }

        async fn get_registry(&self, id: i64) -> MetadataResult<Option<RegistryRow>> {
            let row = sqlx::query_as::<_, RegistryRow>(
                "SELECT * FROM registries WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn delete_registry(&self, id: i64) -> MetadataResult<()> {
            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "UPDATE registries SET deleted_at = ?, updated_at = ? \
                 WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(now)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() == 0 {
                return Err(MetadataError::NotFound(format!("registry {id}")));
            }
            Ok(())
        }

        async fn registry_stats(&self, id: i64) -> MetadataResult<RegistryStats> {
            let owner_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM owners WHERE registry_id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

            let package_count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM packages WHERE registry_id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_one(&self.pool)
            .await?;

            Ok(RegistryStats {
                owner_count,
                package_count,
            })
        }
    }

    #[async_trait]
    impl OwnerRepo for SqliteStore {
        async fn find_or_create_owner(
            &self,
            registry_id: i64,
            name: &str,
            kind: OwnerKind,
        ) -> MetadataResult<OwnerRow> {
            let mut tx = self.pool.begin().await?;
            let owner = owner_or_insert(&mut tx, registry_id, name, kind).await?;
            tx.commit().await?;
            Ok(owner)
        }

        async fn get_owner(
            &self,
            registry_id: i64,
            name: &str,
        ) -> MetadataResult<Option<OwnerRow>> {
            let mut conn = self.pool.acquire().await?;
            fetch_owner(&mut conn, registry_id, name).await
        }
    }

    #[async_trait]
    impl PackageRepo for SqliteStore {
        async fn find_or_create_package(
            &self,
            owner_id: i64,
            registry_id: i64,
            name: &str,
        ) -> MetadataResult<PackageRow> {
            let mut tx = self.pool.begin().await?;
            let package = package_or_insert(&mut tx, owner_id, registry_id, name).await?;
            tx.commit().await?;
            Ok(package)
        }

        async fn get_package(
            &self,
            owner_id: i64,
            name: &str,
        ) -> MetadataResult<Option<PackageRow>> {
            let mut conn = self.pool.acquire().await?;
            fetch_package(&mut conn, owner_id, name).await
        }
    }

    #[async_trait]
    impl BlobRepo for SqliteStore {
        async fn find_or_create_blob(&self, sha256: &str, bytes: &[u8]) -> MetadataResult<BlobRow> {
            let mut tx = self.pool.begin().await?;
            let blob = blob_or_insert(&mut tx, sha256, bytes).await?;
            tx.commit().await?;
            Ok(blob)
        }

        async fn get_blob(&self, sha256: &str) -> MetadataResult<Option<BlobRow>> {
            let mut conn = self.pool.acquire().await?;
            fetch_blob(&mut conn, sha256).await
        }

        async fn count_blobs(&self) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM blobs WHERE deleted_at IS NULL")
                .fetch_one(&self.pool)
                .await?;
            Ok(count)
        }
    }

    #[async_trait]
    impl VersionRepo for SqliteStore {
        async fn record_version(
            &self,
            registry_id: i64,
            downloaded: &DownloadedVersion,
        ) -> MetadataResult<RecordOutcome> {
            let mut tx = self.pool.begin().await?;

            let owner = owner_or_insert(
                &mut tx,
                registry_id,
                &downloaded.owner,
                downloaded.owner_kind,
            )
            .await?;
            let package =
                package_or_insert(&mut tx, owner.id, registry_id, &downloaded.package).await?;

            let existing = sqlx::query_as::<_, PackageVersionRow>(
                "SELECT * FROM package_versions \
                 WHERE package_id = ? AND version = ? AND deleted_at IS NULL",
            )
            .bind(package.id)
            .bind(&downloaded.version)
            .fetch_optional(&mut *tx)
            .await?;

            if existing.is_some() {
                tx.commit().await?;
                return Ok(RecordOutcome {
                    version_created: false,
                });
            }

            let mut webc_blob_id = None;
            if let Some(bytes) = downloaded.webc.as_deref() {
                let sha256 = ContentHash::compute(bytes).to_hex();
                webc_blob_id = Some(blob_or_insert(&mut tx, &sha256, bytes).await?.id);
            }

            let mut tarball_blob_id = None;
            if let Some(bytes) = downloaded.tarball.as_deref() {
                let sha256 = ContentHash::compute(bytes).to_hex();
                tarball_blob_id = Some(blob_or_insert(&mut tx, &sha256, bytes).await?.id);
            }

            let now = OffsetDateTime::now_utc();
            sqlx::query(
                "INSERT INTO package_versions \
                 (package_id, version, upstream_id, webc_blob_id, tarball_blob_id, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(package.id)
            .bind(&downloaded.version)
            .bind(&downloaded.upstream_id)
            .bind(webc_blob_id)
            .bind(tarball_blob_id)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            tx.commit().await?;
            Ok(RecordOutcome {
                version_created: true,
            })
        }

        async fn get_version(
            &self,
            package_id: i64,
            version: &str,
        ) -> MetadataResult<Option<PackageVersionRow>> {
            let row = sqlx::query_as::<_, PackageVersionRow>(
                "SELECT * FROM package_versions \
                 WHERE package_id = ? AND version = ? AND deleted_at IS NULL",
            )
            .bind(package_id)
            .bind(version)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn count_versions(&self, registry_id: i64) -> MetadataResult<i64> {
            let count: i64 = sqlx::query_scalar(
                "SELECT COUNT(*) FROM package_versions pv \
                 JOIN packages p ON p.id = pv.package_id \
                 WHERE p.registry_id = ? AND pv.deleted_at IS NULL",
            )
            .bind(registry_id)
            .fetch_one(&self.pool)
            .await?;
            Ok(count)
        }
    }

    #[async_trait]
    impl ExperimentRepo for SqliteStore {
        async fn create_experiment(&self, definition: &str) -> MetadataResult<ExperimentRow> {
            ExperimentDefinition::from_json(definition)
                .map_err(|e| MetadataError::InvalidDefinition(e.to_string()))?;

            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "INSERT INTO experiments (definition, created_at, updated_at) VALUES (?, ?, ?)",
            )
            .bind(definition)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            self.get_experiment(result.last_insert_rowid())
                .await?
                .ok_or_else(|| MetadataError::NotFound("experiment after insert".to_string()))
        }

        async fn get_experiment(&self, id: i64) -> MetadataResult<Option<ExperimentRow>> {
            let row = sqlx::query_as::<_, ExperimentRow>(
                "SELECT * FROM experiments WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn create_test_case(
            &self,
            experiment_id: i64,
            package_version_id: i64,
        ) -> MetadataResult<TestCaseRow> {
            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "INSERT INTO test_cases \
                 (experiment_id, package_version_id, state, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(experiment_id)
            .bind(package_version_id)
            .bind(TestCaseState::Queued.as_str())
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

            self.get_test_case(result.last_insert_rowid())
                .await?
                .ok_or_else(|| MetadataError::NotFound("test case after insert".to_string()))
        }

        async fn get_test_case(&self, id: i64) -> MetadataResult<Option<TestCaseRow>> {
            let row = sqlx::query_as::<_, TestCaseRow>(
                "SELECT * FROM test_cases WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
            Ok(row)
        }

        async fn start_test_case(&self, id: i64) -> MetadataResult<TestCaseRow> {
            let mut tx = self.pool.begin().await?;

            let case = sqlx::query_as::<_, TestCaseRow>(
                "SELECT * FROM test_cases WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("test case {id}")))?;

            let state = case.state()?;
            if !state.can_advance_to(TestCaseState::Running) {
                return Err(MetadataError::InvalidStateTransition {
                    from: state.as_str().to_string(),
                    to: TestCaseState::Running.as_str().to_string(),
                });
            }

            let now = OffsetDateTime::now_utc();
            sqlx::query("UPDATE test_cases SET state = ?, updated_at = ? WHERE id = ?")
                .bind(TestCaseState::Running.as_str())
                .bind(now)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            tx.commit().await?;

            self.get_test_case(id)
                .await?
                .ok_or_else(|| MetadataError::NotFound(format!("test case {id}")))
        }

        async fn finish_test_case(
            &self,
            id: i64,
            state: TestCaseState,
            exit_code: i64,
            stdout: &str,
            stderr: &str,
        ) -> MetadataResult<OutcomeRow> {
            let mut tx = self.pool.begin().await?;

            let case = sqlx::query_as::<_, TestCaseRow>(
                "SELECT * FROM test_cases WHERE id = ? AND deleted_at IS NULL",
            )
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| MetadataError::NotFound(format!("test case {id}")))?;

            let current = case.state()?;
            if !state.is_terminal() || !current.can_advance_to(state) {
                return Err(MetadataError::InvalidStateTransition {
                    from: current.as_str().to_string(),
                    to: state.as_str().to_string(),
                });
            }

            let now = OffsetDateTime::now_utc();
            let result = sqlx::query(
                "INSERT INTO outcomes \
                 (test_case_id, exit_code, stdout, stderr, created_at, updated_at) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(id)
            .bind(exit_code)
            .bind(stdout)
            .bind(stderr)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await?;
            let outcome_id = result.last_insert_rowid();

            sqlx::query(
                "UPDATE test_cases SET state = ?, outcome_id = ?, updated_at = ? WHERE id = ?",
            )
            .bind(state.as_str())
            .bind(outcome_id)
            .bind(now)
            .bind(id)
            .execute(&mut *tx)
            .await?;

            let outcome = sqlx::query_as::<_, OutcomeRow>("SELECT * FROM outcomes WHERE id = ?")
                .bind(outcome_id)
                .fetch_one(&mut *tx)
                .await?;
            tx.commit().await?;

            Ok(outcome)
        }
    }
}

const SCHEMA_SQL: &str = r#"
-- Upstream registries
CREATE TABLE IF NOT EXISTS registries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    endpoint TEXT NOT NULL,
    token TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_registries_endpoint ON registries(endpoint);

-- Package owners (users and namespaces)
CREATE TABLE IF NOT EXISTS owners (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    registry_id INTEGER NOT NULL REFERENCES registries(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    owner_kind TEXT NOT NULL DEFAULT 'unknown',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_owners_registry_name ON owners(registry_id, name);

-- Packages
CREATE TABLE IF NOT EXISTS packages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    owner_id INTEGER NOT NULL REFERENCES owners(id) ON DELETE CASCADE,
    -- Denormalized so per-registry counts don't need a join through owners.
    registry_id INTEGER NOT NULL REFERENCES registries(id) ON DELETE CASCADE,
    name TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_packages_owner_name ON packages(owner_id, name);
CREATE INDEX IF NOT EXISTS idx_packages_registry ON packages(registry_id);

-- Content-addressed blobs; immutable after insert
CREATE TABLE IF NOT EXISTS blobs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sha256 TEXT NOT NULL,
    bytes BLOB NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_blobs_sha256 ON blobs(sha256);

-- Package versions
CREATE TABLE IF NOT EXISTS package_versions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    package_id INTEGER NOT NULL REFERENCES packages(id) ON DELETE CASCADE,
    version TEXT NOT NULL,
    upstream_id TEXT NOT NULL DEFAULT '',
    webc_blob_id INTEGER REFERENCES blobs(id),
    tarball_blob_id INTEGER REFERENCES blobs(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE UNIQUE INDEX IF NOT EXISTS idx_package_versions_package_version
    ON package_versions(package_id, version);
CREATE INDEX IF NOT EXISTS idx_package_versions_upstream ON package_versions(upstream_id);

-- Experiments
CREATE TABLE IF NOT EXISTS experiments (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    definition TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);

-- Test cases; state advances queued -> running -> {errored, succeeded}
CREATE TABLE IF NOT EXISTS test_cases (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    experiment_id INTEGER NOT NULL REFERENCES experiments(id) ON DELETE CASCADE,
    package_version_id INTEGER NOT NULL REFERENCES package_versions(id) ON DELETE CASCADE,
    state TEXT NOT NULL DEFAULT 'queued',
    outcome_id INTEGER REFERENCES outcomes(id),
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_test_cases_experiment ON test_cases(experiment_id);

-- Captured results, one per terminated test case
CREATE TABLE IF NOT EXISTS outcomes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    test_case_id INTEGER NOT NULL REFERENCES test_cases(id) ON DELETE CASCADE,
    exit_code INTEGER NOT NULL,
    stdout TEXT NOT NULL DEFAULT '',
    stderr TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    deleted_at TEXT
);
CREATE INDEX IF NOT EXISTS idx_outcomes_test_case ON outcomes(test_case_id);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DownloadedVersion, TestCaseState};
    use granary_core::{ContentHash, OwnerKind};

    fn cowsay(version: &str) -> DownloadedVersion {
        DownloadedVersion {
            owner: "syrusakbary".to_string(),
            owner_kind: OwnerKind::User,
            package: "cowsay".to_string(),
            version: version.to_string(),
            upstream_id: format!("pkgver-cowsay-{version}"),
            webc: Some(b"webc bytes".to_vec()),
            tarball: Some(b"tarball bytes".to_vec()),
        }
    }

    #[tokio::test]
    async fn registry_endpoint_is_unique() {
        let store = SqliteStore::in_memory().await.unwrap();

        store
            .create_registry("https://registry.example.com/graphql", "")
            .await
            .unwrap();
        let err = store
            .create_registry("https://registry.example.com/graphql", "token")
            .await
            .unwrap_err();
        assert!(matches!(err, MetadataError::AlreadyExists(_)));
    }

    #[tokio::test]
    async fn find_or_create_owner_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();

        let first = store
            .find_or_create_owner(registry.id, "wasmer", OwnerKind::Namespace)
            .await
            .unwrap();
        // A second call matches on (registry_id, name) only; the kind is not
        // rewritten.
        let second = store
            .find_or_create_owner(registry.id, "wasmer", OwnerKind::User)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.kind().unwrap(), OwnerKind::Namespace);
    }

    #[tokio::test]
    async fn record_version_is_idempotent() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();

        let outcome = store.record_version(registry.id, &cowsay("0.3.0")).await.unwrap();
        assert!(outcome.version_created);

        let stats = store.registry_stats(registry.id).await.unwrap();
        let blobs = store.count_blobs().await.unwrap();
        let versions = store.count_versions(registry.id).await.unwrap();

        let outcome = store.record_version(registry.id, &cowsay("0.3.0")).await.unwrap();
        assert!(!outcome.version_created);

        assert_eq!(store.registry_stats(registry.id).await.unwrap().owner_count, stats.owner_count);
        assert_eq!(
            store.registry_stats(registry.id).await.unwrap().package_count,
            stats.package_count
        );
        assert_eq!(store.count_blobs().await.unwrap(), blobs);
        assert_eq!(store.count_versions(registry.id).await.unwrap(), versions);
    }

    #[tokio::test]
    async fn identical_artifacts_share_one_blob() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();

        // 0.4.0 carries byte-identical artifacts to 0.3.0.
        store.record_version(registry.id, &cowsay("0.3.0")).await.unwrap();
        store.record_version(registry.id, &cowsay("0.4.0")).await.unwrap();

        // Two versions, but only two distinct contents.
        assert_eq!(store.count_versions(registry.id).await.unwrap(), 2);
        assert_eq!(store.count_blobs().await.unwrap(), 2);

        let sha256 = ContentHash::compute(b"webc bytes").to_hex();
        let blob = store.get_blob(&sha256).await.unwrap().unwrap();
        assert_eq!(blob.bytes, b"webc bytes");
    }

    #[tokio::test]
    async fn version_rows_reference_their_blobs() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();
        store.record_version(registry.id, &cowsay("0.3.0")).await.unwrap();

        let owner = store.get_owner(registry.id, "syrusakbary").await.unwrap().unwrap();
        let package = store.get_package(owner.id, "cowsay").await.unwrap().unwrap();
        let version = store.get_version(package.id, "0.3.0").await.unwrap().unwrap();

        assert_eq!(version.upstream_id, "pkgver-cowsay-0.3.0");
        assert!(version.webc_blob_id.is_some());
        assert!(version.tarball_blob_id.is_some());
    }

    #[tokio::test]
    async fn missing_artifacts_leave_null_blob_references() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();

        let mut item = cowsay("0.3.0");
        item.webc = None;
        store.record_version(registry.id, &item).await.unwrap();

        let owner = store.get_owner(registry.id, "syrusakbary").await.unwrap().unwrap();
        let package = store.get_package(owner.id, "cowsay").await.unwrap().unwrap();
        let version = store.get_version(package.id, "0.3.0").await.unwrap().unwrap();
        assert!(version.webc_blob_id.is_none());
        assert!(version.tarball_blob_id.is_some());
        assert_eq!(store.count_blobs().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn soft_deleted_registries_disappear_from_reads() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();

        store.delete_registry(registry.id).await.unwrap();

        assert!(store.list_registries().await.unwrap().is_empty());
        assert!(store.get_registry(registry.id).await.unwrap().is_none());
        // Deleting again is NotFound, not a silent no-op.
        assert!(matches!(
            store.delete_registry(registry.id).await.unwrap_err(),
            MetadataError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn hard_delete_cascades_through_the_row_chain() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();
        store.record_version(registry.id, &cowsay("0.3.0")).await.unwrap();

        sqlx::query("DELETE FROM registries WHERE id = ?")
            .bind(registry.id)
            .execute(store.pool())
            .await
            .unwrap();

        let owners: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM owners")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let packages: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM packages")
            .fetch_one(store.pool())
            .await
            .unwrap();
        let versions: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM package_versions")
            .fetch_one(store.pool())
            .await
            .unwrap();

        assert_eq!((owners, packages, versions), (0, 0, 0));
        // Blobs are shared content, not owned by any registry.
        assert_eq!(store.count_blobs().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn experiment_definitions_are_validated() {
        let store = SqliteStore::in_memory().await.unwrap();

        let experiment = store
            .create_experiment(r#"{ "package": "wasmer/python" }"#)
            .await
            .unwrap();
        assert_eq!(experiment.definition().unwrap().package, "wasmer/python");

        assert!(matches!(
            store.create_experiment("not json").await.unwrap_err(),
            MetadataError::InvalidDefinition(_)
        ));
    }

    #[tokio::test]
    async fn test_case_state_advances_monotonically() {
        let store = SqliteStore::in_memory().await.unwrap();
        let registry = store.create_registry("https://r.example/graphql", "").await.unwrap();
        store.record_version(registry.id, &cowsay("0.3.0")).await.unwrap();
        let owner = store.get_owner(registry.id, "syrusakbary").await.unwrap().unwrap();
        let package = store.get_package(owner.id, "cowsay").await.unwrap().unwrap();
        let version = store.get_version(package.id, "0.3.0").await.unwrap().unwrap();

        let experiment = store
            .create_experiment(r#"{ "package": "wasmer/python" }"#)
            .await
            .unwrap();
        let case = store.create_test_case(experiment.id, version.id).await.unwrap();
        assert_eq!(case.state().unwrap(), TestCaseState::Queued);

        // queued -> succeeded skips running and is rejected.
        assert!(matches!(
            store
                .finish_test_case(case.id, TestCaseState::Succeeded, 0, "", "")
                .await
                .unwrap_err(),
            MetadataError::InvalidStateTransition { .. }
        ));

        let case = store.start_test_case(case.id).await.unwrap();
        assert_eq!(case.state().unwrap(), TestCaseState::Running);

        let outcome = store
            .finish_test_case(case.id, TestCaseState::Succeeded, 0, "moo", "")
            .await
            .unwrap();
        assert_eq!(outcome.stdout, "moo");

        let case = store.get_test_case(case.id).await.unwrap().unwrap();
        assert_eq!(case.state().unwrap(), TestCaseState::Succeeded);
        assert_eq!(case.outcome_id, Some(outcome.id));

        // Terminal states are absorbing.
        assert!(store.start_test_case(case.id).await.is_err());
        assert!(store
            .finish_test_case(case.id, TestCaseState::Errored, 1, "", "boom")
            .await
            .is_err());
    }
}
