//! On-disk materialization of package artifacts.

use crate::error::{CacheError, CacheResult};
use crate::single_flight::TaskLock;
use granary_client::{DecoratedTransport, Distribution, RegistryClient};
use granary_core::{PackageName, PackageSpecifier};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

/// File paths for a package that has been cached locally.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedPackage {
    /// Path to the package's `*.tar.gz` on disk.
    pub tarball: Option<PathBuf>,
    /// Path to the `*.webc` on disk. `None` when the registry has no webc
    /// for the package.
    pub webc: Option<PathBuf>,
}

/// A package cache on local disk, one subtree per registry host.
pub struct DiskCache {
    root: PathBuf,
    http: reqwest::Client,
    registries: Mutex<HashMap<String, Arc<RegistryCache>>>,
}

impl DiskCache {
    pub fn new(root: impl Into<PathBuf>, http: reqwest::Client) -> Self {
        Self {
            root: root.into(),
            http,
            registries: Mutex::new(HashMap::new()),
        }
    }

    /// Get the cache for one registry, keyed by the endpoint's host.
    ///
    /// Repeated calls for the same host return the same instance, so
    /// in-flight downloads are shared no matter where the lookup started.
    pub async fn for_registry(&self, endpoint: &Url, token: &str) -> Arc<RegistryCache> {
        let host = endpoint.host_str().unwrap_or_default().to_string();

        let mut registries = self.registries.lock().await;
        if let Some(cache) = registries.get(&host) {
            return Arc::clone(cache);
        }

        let transport = DecoratedTransport::new(self.http.clone(), token);
        let cache = Arc::new(RegistryCache {
            dir: self.root.join(&host),
            gql: RegistryClient::new(transport, endpoint.clone()),
            downloaded: TaskLock::new(),
        });
        registries.insert(host, Arc::clone(&cache));

        cache
    }
}

/// The disk cache for a single registry.
pub struct RegistryCache {
    /// The directory all of this registry's files land under.
    dir: PathBuf,
    gql: RegistryClient,
    downloaded: TaskLock<PackageSpecifier, CachedPackage>,
}

impl RegistryCache {
    /// Look up a package, returning the paths to its cached artifacts.
    ///
    /// An empty `version` fetches whatever the registry considers latest.
    /// Concurrent lookups for the same `(namespace, name, version)` perform
    /// the fetch at most once; a cancelled waiter doesn't abort it.
    pub async fn lookup(
        &self,
        cancel: &CancellationToken,
        package: &PackageName,
        version: &str,
    ) -> CacheResult<CachedPackage> {
        let spec = package.at_version(version);
        let gql = self.gql.clone();
        let dir = self.dir.clone();

        self.downloaded
            .lookup(cancel, spec, move |spec| async move {
                let distribution = lookup_distribution(&gql, &spec).await?;
                let dest = dir
                    .join(&spec.name.namespace)
                    .join(&spec.name.name)
                    .join(&spec.version);
                download_distribution(gql.transport(), &dest, &distribution).await
            })
            .await
    }
}

/// Resolve the download URLs for a package, or [`CacheError::UnknownPackage`]
/// when the registry has nothing for it.
async fn lookup_distribution(
    gql: &RegistryClient,
    spec: &PackageSpecifier,
) -> CacheResult<Distribution> {
    let info = if spec.version.is_empty() {
        tracing::info!(package = %spec.name, "Looking up the latest version");
        gql.get_latest_version(&spec.name).await?
    } else {
        tracing::info!(package = %spec.name, version = %spec.version, "Looking up a pinned version");
        gql.get_version(&spec.name, &spec.version).await?
    };

    let info = info.ok_or(CacheError::UnknownPackage)?;
    if info.distribution.is_empty() {
        // Known version, but nothing to download. No partial artifacts.
        return Err(CacheError::UnknownPackage);
    }

    tracing::info!(package = %spec.name, version = %info.version, "Resolved the distribution");
    Ok(info.distribution)
}

async fn download_distribution(
    transport: &DecoratedTransport,
    dir: &Path,
    distribution: &Distribution,
) -> CacheResult<CachedPackage> {
    let mut cached = CachedPackage::default();

    if let Some(url) = &distribution.tarball_url {
        cached.tarball = Some(download(transport, dir, url).await?);
    }
    if let Some(url) = &distribution.webc_url {
        cached.webc = Some(download(transport, dir, url).await?);
    }

    tracing::info!(
        tarball = ?cached.tarball,
        webc = ?cached.webc,
        "Downloaded"
    );
    Ok(cached)
}

/// Fetch `raw_url` into `dir`, atomically.
///
/// The body streams into a uniquely-named temp file in the final directory;
/// only after a successful `sync_all` is it renamed to the URL's last path
/// segment, so readers never observe partial content under the final name.
/// A rename over an existing file overwrites it. Temp files from failed
/// downloads are left behind.
async fn download(
    transport: &DecoratedTransport,
    dir: &Path,
    raw_url: &str,
) -> CacheResult<PathBuf> {
    let url: Url = raw_url
        .parse()
        .map_err(|e| CacheError::download(raw_url, granary_client::ClientError::Url(e)))?;

    let filename = url
        .path_segments()
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|segment| !segment.is_empty())
        .ok_or_else(|| {
            CacheError::io(
                format!("cannot derive a file name from \"{raw_url}\""),
                std::io::Error::from(std::io::ErrorKind::InvalidInput),
            )
        })?;

    create_cache_dir(dir).await?;

    let temp_path = dir.join(format!(".tmp.{}", Uuid::new_v4()));
    tracing::debug!(url = %raw_url, temp = %temp_path.display(), "Downloading");

    let mut response = transport
        .get(url)
        .await
        .map_err(|source| CacheError::download(raw_url, source))?;

    let mut file = tokio::fs::File::create(&temp_path)
        .await
        .map_err(|e| CacheError::io(format!("unable to create {}", temp_path.display()), e))?;

    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|source| CacheError::download(raw_url, granary_client::ClientError::Request {
            url: raw_url.to_string(),
            source,
        }))?
    {
        file.write_all(&chunk)
            .await
            .map_err(|e| CacheError::io(format!("unable to write {}", temp_path.display()), e))?;
    }

    file.sync_all()
        .await
        .map_err(|e| CacheError::io(format!("flushing {} failed", temp_path.display()), e))?;
    drop(file);

    let final_path = dir.join(&filename);
    tokio::fs::rename(&temp_path, &final_path).await.map_err(|e| {
        CacheError::io(
            format!(
                "unable to rename {} to {}",
                temp_path.display(),
                final_path.display()
            ),
            e,
        )
    })?;

    std::path::absolute(&final_path)
        .map_err(|e| CacheError::io(format!("resolving {}", final_path.display()), e))
}

/// Create the artifact directory, permissive but not world-writable.
async fn create_cache_dir(dir: &Path) -> CacheResult<()> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| CacheError::io(format!("unable to create {}", dir.display()), e))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o766))
            .await
            .map_err(|e| CacheError::io(format!("setting the mode of {}", dir.display()), e))?;
    }

    Ok(())
}
