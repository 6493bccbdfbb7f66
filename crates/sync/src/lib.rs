//! Registry synchronisation.
//!
//! One pass ([`synchronise_all`]) walks every registered registry: a
//! producer pages through the registry's full package-version listing, a
//! bounded pool of workers downloads artifacts into memory, and a single
//! persistor upserts the results so database writes stay serialized. The
//! periodic driver ([`start_periodic`]) repeats passes at a fixed interval
//! without ever overlapping them.

pub mod context;
pub mod error;

pub use context::TaskContext;
pub use error::{SyncError, SyncResult};

use granary_client::{DecoratedTransport, PartialVersion, RegistryClient};
use granary_core::config::default_download_concurrency;
use granary_metadata::repos::{RegistryRepo, VersionRepo};
use granary_metadata::{DownloadedVersion, RegistryRow};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use url::Url;

/// Tuning knobs for a sync pass.
#[derive(Debug, Clone)]
pub struct SyncOptions {
    /// Concurrent artifact downloads per registry.
    pub download_concurrency: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            download_concurrency: default_download_concurrency(),
        }
    }
}

/// Run [`synchronise_all`] every `interval` until cancelled.
///
/// Runs never overlap: the next wait only starts once the previous pass has
/// finished. Failures are logged and the loop keeps going.
pub async fn start_periodic(
    ctx: &TaskContext,
    cancel: &CancellationToken,
    http: &reqwest::Client,
    interval: Duration,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {
                let run_ctx = ctx.child();
                if let Err(err) = synchronise_all(&run_ctx, cancel, http).await {
                    tracing::error!(error = %err, "Sync failed");
                }
            }
        }
    }
}

/// Fetch all package versions from all known registries, once.
///
/// Registries sync concurrently and independently. The first
/// non-cancellation error cancels the whole pass and is returned; remaining
/// errors are drained and logged. Plain cancellation is not a failure.
pub async fn synchronise_all(
    ctx: &TaskContext,
    cancel: &CancellationToken,
    http: &reqwest::Client,
) -> SyncResult<()> {
    synchronise_all_with(ctx, cancel, http, SyncOptions::default()).await
}

/// [`synchronise_all`] with explicit tuning.
pub async fn synchronise_all_with(
    ctx: &TaskContext,
    cancel: &CancellationToken,
    http: &reqwest::Client,
    options: SyncOptions,
) -> SyncResult<()> {
    tracing::info!("Started synchronising packages");
    let started = Instant::now();

    let registries = ctx.db().list_registries().await?;
    let run_cancel = cancel.child_token();
    let (error_tx, mut error_rx) = mpsc::unbounded_channel::<SyncError>();

    let mut registry_tasks = JoinSet::new();
    for registry in registries {
        let ctx = ctx.clone();
        let http = http.clone();
        let run_cancel = run_cancel.clone();
        let error_tx = error_tx.clone();
        let options = options.clone();
        let span = tracing::info_span!(
            "sync",
            registry = %registry.endpoint,
            request_id = %ctx.request_id(),
        );
        registry_tasks.spawn(
            async move {
                synchronise_registry(&ctx, &run_cancel, &http, &registry, &options, &error_tx)
                    .await;
            }
            .instrument(span),
        );
    }
    drop(error_tx);

    // Collect errors in the background: the first real one cancels the run,
    // the rest are drained so no stage blocks on a full channel.
    let collector = tokio::spawn({
        let run_cancel = run_cancel.clone();
        async move {
            let mut first: Option<SyncError> = None;
            while let Some(err) = error_rx.recv().await {
                if err.is_cancellation() {
                    continue;
                }
                if first.is_none() {
                    run_cancel.cancel();
                    first = Some(err);
                } else {
                    tracing::warn!(error = %err, "Further sync error");
                }
            }
            first
        }
    });

    while registry_tasks.join_next().await.is_some() {}
    let first_error = collector.await.ok().flatten();

    tracing::info!(duration = ?started.elapsed(), "Finished synchronising");

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

/// The per-registry pipeline: producer -> download workers -> persistor.
async fn synchronise_registry(
    ctx: &TaskContext,
    cancel: &CancellationToken,
    http: &reqwest::Client,
    registry: &RegistryRow,
    options: &SyncOptions,
    error_tx: &mpsc::UnboundedSender<SyncError>,
) {
    tracing::info!("Syncing registry");

    let endpoint: Url = match registry.endpoint.parse() {
        Ok(endpoint) => endpoint,
        Err(e) => {
            let _ = error_tx.send(SyncError::Fetch {
                endpoint: registry.endpoint.clone(),
                source: granary_client::ClientError::Url(e),
            });
            return;
        }
    };
    let transport = DecoratedTransport::new(http.clone(), registry.token.clone());
    let client = RegistryClient::new(transport.clone(), endpoint);

    // Small buffers throughout; backpressure flows up from the persistor.
    let (partial_tx, partial_rx) = mpsc::channel::<PartialVersion>(1);
    let (downloaded_tx, mut downloaded_rx) = mpsc::channel::<DownloadedVersion>(1);

    let producer = tokio::spawn({
        let cancel = cancel.clone();
        let client = client.clone();
        let error_tx = error_tx.clone();
        async move {
            // Dropping partial_tx on exit closes the channel for the workers,
            // whether paging finished, failed or was cancelled.
            if let Err(err) = produce_all_packages(&cancel, &client, &partial_tx).await {
                let _ = error_tx.send(err);
            }
        }
        .in_current_span()
    });

    let partial_rx = Arc::new(tokio::sync::Mutex::new(partial_rx));
    let mut workers = JoinSet::new();
    for _ in 0..options.download_concurrency.max(1) {
        let cancel = cancel.clone();
        let transport = transport.clone();
        let partial_rx = Arc::clone(&partial_rx);
        let downloaded_tx = downloaded_tx.clone();
        let error_tx = error_tx.clone();
        workers.spawn(
            async move {
                loop {
                    let partial = { partial_rx.lock().await.recv().await };
                    let Some(partial) = partial else { break };

                    tracing::debug!(package = %partial.full_name(), "Downloading package");
                    match download_package(&cancel, &transport, &partial).await {
                        Ok(downloaded) => {
                            if downloaded_tx.send(downloaded).await.is_err() {
                                break;
                            }
                        }
                        Err(err) => {
                            // Per-item failure; the other workers keep going
                            // until the collector cancels the run.
                            let _ = error_tx.send(err);
                        }
                    }
                }
            }
            .in_current_span(),
        );
    }
    drop(downloaded_tx);

    // A single persistor serializes row creation, so find-or-create never
    // races itself into duplicate rows.
    let persistor = tokio::spawn({
        let db = Arc::clone(ctx.db());
        let registry_id = registry.id;
        let error_tx = error_tx.clone();
        async move {
            while let Some(downloaded) = downloaded_rx.recv().await {
                let name = downloaded.full_name();
                match db.record_version(registry_id, &downloaded).await {
                    Ok(outcome) => {
                        if !outcome.version_created {
                            tracing::debug!(package = %name, "Already downloaded");
                        }
                    }
                    Err(source) => {
                        let _ = error_tx.send(SyncError::Persist { name, source });
                    }
                }
            }
        }
        .in_current_span()
    });

    while workers.join_next().await.is_some() {}
    let _ = producer.await;
    let _ = persistor.await;
}

/// Page through the registry's full listing, emitting every version.
async fn produce_all_packages(
    cancel: &CancellationToken,
    client: &RegistryClient,
    partial_tx: &mpsc::Sender<PartialVersion>,
) -> SyncResult<()> {
    let mut after: Option<String> = None;

    loop {
        tracing::info!("Fetching a page");
        let page = tokio::select! {
            _ = cancel.cancelled() => return Err(SyncError::Cancelled),
            page = client.get_all_packages(after.as_deref()) => {
                page.map_err(|source| SyncError::Fetch {
                    endpoint: client.endpoint().to_string(),
                    source,
                })?
            }
        };
        tracing::debug!(versions = page.versions.len(), "Retrieved a page of packages");

        for partial in page.versions {
            tokio::select! {
                _ = cancel.cancelled() => return Err(SyncError::Cancelled),
                sent = partial_tx.send(partial) => {
                    if sent.is_err() {
                        // Every worker is gone; nothing left to feed.
                        return Ok(());
                    }
                }
            }
        }

        match page.end_cursor {
            Some(cursor) => after = Some(cursor),
            None => break,
        }
    }

    Ok(())
}

/// Download both artifacts of one version into memory.
async fn download_package(
    cancel: &CancellationToken,
    transport: &DecoratedTransport,
    partial: &PartialVersion,
) -> SyncResult<DownloadedVersion> {
    let mut downloaded = DownloadedVersion {
        owner: partial.owner.clone(),
        owner_kind: partial.owner_kind,
        package: partial.package.clone(),
        version: partial.version.clone(),
        upstream_id: partial.upstream_id.clone(),
        webc: None,
        tarball: None,
    };

    if let Some(url) = &partial.tarball_url {
        let bytes = download_file(cancel, transport, &partial.full_name(), url).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Downloaded tarball");
        downloaded.tarball = Some(bytes);
    }

    if let Some(url) = &partial.webc_url {
        let bytes = download_file(cancel, transport, &partial.full_name(), url).await?;
        tracing::debug!(url = %url, bytes = bytes.len(), "Downloaded webc");
        downloaded.webc = Some(bytes);
    }

    Ok(downloaded)
}

/// Fetch one artifact fully into memory.
async fn download_file(
    cancel: &CancellationToken,
    transport: &DecoratedTransport,
    name: &str,
    raw_url: &str,
) -> SyncResult<Vec<u8>> {
    let download_error = |source| SyncError::Download {
        name: name.to_string(),
        url: raw_url.to_string(),
        source,
    };

    let url: Url = raw_url
        .parse()
        .map_err(|e| download_error(granary_client::ClientError::Url(e)))?;

    let fetch = async {
        let response = transport.get(url).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|source| granary_client::ClientError::Request {
                url: raw_url.to_string(),
                source,
            })?;
        Ok::<_, granary_client::ClientError>(bytes.to_vec())
    };

    tokio::select! {
        _ = cancel.cancelled() => Err(SyncError::Cancelled),
        result = fetch => result.map_err(download_error),
    }
}
