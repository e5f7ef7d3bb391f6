//! Model lifecycle manager
//!
//! Command surface for the UI layer: list, download, cancel, delete and
//! disk space queries. Each download runs as its own task; the registry's
//! check-and-set keeps every id single-flight.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::artifact::Artifact;
use crate::catalog::Catalog;
use crate::config::ModelsConfig;
use crate::disk;
use crate::downloader::{self, DownloadJob, DownloadOutcome, Downloader};
use crate::error::ModelError;
use crate::events::{EventBus, ModelEvent};
use crate::registry::{staging_path, Registry};
use crate::source::{ArtifactSource, HttpSource};

/// A spawned download attempt
struct ActiveDownload {
    attempt: u64,
    cancel: CancellationToken,
    handle: JoinHandle<DownloadOutcome>,
}

type ActiveTable = Arc<Mutex<HashMap<String, ActiveDownload>>>;

/// Model download and lifecycle manager
pub struct ModelManager<S = HttpSource> {
    registry: Arc<Registry>,
    downloader: Arc<Downloader<S>>,
    active: ActiveTable,
    next_attempt: AtomicU64,
}

impl ModelManager<HttpSource> {
    /// Manager for the built-in catalog, downloading over HTTP
    pub async fn new(config: ModelsConfig) -> Result<Self, ModelError> {
        let catalog = Catalog::builtin()?;
        Self::with_catalog(config, catalog).await
    }

    /// Manager for a custom catalog, downloading over HTTP
    pub async fn with_catalog(config: ModelsConfig, catalog: Catalog) -> Result<Self, ModelError> {
        let source = HttpSource::new(&config)?;
        Self::with_source(config, catalog, source).await
    }
}

impl<S> ModelManager<S>
where
    S: ArtifactSource + Sync + 'static,
{
    /// Manager over an arbitrary byte source
    pub async fn with_source(
        config: ModelsConfig,
        catalog: Catalog,
        source: S,
    ) -> Result<Self, ModelError> {
        fs::create_dir_all(config.models_dir()).await?;

        let events = EventBus::new(config.event_capacity);
        let registry = Registry::open(catalog, &config, events).await;

        Ok(Self {
            registry: Arc::new(registry),
            downloader: Arc::new(Downloader::new(source, config.progress_interval)),
            active: Arc::new(Mutex::new(HashMap::new())),
            next_attempt: AtomicU64::new(1),
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn source(&self) -> &S {
        self.downloader.source()
    }

    /// Snapshot of all artifacts, in catalog order
    pub fn list_artifacts(&self) -> Vec<Artifact> {
        self.registry.list_artifacts()
    }

    pub fn get_artifact(&self, id: &str) -> Result<Artifact, ModelError> {
        self.registry.get_artifact(id)
    }

    /// Observe lifecycle events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.registry.events().subscribe()
    }

    /// Path of an installed artifact
    pub fn installed_path(&self, id: &str) -> Result<PathBuf, ModelError> {
        let artifact = self.registry.get_artifact(id)?;
        match (artifact.status.is_installed(), artifact.path) {
            (true, Some(path)) => Ok(path),
            _ => Err(ModelError::NotInstalled(id.to_string())),
        }
    }

    /// Start downloading an artifact.
    ///
    /// Returns once the `Downloading` transition is on disk and the task is
    /// scheduled; the outcome is reported through events.
    pub async fn begin_download(&self, id: &str) -> Result<(), ModelError> {
        let attempt = self.next_attempt.fetch_add(1, Ordering::Relaxed);
        let cancel = CancellationToken::new();

        {
            // The transition and the registration happen under one lock, so
            // a `Downloading` artifact always has a cancellable entry
            let mut table = self.active.lock();
            let artifact = self.registry.begin(id)?;
            let job = DownloadJob::new(
                &artifact.descriptor,
                self.registry.install_path(&artifact.descriptor),
            );

            let registry = Arc::clone(&self.registry);
            let downloader = Arc::clone(&self.downloader);
            let active = Arc::clone(&self.active);
            let token = cancel.clone();

            let handle = tokio::spawn(async move {
                let outcome = downloader.run(&job, &registry, &token).await;
                if outcome == DownloadOutcome::Cancelled {
                    registry.apply_cancelled(&job.id).await;
                }

                let mut table = active.lock();
                if table.get(&job.id).is_some_and(|a| a.attempt == attempt) {
                    table.remove(&job.id);
                }
                outcome
            });
            table.insert(
                id.to_string(),
                ActiveDownload {
                    attempt,
                    cancel,
                    handle,
                },
            );
        }

        self.registry.flush().await;
        debug!("Scheduled download attempt {} for {}", attempt, id);
        Ok(())
    }

    /// Cancel a running download and wait until it has stopped writing.
    ///
    /// The artifact ends `NotInstalled` with its staging file removed. If the
    /// download finished before noticing the request, `NotDownloading` is
    /// returned and the finished state is kept.
    pub async fn cancel_download(&self, id: &str) -> Result<(), ModelError> {
        self.registry.get_artifact(id)?;

        // Entries are registered together with the `Downloading` transition
        // and removed only after the attempt's final transition
        let entry = self
            .active
            .lock()
            .remove(id)
            .ok_or_else(|| ModelError::NotDownloading(id.to_string()))?;

        entry.cancel.cancel();
        let outcome = match entry.handle.await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Download task for {} ended abnormally: {}", id, e);
                self.abandon(id).await;
                DownloadOutcome::Cancelled
            }
        };

        match outcome {
            DownloadOutcome::Cancelled => Ok(()),
            _ => Err(ModelError::NotDownloading(id.to_string())),
        }
    }

    /// Clean up after a task that died without reporting an outcome
    async fn abandon(&self, id: &str) {
        if let Some(descriptor) = self.registry.catalog().get(id) {
            let staging = staging_path(&self.registry.install_path(descriptor));
            downloader::discard(&staging).await;
        }
        self.registry.apply_cancelled(id).await;
    }

    /// Remove an installed artifact's file
    pub async fn delete_artifact(&self, id: &str) -> Result<(), ModelError> {
        let artifact = self.registry.get_artifact(id)?;
        if !artifact.status.is_installed() {
            return Err(ModelError::NotInstalled(id.to_string()));
        }

        let path = artifact
            .path
            .clone()
            .unwrap_or_else(|| self.registry.install_path(&artifact.descriptor));

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Model file {} already gone", path.display());
            }
            Err(e) => return Err(e.into()),
        }

        // Per-artifact directory; only removed once empty
        if let Some(parent) = path.parent() {
            let _ = fs::remove_dir(parent).await;
        }

        self.registry.apply_removed(id).await?;
        info!("Model {} deleted", id);
        Ok(())
    }

    /// Free bytes on the volume holding the models directory
    pub async fn free_disk_space(&self) -> Result<u64, ModelError> {
        let dir = self.registry.models_dir().to_path_buf();
        tokio::task::spawn_blocking(move || disk::free_space(&dir))
            .await
            .map_err(|e| ModelError::DiskSpace {
                path: self.registry.models_dir().to_path_buf(),
                message: e.to_string(),
            })?
    }

    /// Bytes currently used below the models directory
    pub async fn models_usage(&self) -> u64 {
        let dir = self.registry.models_dir().to_path_buf();
        tokio::task::spawn_blocking(move || disk::directory_size(&dir))
            .await
            .unwrap_or_default()
    }

    /// Ids with a download task in flight
    pub fn active_downloads(&self) -> Vec<String> {
        self.active.lock().keys().cloned().collect()
    }

    /// Cancel every running download and wait for the tasks to stop
    pub async fn shutdown(&self) {
        let entries: Vec<(String, ActiveDownload)> = self.active.lock().drain().collect();
        if entries.is_empty() {
            return;
        }

        info!("Cancelling {} running download(s)", entries.len());
        for (_, entry) in &entries {
            entry.cancel.cancel();
        }
        for (id, entry) in entries {
            if let Err(e) = entry.handle.await {
                warn!("Download task for {} ended abnormally: {}", id, e);
                self.abandon(&id).await;
            }
        }
    }
}
