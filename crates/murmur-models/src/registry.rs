//! Live registry of artifact status
//!
//! The registry is the single owner of every artifact's status. All reads and
//! writes go through one map lock that is held for a single map operation and
//! never across I/O. Every transition bumps a generation counter; one
//! persister task writes the newest state to the snapshot file. Status
//! changes wait until a snapshot containing them is on disk, progress updates
//! do not.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::fs;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::artifact::{Artifact, ArtifactStatus, DownloadProgress};
use crate::catalog::{ArtifactDescriptor, Catalog};
use crate::config::ModelsConfig;
use crate::error::{FailureReason, ModelError};
use crate::events::{EventBus, ModelEvent};
use crate::snapshot::{RegistrySnapshot, SnapshotEntry};
use crate::verify;

const STAGING_SUFFIX: &str = ".part";

type ArtifactMap = Arc<Mutex<HashMap<String, Artifact>>>;

/// Where an artifact is installed below `models_dir`
pub fn install_path(models_dir: &Path, descriptor: &ArtifactDescriptor) -> PathBuf {
    models_dir
        .join(descriptor.kind.subdirectory())
        .join(&descriptor.id)
        .join(&descriptor.filename)
}

/// Sibling file receiving bytes before verification
pub fn staging_path(install_path: &Path) -> PathBuf {
    let mut name = install_path
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(STAGING_SUFFIX);
    install_path.with_file_name(name)
}

/// Artifact registry
pub struct Registry {
    catalog: Catalog,
    models_dir: PathBuf,
    artifacts: ArtifactMap,
    /// Generation of the newest in-memory state, bumped under the map lock
    dirty: watch::Sender<u64>,
    /// Generation of the newest state written by the persister
    written: watch::Receiver<u64>,
    events: EventBus,
}

impl Registry {
    /// Seed the registry from the catalog and the persisted snapshot.
    ///
    /// An unreadable snapshot is ignored; state then comes from the catalog
    /// and the files found on disk. Must be called inside a tokio runtime.
    pub async fn open(catalog: Catalog, config: &ModelsConfig, events: EventBus) -> Self {
        let models_dir = config.models_dir();
        let snapshot_path = config.snapshot_path();

        let snapshot = match RegistrySnapshot::load(&snapshot_path).await {
            Ok(snapshot) => snapshot,
            Err(e) => {
                warn!("Ignoring unreadable registry snapshot: {}", e);
                None
            }
        };

        if let Some(snapshot) = &snapshot {
            for entry in &snapshot.artifacts {
                if catalog.get(&entry.id).is_none() {
                    warn!("Dropping unknown model {} from registry snapshot", entry.id);
                }
            }
        }

        let mut artifacts = HashMap::new();
        for descriptor in catalog.list() {
            let entry = snapshot.as_ref().and_then(|s| s.entry(&descriptor.id));
            let install = install_path(&models_dir, descriptor);
            let artifact = reconcile(descriptor, entry, &install, config.verify_on_startup).await;
            artifacts.insert(descriptor.id.clone(), artifact);
        }

        let artifacts: ArtifactMap = Arc::new(Mutex::new(artifacts));
        let (dirty, dirty_rx) = watch::channel(0);
        let (written_tx, written) = watch::channel(0);

        let order = catalog.list().iter().map(|d| d.id.clone()).collect();
        tokio::spawn(run_persister(
            Arc::clone(&artifacts),
            order,
            snapshot_path,
            dirty_rx,
            written_tx,
        ));

        let registry = Self {
            catalog,
            models_dir,
            artifacts,
            dirty,
            written,
            events,
        };

        // The reconciled state is written once
        {
            let _artifacts = registry.artifacts.lock();
            registry.mark_dirty();
        }
        registry.flush().await;
        registry
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    /// Install location of a catalog artifact
    pub fn install_path(&self, descriptor: &ArtifactDescriptor) -> PathBuf {
        install_path(&self.models_dir, descriptor)
    }

    /// All artifacts in catalog order
    pub fn list_artifacts(&self) -> Vec<Artifact> {
        let artifacts = self.artifacts.lock();
        self.catalog
            .list()
            .iter()
            .filter_map(|d| artifacts.get(&d.id).cloned())
            .collect()
    }

    pub fn get_artifact(&self, id: &str) -> Result<Artifact, ModelError> {
        self.artifacts
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| ModelError::NotFound(id.to_string()))
    }

    /// Atomically move an artifact into `Downloading` and wait until the
    /// transition is on disk.
    pub async fn try_begin(&self, id: &str) -> Result<Artifact, ModelError> {
        let artifact = self.begin(id)?;
        self.flush().await;
        Ok(artifact)
    }

    /// Atomically move an artifact into `Downloading` without waiting for
    /// persistence; follow with [`Registry::flush`].
    ///
    /// Fails if it is installed or already downloading, so at most one
    /// attempt per id is ever started.
    pub fn begin(&self, id: &str) -> Result<Artifact, ModelError> {
        let mut artifacts = self.artifacts.lock();
        let artifact = artifacts
            .get_mut(id)
            .ok_or_else(|| ModelError::NotFound(id.to_string()))?;

        match artifact.status {
            ArtifactStatus::Installed => return Err(ModelError::AlreadyInstalled(id.to_string())),
            ArtifactStatus::Downloading(_) => {
                return Err(ModelError::AlreadyInProgress(id.to_string()))
            }
            ArtifactStatus::NotInstalled | ArtifactStatus::Failed { .. } => {}
        }

        let counts = DownloadProgress::new(0, artifact.descriptor.size_bytes);
        artifact.set_not_installed();
        artifact.status = ArtifactStatus::Downloading(counts);
        self.events.emit(ModelEvent::progress(id, &counts));
        let artifact = artifact.clone();
        self.mark_dirty();
        Ok(artifact)
    }

    /// Record bytes received by the running attempt.
    ///
    /// The persister writes it in the background; the caller never waits
    /// for disk.
    pub fn apply_progress(&self, id: &str, bytes_received: u64, bytes_total: u64) {
        self.update_downloading(id, |artifact| {
            let counts = DownloadProgress::new(bytes_received, bytes_total);
            artifact.status = ArtifactStatus::Downloading(counts);
            Some(ModelEvent::progress(id, &counts))
        });
    }

    /// Record a verified install
    pub async fn apply_complete(&self, id: &str, path: PathBuf, digest: String) {
        let applied = self.update_downloading(id, |artifact| {
            artifact.set_installed(path, digest);
            Some(ModelEvent::Complete { id: id.to_string() })
        });
        if applied {
            info!("Model {} installed", id);
            self.flush().await;
        }
    }

    /// Record a failed attempt
    pub async fn apply_failure(&self, id: &str, reason: FailureReason) {
        let applied = self.update_downloading(id, |artifact| {
            artifact.set_not_installed();
            artifact.status = ArtifactStatus::Failed {
                reason: reason.clone(),
            };
            Some(ModelEvent::Failed {
                id: id.to_string(),
                reason,
            })
        });
        if applied {
            self.flush().await;
        }
    }

    /// Record an acknowledged cancellation; publishes nothing
    pub async fn apply_cancelled(&self, id: &str) {
        let applied = self.update_downloading(id, |artifact| {
            artifact.set_not_installed();
            None
        });
        if applied {
            info!("Model {} download cancelled", id);
            self.flush().await;
        }
    }

    /// Record that an installed artifact's file was removed
    pub async fn apply_removed(&self, id: &str) -> Result<(), ModelError> {
        {
            let mut artifacts = self.artifacts.lock();
            let artifact = artifacts
                .get_mut(id)
                .ok_or_else(|| ModelError::NotFound(id.to_string()))?;
            if !artifact.status.is_installed() {
                return Err(ModelError::NotInstalled(id.to_string()));
            }
            artifact.set_not_installed();
            self.mark_dirty();
        }

        self.flush().await;
        Ok(())
    }

    /// Wait until every transition made so far is written to the snapshot
    pub async fn flush(&self) {
        let target = *self.dirty.borrow();
        let mut written = self.written.clone();
        if written.wait_for(|generation| *generation >= target).await.is_err() {
            warn!("Registry persister stopped before generation {}", target);
        }
    }

    fn update_downloading<F>(&self, id: &str, apply: F) -> bool
    where
        F: FnOnce(&mut Artifact) -> Option<ModelEvent>,
    {
        let mut artifacts = self.artifacts.lock();
        match artifacts.get_mut(id) {
            Some(artifact) if artifact.status.is_downloading() => {
                // Publish under the lock so per-id event order matches transitions
                if let Some(event) = apply(artifact) {
                    self.events.emit(event);
                }
                self.mark_dirty();
                true
            }
            _ => {
                debug!("Ignoring transition for {}: not downloading", id);
                false
            }
        }
    }

    /// Must be called with the map lock held
    fn mark_dirty(&self) {
        self.dirty.send_modify(|generation| *generation += 1);
    }
}

/// Writes the newest registry state whenever it changes.
///
/// Changes made while a write is in flight are coalesced into the next
/// write. Exits once the registry is dropped and its last change is written.
async fn run_persister(
    artifacts: ArtifactMap,
    order: Vec<String>,
    snapshot_path: PathBuf,
    mut dirty: watch::Receiver<u64>,
    written: watch::Sender<u64>,
) {
    while dirty.changed().await.is_ok() {
        let (generation, snapshot) = {
            let artifacts = artifacts.lock();
            let generation = *dirty.borrow_and_update();
            let snapshot =
                RegistrySnapshot::capture(order.iter().filter_map(|id| artifacts.get(id)));
            (generation, snapshot)
        };

        // Memory stays authoritative; the next change retries the write
        if let Err(e) = snapshot.save(&snapshot_path).await {
            warn!("Failed to persist registry snapshot: {}", e);
        }
        written.send_replace(generation);
    }
    debug!("Registry persister stopped");
}

async fn reconcile(
    descriptor: &ArtifactDescriptor,
    entry: Option<&SnapshotEntry>,
    install: &Path,
    verify_on_startup: bool,
) -> Artifact {
    let mut artifact = Artifact::new(descriptor.clone());

    // Downloads are not resumed, so any staged bytes are garbage
    let staging = staging_path(install);
    match fs::remove_file(&staging).await {
        Ok(()) => info!("Removed stale staging file {}", staging.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove {}: {}", staging.display(), e),
    }

    let previous = entry.map(|e| &e.status);

    if !fs::try_exists(install).await.unwrap_or(false) {
        if matches!(previous, Some(status) if !matches!(status, ArtifactStatus::NotInstalled)) {
            info!("Resetting model {} to not installed", descriptor.id);
        }
        return artifact;
    }

    let pinned = descriptor.expected_digest();
    let recorded = entry
        .filter(|e| e.status.is_installed())
        .and_then(|e| e.digest.clone());

    if let Some(recorded) = &recorded {
        let agrees_with_pin = pinned
            .as_deref()
            .map_or(true, |p| verify::digests_match(p, recorded));
        if agrees_with_pin && !verify_on_startup {
            artifact.set_installed(install.to_path_buf(), recorded.to_ascii_lowercase());
            return artifact;
        }
    }

    // Unrecorded file: crash between promotion and persist, or placed by hand
    let expected = pinned.or(recorded);
    match verify::sha256_file(install).await {
        Ok(actual) => match expected {
            Some(expected) if !verify::digests_match(&expected, &actual) => {
                warn!(
                    "Model {} at {} does not match expected digest, ignoring it",
                    descriptor.id,
                    install.display()
                );
            }
            _ => {
                info!("Adopted installed model {}", descriptor.id);
                artifact.set_installed(install.to_path_buf(), actual);
            }
        },
        Err(e) => warn!("Failed to verify {}: {}", install.display(), e),
    }

    artifact
}
