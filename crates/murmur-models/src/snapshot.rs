//! On-disk registry snapshot
//!
//! The snapshot is a write-through cache of the in-memory registry. It is
//! only read once at startup to seed state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::artifact::{Artifact, ArtifactStatus};
use crate::error::ModelError;

const SNAPSHOT_VERSION: u32 = 1;

/// Persisted state of one artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub id: String,
    pub status: ArtifactStatus,
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub digest: Option<String>,
}

impl From<&Artifact> for SnapshotEntry {
    fn from(artifact: &Artifact) -> Self {
        Self {
            id: artifact.id().to_string(),
            status: artifact.status.clone(),
            path: artifact.path.clone(),
            digest: artifact.digest.clone(),
        }
    }
}

/// Registry snapshot file contents
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistrySnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub artifacts: Vec<SnapshotEntry>,
}

impl RegistrySnapshot {
    pub fn capture<'a>(artifacts: impl IntoIterator<Item = &'a Artifact>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            artifacts: artifacts.into_iter().map(SnapshotEntry::from).collect(),
        }
    }

    pub fn entry(&self, id: &str) -> Option<&SnapshotEntry> {
        self.artifacts.iter().find(|e| e.id == id)
    }

    /// Load a snapshot; `Ok(None)` when the file does not exist
    pub async fn load(path: &Path) -> Result<Option<Self>, ModelError> {
        let data = match fs::read(path).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let snapshot: RegistrySnapshot = serde_json::from_slice(&data)
            .map_err(|e| ModelError::Snapshot(format!("{}: {}", path.display(), e)))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(ModelError::Snapshot(format!(
                "unsupported snapshot version {}",
                snapshot.version
            )));
        }

        Ok(Some(snapshot))
    }

    /// Write the snapshot atomically (temp sibling, then rename)
    pub async fn save(&self, path: &Path) -> Result<(), ModelError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let data = serde_json::to_vec_pretty(self)
            .map_err(|e| ModelError::Snapshot(e.to_string()))?;

        let temp_path = path.with_extension("json.tmp");
        let mut file = fs::File::create(&temp_path).await?;
        file.write_all(&data).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp_path, path).await?;
        debug!("Registry snapshot written to {}", path.display());
        Ok(())
    }
}
