//! Artifact records and install status

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::catalog::ArtifactDescriptor;
use crate::error::FailureReason;

/// Byte counters of an in-flight download.
///
/// `progress` is derived from the counters and cannot be set on its own.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "ProgressCounts")]
pub struct DownloadProgress {
    progress: f32,
    bytes_received: u64,
    bytes_total: u64,
}

#[derive(Deserialize)]
struct ProgressCounts {
    bytes_received: u64,
    bytes_total: u64,
}

impl From<ProgressCounts> for DownloadProgress {
    fn from(counts: ProgressCounts) -> Self {
        DownloadProgress::new(counts.bytes_received, counts.bytes_total)
    }
}

impl DownloadProgress {
    /// `bytes_total == 0` means the total is unknown
    pub fn new(bytes_received: u64, bytes_total: u64) -> Self {
        let progress = if bytes_total > 0 {
            ((bytes_received as f64 / bytes_total as f64) * 100.0).clamp(0.0, 100.0) as f32
        } else {
            0.0
        };

        Self {
            progress,
            bytes_received,
            bytes_total,
        }
    }

    /// Percent complete (0.0 - 100.0)
    pub fn progress(&self) -> f32 {
        self.progress
    }

    pub fn bytes_received(&self) -> u64 {
        self.bytes_received
    }

    /// Total size, 0 when unknown
    pub fn bytes_total(&self) -> u64 {
        self.bytes_total
    }
}

/// Install status of an artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ArtifactStatus {
    /// No local file
    NotInstalled,
    /// Download (or final verification) in progress
    Downloading(DownloadProgress),
    /// Verified file at the artifact path
    Installed,
    /// Last attempt failed, no usable local file
    Failed { reason: FailureReason },
}

impl ArtifactStatus {
    pub fn is_installed(&self) -> bool {
        matches!(self, ArtifactStatus::Installed)
    }

    pub fn is_downloading(&self) -> bool {
        matches!(self, ArtifactStatus::Downloading(_))
    }

    /// Short label for listings
    pub fn label(&self) -> &'static str {
        match self {
            ArtifactStatus::NotInstalled => "not installed",
            ArtifactStatus::Downloading(_) => "downloading",
            ArtifactStatus::Installed => "installed",
            ArtifactStatus::Failed { .. } => "failed",
        }
    }
}

impl std::fmt::Display for ArtifactStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactStatus::Downloading(p) => write!(f, "downloading ({:.1}%)", p.progress()),
            ArtifactStatus::Failed { reason } => write!(f, "failed ({})", reason),
            other => f.write_str(other.label()),
        }
    }
}

/// Catalog entry merged with its live status
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    #[serde(flatten)]
    pub descriptor: ArtifactDescriptor,
    /// Current status
    pub status: ArtifactStatus,
    /// Installed file, set only while `Installed`
    pub path: Option<PathBuf>,
    /// Verified SHA256 of the installed file
    pub digest: Option<String>,
}

impl Artifact {
    /// A fresh, not installed record
    pub fn new(descriptor: ArtifactDescriptor) -> Self {
        Self {
            descriptor,
            status: ArtifactStatus::NotInstalled,
            path: None,
            digest: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.descriptor.id
    }

    pub(crate) fn set_not_installed(&mut self) {
        self.status = ArtifactStatus::NotInstalled;
        self.path = None;
        self.digest = None;
    }

    pub(crate) fn set_installed(&mut self, path: PathBuf, digest: String) {
        self.status = ArtifactStatus::Installed;
        self.path = Some(path);
        self.digest = Some(digest);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_is_derived() {
        assert_eq!(DownloadProgress::new(50, 200).progress(), 25.0);
        assert_eq!(DownloadProgress::new(200, 200).progress(), 100.0);
        assert_eq!(DownloadProgress::new(300, 200).progress(), 100.0);
        assert_eq!(DownloadProgress::new(300, 0).progress(), 0.0);
    }

    #[test]
    fn test_status_serialization() {
        let status = ArtifactStatus::Downloading(DownloadProgress::new(1, 4));
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "downloading");
        assert_eq!(json["bytes_received"], 1);
        assert_eq!(json["progress"], 25.0);

        let installed = serde_json::to_value(ArtifactStatus::Installed).unwrap();
        assert_eq!(installed, serde_json::json!({ "state": "installed" }));
    }

    #[test]
    fn test_deserialized_progress_is_recomputed() {
        let json = r#"{"state":"downloading","progress":99.0,"bytes_received":10,"bytes_total":40}"#;
        let status: ArtifactStatus = serde_json::from_str(json).unwrap();
        match status {
            ArtifactStatus::Downloading(p) => assert_eq!(p.progress(), 25.0),
            other => panic!("unexpected status {:?}", other),
        }
    }
}
