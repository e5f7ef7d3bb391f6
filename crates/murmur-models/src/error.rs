//! Model management error types

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Model management errors
#[derive(Error, Debug)]
pub enum ModelError {
    /// Unknown artifact id
    #[error("Model not found: {0}")]
    NotFound(String),

    /// Download requested for an artifact that is already installed
    #[error("Model already installed: {0}")]
    AlreadyInstalled(String),

    /// Download requested while another attempt is in flight
    #[error("Model download already in progress: {0}")]
    AlreadyInProgress(String),

    /// Cancel requested for an artifact that is not downloading
    #[error("Model is not downloading: {0}")]
    NotDownloading(String),

    /// Delete requested for an artifact that is not installed
    #[error("Model is not installed: {0}")]
    NotInstalled(String),

    /// Malformed catalog definition
    #[error("Invalid model catalog: {0}")]
    InvalidCatalog(String),

    /// Data directory error
    #[error("Failed to determine data directory: {0}")]
    DataDirectory(String),

    /// Free space could not be determined
    #[error("Failed to query disk space for {}: {message}", path.display())]
    DiskSpace {
        path: PathBuf,
        message: String,
    },

    /// Registry snapshot error
    #[error("Registry snapshot error: {0}")]
    Snapshot(String),

    /// Download source could not be set up
    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ModelError {
    /// Whether this error is a bad request against the current state.
    ///
    /// These are returned synchronously and never retried automatically.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            ModelError::NotFound(_)
                | ModelError::AlreadyInstalled(_)
                | ModelError::AlreadyInProgress(_)
                | ModelError::NotDownloading(_)
                | ModelError::NotInstalled(_)
        )
    }
}

/// Why a download attempt ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    /// Connection, HTTP status or stream error
    NetworkError { message: String },
    /// Local file system error while staging or installing
    DiskError { message: String },
    /// Downloaded content does not match the expected digest
    ChecksumMismatch { expected: String, actual: String },
}

impl FailureReason {
    pub fn network(err: impl std::fmt::Display) -> Self {
        FailureReason::NetworkError {
            message: err.to_string(),
        }
    }

    pub fn disk(err: impl std::fmt::Display) -> Self {
        FailureReason::DiskError {
            message: err.to_string(),
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureReason::NetworkError { message } => write!(f, "network error: {}", message),
            FailureReason::DiskError { message } => write!(f, "disk error: {}", message),
            FailureReason::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch: expected {}, got {}", expected, actual)
            }
        }
    }
}

/// Errors raised by an artifact source while opening or streaming
#[derive(Error, Debug)]
pub enum SourceError {
    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status
    #[error("HTTP {status} from {url}")]
    Status { status: u16, url: String },

    /// Stream interrupted
    #[error("Stream interrupted: {0}")]
    Interrupted(String),
}

impl From<SourceError> for FailureReason {
    fn from(err: SourceError) -> Self {
        FailureReason::network(err)
    }
}
