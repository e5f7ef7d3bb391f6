//! Storage layout and tunables for the model manager

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;

use crate::error::ModelError;

const SNAPSHOT_FILE: &str = "registry.json";
const MODELS_DIR: &str = "models";

/// Model manager configuration
#[derive(Debug, Clone)]
pub struct ModelsConfig {
    /// Application data directory
    pub data_dir: PathBuf,
    /// Minimum delay between two progress reports of one download
    pub progress_interval: Duration,
    /// User agent sent with download requests
    pub user_agent: String,
    /// TCP connect timeout for download requests
    pub connect_timeout: Duration,
    /// Buffered events per subscriber before it starts lagging
    pub event_capacity: usize,
    /// Re-digest installed files while reconciling at startup
    pub verify_on_startup: bool,
}

impl ModelsConfig {
    /// Configuration rooted in the platform data directory
    pub fn from_project_dirs() -> Result<Self, ModelError> {
        let dirs = ProjectDirs::from("com", "murmur", "Murmur").ok_or_else(|| {
            ModelError::DataDirectory("Could not determine home directory".to_string())
        })?;

        Ok(Self::with_data_dir(dirs.data_dir()))
    }

    /// Configuration rooted in a custom data directory
    pub fn with_data_dir(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
            progress_interval: Duration::from_millis(250),
            user_agent: concat!("murmur/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout: Duration::from_secs(30),
            event_capacity: 256,
            verify_on_startup: false,
        }
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_verify_on_startup(mut self, verify: bool) -> Self {
        self.verify_on_startup = verify;
        self
    }

    /// Directory holding installed artifacts
    pub fn models_dir(&self) -> PathBuf {
        self.data_dir.join(MODELS_DIR)
    }

    /// Registry snapshot file
    pub fn snapshot_path(&self) -> PathBuf {
        self.data_dir.join(SNAPSHOT_FILE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let config = ModelsConfig::with_data_dir("/tmp/murmur");
        assert_eq!(config.models_dir(), PathBuf::from("/tmp/murmur/models"));
        assert_eq!(config.snapshot_path(), PathBuf::from("/tmp/murmur/registry.json"));
        assert!(config.user_agent.starts_with("murmur/"));
    }

    #[test]
    fn test_event_capacity_floor() {
        let config = ModelsConfig::with_data_dir("/tmp/murmur").with_event_capacity(0);
        assert_eq!(config.event_capacity, 1);
    }
}
