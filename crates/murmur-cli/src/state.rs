//! Application state

use std::time::Duration;

use anyhow::{Context, Result};
use murmur_models::{Catalog, ModelManager, ModelsConfig};
use tracing::debug;

use crate::cli::Cli;

/// State shared by the commands
pub struct AppState {
    /// Model manager
    pub model_manager: ModelManager,
}

impl AppState {
    pub async fn new(cli: &Cli) -> Result<Self> {
        let config = match &cli.data_dir {
            Some(dir) => ModelsConfig::with_data_dir(dir),
            None => ModelsConfig::from_project_dirs()?,
        }
        .with_connect_timeout(Duration::from_secs(cli.connect_timeout));
        debug!("Using data directory {}", config.data_dir.display());

        let catalog = match &cli.catalog {
            Some(path) => Catalog::from_json_file(path)
                .with_context(|| format!("loading catalog {}", path.display()))?,
            None => Catalog::builtin()?,
        };

        let model_manager = ModelManager::with_catalog(config, catalog)
            .await
            .context("opening model registry")?;

        Ok(Self { model_manager })
    }
}
