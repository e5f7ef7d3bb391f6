//! Model management commands

use anyhow::{anyhow, bail, Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use murmur_models::{format_size, Artifact, ArtifactStatus, ModelError, ModelEvent};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::AppState;

/// List all catalog models
pub async fn list_models(state: &AppState, json: bool) -> Result<()> {
    let artifacts = state.model_manager.list_artifacts();

    if json {
        println!("{}", serde_json::to_string_pretty(&artifacts)?);
        return Ok(());
    }

    println!("{:<24} {:<16} {:>10}  {}", "ID", "KIND", "SIZE", "STATUS");
    for artifact in &artifacts {
        println!(
            "{:<24} {:<16} {:>10}  {}",
            artifact.id(),
            artifact.descriptor.kind.display_name(),
            artifact.descriptor.size_string(),
            artifact.status
        );
    }
    Ok(())
}

/// Show one model
pub async fn get_model_info(state: &AppState, id: &str, json: bool) -> Result<()> {
    let artifact = state.model_manager.get_artifact(id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&artifact)?);
        return Ok(());
    }

    print_artifact(&artifact);
    Ok(())
}

fn print_artifact(artifact: &Artifact) {
    let descriptor = &artifact.descriptor;
    println!("{} ({})", descriptor.name, descriptor.id);
    println!("  Kind:   {}", descriptor.kind.display_name());
    println!("  Size:   {}", descriptor.size_string());
    println!("  Source: {}", descriptor.url);
    println!("  Status: {}", artifact.status);
    if let Some(path) = &artifact.path {
        println!("  Path:   {}", path.display());
    }
    if let Some(digest) = &artifact.digest {
        println!("  SHA256: {}", digest);
    }
    if !descriptor.description.is_empty() {
        println!("  {}", descriptor.description);
    }
}

/// Download a model, rendering progress until it finishes.
///
/// Ctrl-C cancels the download and discards the partial file.
pub async fn download_model(state: &AppState, id: &str, force: bool) -> Result<()> {
    let manager = &state.model_manager;
    let artifact = manager.get_artifact(id)?;
    let needed = artifact.descriptor.size_bytes;

    match manager.free_disk_space().await {
        Ok(free) if free < needed => {
            if !force {
                bail!(
                    "not enough disk space for {}: {} needed, {} free (use --force to try anyway)",
                    id,
                    format_size(needed),
                    format_size(free)
                );
            }
            warn!("Only {} free for a {} download", format_size(free), format_size(needed));
        }
        Ok(_) => {}
        Err(e) => warn!("Could not check free disk space: {}", e),
    }

    let mut events = manager.subscribe();
    manager.begin_download(id).await?;

    let bar = ProgressBar::new(needed);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta}) {msg}")
            .context("progress template")?
            .progress_chars("=>-"),
    );
    bar.set_message(id.to_string());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        let event = tokio::select! {
            _ = &mut ctrl_c => {
                bar.abandon_with_message("cancelling");
                return cancel(state, id).await;
            }
            event = events.recv() => event,
        };

        match event {
            Ok(ModelEvent::Progress {
                id: event_id,
                bytes_received,
                bytes_total,
                ..
            }) if event_id == id => {
                if bytes_total > 0 {
                    bar.set_length(bytes_total);
                }
                bar.set_position(bytes_received);
            }
            Ok(ModelEvent::Complete { id: event_id }) if event_id == id => break,
            Ok(ModelEvent::Failed { id: event_id, reason }) if event_id == id => {
                bar.abandon_with_message("failed");
                bail!("download of {} failed: {}", id, reason);
            }
            Ok(_) => {}
            Err(RecvError::Lagged(skipped)) => {
                debug!("Skipped {} events", skipped);
                let status = manager.get_artifact(id)?.status;
                match settled(id, &status) {
                    Some(Ok(())) => break,
                    Some(Err(e)) => {
                        bar.abandon_with_message(status.label());
                        return Err(e);
                    }
                    None => {}
                }
            }
            Err(RecvError::Closed) => bail!("event stream closed during download"),
        }
    }

    bar.finish_with_message("installed");
    let path = manager.installed_path(id)?;
    println!("{} installed at {}", id, path.display());
    Ok(())
}

/// Outcome of a download judged from its status alone; `None` while it runs
fn settled(id: &str, status: &ArtifactStatus) -> Option<Result<()>> {
    match status {
        ArtifactStatus::Downloading(_) => None,
        ArtifactStatus::Installed => Some(Ok(())),
        ArtifactStatus::Failed { reason } => Some(Err(anyhow!(
            "download of {} failed: {}",
            id,
            reason
        ))),
        ArtifactStatus::NotInstalled => Some(Err(anyhow!("download of {} was cancelled", id))),
    }
}

async fn cancel(state: &AppState, id: &str) -> Result<()> {
    match state.model_manager.cancel_download(id).await {
        Ok(()) => bail!("download of {} cancelled", id),
        // Finished before the request landed
        Err(ModelError::NotDownloading(_)) => {
            let artifact = state.model_manager.get_artifact(id)?;
            match artifact.status {
                ArtifactStatus::Installed => {
                    println!("{} installed before it could be cancelled", id);
                    Ok(())
                }
                status => bail!("download of {} ended as {}", id, status),
            }
        }
        Err(e) => Err(e.into()),
    }
}

/// Delete an installed model
pub async fn delete_model(state: &AppState, id: &str) -> Result<()> {
    state.model_manager.delete_artifact(id).await?;
    println!("{} deleted", id);
    Ok(())
}

/// Show free space on the models volume and space used by models
pub async fn disk_usage(state: &AppState) -> Result<()> {
    let manager = &state.model_manager;
    let used = manager.models_usage().await;

    println!("Models directory: {}", manager.registry().models_dir().display());
    println!("  Used: {}", format_size(used));
    match manager.free_disk_space().await {
        Ok(free) => println!("  Free: {}", format_size(free)),
        Err(e) => println!("  Free: unknown ({})", e),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_models::{DownloadProgress, FailureReason};

    #[test]
    fn test_settled_after_lag() {
        let running = ArtifactStatus::Downloading(DownloadProgress::new(5, 10));
        assert!(settled("small-en", &running).is_none());
        assert!(matches!(
            settled("small-en", &ArtifactStatus::Installed),
            Some(Ok(()))
        ));

        let failed = ArtifactStatus::Failed {
            reason: FailureReason::network("reset"),
        };
        let err = settled("small-en", &failed).unwrap().unwrap_err();
        assert!(err.to_string().contains("failed"));

        // Cancelled elsewhere while this subscriber lagged
        let err = settled("small-en", &ArtifactStatus::NotInstalled)
            .unwrap()
            .unwrap_err();
        assert!(err.to_string().contains("cancelled"));
    }
}
