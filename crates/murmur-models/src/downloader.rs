//! Streaming download engine
//!
//! Bytes land in a staging file next to the install path and are only
//! renamed into place after the digest check, so a partially written file is
//! never visible at the install path.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::ArtifactDescriptor;
use crate::error::FailureReason;
use crate::registry::{staging_path, Registry};
use crate::source::{ArtifactSource, SourceStream};
use crate::verify;

/// One artifact to fetch
#[derive(Debug, Clone)]
pub struct DownloadJob {
    pub id: String,
    pub url: String,
    /// Final install path
    pub destination: PathBuf,
    /// Pinned digest; unpinned downloads record the computed one
    pub expected_digest: Option<String>,
}

impl DownloadJob {
    pub fn new(descriptor: &ArtifactDescriptor, destination: PathBuf) -> Self {
        Self {
            id: descriptor.id.clone(),
            url: descriptor.url.clone(),
            destination,
            expected_digest: descriptor.expected_digest(),
        }
    }
}

/// How a download attempt ended
#[derive(Debug, Clone, PartialEq)]
pub enum DownloadOutcome {
    Installed { path: PathBuf, digest: String },
    Failed(FailureReason),
    Cancelled,
}

/// Download engine
pub struct Downloader<S> {
    source: S,
    progress_interval: Duration,
}

impl<S> Downloader<S>
where
    S: ArtifactSource + Sync,
{
    pub fn new(source: S, progress_interval: Duration) -> Self {
        Self {
            source,
            progress_interval,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Run one attempt for `job`.
    ///
    /// Progress, completion and failure are reported through `registry`.
    /// A cancelled attempt reports nothing; the caller owns that transition.
    pub async fn run(
        &self,
        job: &DownloadJob,
        registry: &Registry,
        cancel: &CancellationToken,
    ) -> DownloadOutcome {
        info!("Downloading model {} from {}", job.id, job.url);

        let staging = staging_path(&job.destination);
        match self.fetch(job, &staging, registry, cancel).await {
            Ok(Some(digest)) => {
                registry
                    .apply_complete(&job.id, job.destination.clone(), digest.clone())
                    .await;
                DownloadOutcome::Installed {
                    path: job.destination.clone(),
                    digest,
                }
            }
            Ok(None) => {
                discard(&staging).await;
                debug!("Model {} download stopped on cancellation", job.id);
                DownloadOutcome::Cancelled
            }
            Err(reason) => {
                discard(&staging).await;
                warn!("Model {} download failed: {}", job.id, reason);
                registry.apply_failure(&job.id, reason.clone()).await;
                DownloadOutcome::Failed(reason)
            }
        }
    }

    /// Stream, verify and promote. `Ok(None)` means cancelled.
    async fn fetch(
        &self,
        job: &DownloadJob,
        staging: &Path,
        registry: &Registry,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, FailureReason> {
        if let Some(parent) = job.destination.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(FailureReason::disk)?;
        }

        let SourceStream {
            content_length,
            mut chunks,
        } = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Ok(None),
            opened = self.source.open(&job.url) => opened?,
        };

        let mut file = File::create(staging).await.map_err(FailureReason::disk)?;
        let mut received: u64 = 0;
        let mut last_report: Option<Instant> = None;

        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Ok(None),
                next = chunks.next() => match next {
                    Some(chunk) => chunk?,
                    None => break,
                },
            };

            file.write_all(&chunk).await.map_err(FailureReason::disk)?;
            received += chunk.len() as u64;

            let due = last_report.map_or(true, |at| at.elapsed() >= self.progress_interval);
            if due {
                registry.apply_progress(&job.id, received, content_length.unwrap_or(0));
                last_report = Some(Instant::now());
            }
        }

        if let Some(expected) = content_length {
            if received != expected {
                return Err(FailureReason::network(format!(
                    "stream ended after {} of {} bytes",
                    received, expected
                )));
            }
        }

        // Final counters always go out so progress reads 100 before install
        registry.apply_progress(&job.id, received, content_length.unwrap_or(received));

        file.flush().await.map_err(FailureReason::disk)?;
        file.sync_all().await.map_err(FailureReason::disk)?;
        drop(file);

        debug!("Verifying model {} checksum", job.id);
        let actual = verify::sha256_file(staging)
            .await
            .map_err(FailureReason::disk)?;
        if let Some(expected) = &job.expected_digest {
            if !verify::digests_match(expected, &actual) {
                return Err(FailureReason::ChecksumMismatch {
                    expected: expected.clone(),
                    actual,
                });
            }
        }

        if cancel.is_cancelled() {
            return Ok(None);
        }

        fs::rename(staging, &job.destination)
            .await
            .map_err(FailureReason::disk)?;

        Ok(Some(actual))
    }
}

/// Remove a staging file, tolerating its absence
pub(crate) async fn discard(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!("Removed staging file {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("Failed to remove staging file {}: {}", path.display(), e),
    }
}
