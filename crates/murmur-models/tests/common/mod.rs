//! Shared helpers for model manager integration tests.

#![allow(dead_code)]

pub mod static_server;

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::broadcast;

use murmur_models::{
    ArtifactDescriptor, ArtifactKind, ArtifactSource, Catalog, ModelEvent, ModelManager,
    ModelsConfig, SourceError, SourceStream,
};

const WAIT: Duration = Duration::from_secs(5);

/// Source whose streams are fed by the test, one feed per `open`
pub struct FakeSource {
    content_length: Option<u64>,
    opens: AtomicUsize,
    feeds: Mutex<Vec<Feed>>,
}

impl FakeSource {
    pub fn new(content_length: Option<u64>) -> Self {
        Self {
            content_length,
            opens: AtomicUsize::new(0),
            feeds: Mutex::new(Vec::new()),
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Feed of the `index`-th opened stream, waiting for it to be opened
    pub async fn feed(&self, index: usize) -> Feed {
        let poll = async {
            loop {
                if let Some(feed) = self.feeds.lock().get(index).cloned() {
                    return feed;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        tokio::time::timeout(WAIT, poll)
            .await
            .expect("stream was never opened")
    }
}

impl ArtifactSource for FakeSource {
    async fn open(&self, _url: &str) -> Result<SourceStream, SourceError> {
        let (tx, rx) = unbounded();
        self.feeds.lock().push(Feed { tx });
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(SourceStream {
            content_length: self.content_length,
            chunks: rx.boxed(),
        })
    }
}

/// Test side of one fake stream
#[derive(Clone)]
pub struct Feed {
    tx: UnboundedSender<Result<Bytes, SourceError>>,
}

impl Feed {
    pub fn send(&self, data: &[u8]) {
        self.tx
            .unbounded_send(Ok(Bytes::copy_from_slice(data)))
            .expect("stream receiver dropped");
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .tx
            .unbounded_send(Err(SourceError::Interrupted(message.to_string())));
    }

    /// End the stream
    pub fn finish(&self) {
        self.tx.close_channel();
    }
}

pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

pub fn descriptor(id: &str, size_bytes: u64, sha256: Option<String>) -> ArtifactDescriptor {
    ArtifactDescriptor {
        id: id.to_string(),
        name: id.to_string(),
        kind: ArtifactKind::SpeechModel,
        filename: "model.bin".to_string(),
        url: format!("https://models.example.com/{}/model.bin", id),
        size_bytes,
        sha256,
        description: String::new(),
    }
}

pub fn config(dir: &Path) -> ModelsConfig {
    ModelsConfig::with_data_dir(dir).with_progress_interval(Duration::ZERO)
}

pub async fn manager(
    dir: &Path,
    descriptors: Vec<ArtifactDescriptor>,
    source: FakeSource,
) -> ModelManager<FakeSource> {
    let catalog = Catalog::new(descriptors).unwrap();
    ModelManager::with_source(config(dir), catalog, source)
        .await
        .unwrap()
}

pub async fn next_event(rx: &mut broadcast::Receiver<ModelEvent>) -> ModelEvent {
    tokio::time::timeout(WAIT, rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("event channel closed")
}

/// Collect events for `id` up to and including its complete/failed event
pub async fn events_until_done(
    rx: &mut broadcast::Receiver<ModelEvent>,
    id: &str,
) -> Vec<ModelEvent> {
    let mut events = Vec::new();
    loop {
        let event = next_event(rx).await;
        if event.id() != id {
            continue;
        }
        let done = !matches!(event, ModelEvent::Progress { .. });
        events.push(event);
        if done {
            return events;
        }
    }
}

/// Staging files left anywhere below `dir`
pub fn staging_files(dir: &Path) -> Vec<std::path::PathBuf> {
    walkdir::WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".part"))
        .map(|e| e.into_path())
        .collect()
}
