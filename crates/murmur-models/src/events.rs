//! Lifecycle events published to observers

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::artifact::DownloadProgress;
use crate::error::FailureReason;

/// Model lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ModelEvent {
    /// Bytes arrived for a download
    Progress {
        id: String,
        progress: f32,
        bytes_received: u64,
        bytes_total: u64,
    },
    /// Artifact verified and installed
    Complete { id: String },
    /// Download attempt failed
    Failed { id: String, reason: FailureReason },
}

impl ModelEvent {
    pub(crate) fn progress(id: &str, counts: &DownloadProgress) -> Self {
        ModelEvent::Progress {
            id: id.to_string(),
            progress: counts.progress(),
            bytes_received: counts.bytes_received(),
            bytes_total: counts.bytes_total(),
        }
    }

    /// Artifact the event refers to
    pub fn id(&self) -> &str {
        match self {
            ModelEvent::Progress { id, .. }
            | ModelEvent::Complete { id }
            | ModelEvent::Failed { id, .. } => id,
        }
    }

    /// Channel name for forwarding over a named-event transport
    pub fn channel_name(&self) -> &'static str {
        match self {
            ModelEvent::Progress { .. } => "model:download-progress",
            ModelEvent::Complete { .. } => "model:download-complete",
            ModelEvent::Failed { .. } => "model:download-failed",
        }
    }
}

/// Publish/subscribe fan-out of model events.
///
/// Delivery is best effort: a subscriber that falls more than the channel
/// capacity behind loses the oldest events and should re-query the registry.
/// Subscribers only receive events published after they subscribed.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ModelEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Attach a new observer
    pub fn subscribe(&self) -> broadcast::Receiver<ModelEvent> {
        self.sender.subscribe()
    }

    /// Publish an event; never blocks
    pub fn emit(&self, event: ModelEvent) {
        // Err only means nobody is listening
        let _ = self.sender.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
