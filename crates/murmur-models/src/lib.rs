//! Model artifact management for murmur
//!
//! This crate downloads, verifies, tracks and removes the speech and language
//! model files needed for offline operation, and publishes lifecycle events
//! for the UI.

pub mod artifact;
pub mod catalog;
pub mod config;
pub mod disk;
pub mod downloader;
pub mod error;
pub mod events;
pub mod manager;
pub mod registry;
pub mod snapshot;
pub mod source;
pub mod verify;

pub use artifact::{Artifact, ArtifactStatus, DownloadProgress};
pub use catalog::{format_size, ArtifactDescriptor, ArtifactKind, Catalog, BUILTIN_ARTIFACTS};
pub use config::ModelsConfig;
pub use error::{FailureReason, ModelError, SourceError};
pub use events::{EventBus, ModelEvent};
pub use manager::ModelManager;
pub use source::{ArtifactSource, HttpSource, SourceStream};
