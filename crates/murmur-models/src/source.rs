//! Byte sources for artifact downloads

use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::Client;
use tracing::debug;

use crate::config::ModelsConfig;
use crate::error::SourceError;

/// An opened download stream
pub struct SourceStream {
    /// Announced body length, if the source knows it
    pub content_length: Option<u64>,
    /// Body chunks in order
    pub chunks: BoxStream<'static, Result<Bytes, SourceError>>,
}

impl std::fmt::Debug for SourceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceStream")
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

/// Where artifact bytes come from
#[trait_variant::make(ArtifactSource: Send)]
pub trait LocalArtifactSource {
    /// Open a streaming read of `url`
    async fn open(&self, url: &str) -> Result<SourceStream, SourceError>;
}

/// HTTP(S) source backed by reqwest
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    pub fn new(config: &ModelsConfig) -> Result<Self, SourceError> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.connect_timeout)
            .build()?;

        Ok(Self { client })
    }
}

impl ArtifactSource for HttpSource {
    async fn open(&self, url: &str) -> Result<SourceStream, SourceError> {
        debug!("Opening {}", url);

        let response = self.client.get(url).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content_length = response.content_length();
        let chunks = response.bytes_stream().map_err(SourceError::from).boxed();

        Ok(SourceStream {
            content_length,
            chunks,
        })
    }
}
