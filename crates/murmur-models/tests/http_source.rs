//! HTTP source tests against a local server.

mod common;

use futures::TryStreamExt;

use murmur_models::verify::sha256_file;
use murmur_models::{
    ArtifactSource, ArtifactStatus, Catalog, HttpSource, ModelEvent, ModelManager, ModelsConfig,
    SourceError,
};

use common::{descriptor, events_until_done, sha256_hex, static_server};

fn body() -> Vec<u8> {
    (0..200_000u32).map(|i| (i % 251) as u8).collect()
}

#[tokio::test]
async fn test_http_source_streams_body() {
    let dir = tempfile::tempdir().unwrap();
    let base = static_server::start(body());
    let source = HttpSource::new(&ModelsConfig::with_data_dir(dir.path())).unwrap();

    let stream = source
        .open(&format!("{}/model.bin", base))
        .await
        .unwrap();
    assert_eq!(stream.content_length, Some(200_000));

    let chunks: Vec<bytes::Bytes> = stream.chunks.try_collect().await.unwrap();
    let received: Vec<u8> = chunks.concat();
    assert_eq!(received, body());
}

#[tokio::test]
async fn test_http_source_rejects_error_status() {
    let dir = tempfile::tempdir().unwrap();
    let base = static_server::start(body());
    let source = HttpSource::new(&ModelsConfig::with_data_dir(dir.path())).unwrap();

    match source.open(&format!("{}/missing", base)).await {
        Err(SourceError::Status { status, url }) => {
            assert_eq!(status, 404);
            assert!(url.ends_with("/missing"));
        }
        other => panic!("expected status error, got {:?}", other.map(|_| ())),
    }
}

#[tokio::test]
async fn test_manager_downloads_over_http() {
    let dir = tempfile::tempdir().unwrap();
    let base = static_server::start(body());

    let mut model = descriptor("base-en", 200_000, Some(sha256_hex(&body())));
    model.url = format!("{}/base-en/model.bin", base);
    let mut broken = descriptor("broken", 1_000, None);
    broken.url = format!("{}/missing", base);
    let catalog = Catalog::new(vec![model, broken]).unwrap();

    let manager = ModelManager::with_catalog(common::config(dir.path()), catalog)
        .await
        .unwrap();
    let mut events = manager.subscribe();

    manager.begin_download("base-en").await.unwrap();
    let events_seen = events_until_done(&mut events, "base-en").await;
    assert!(matches!(
        events_seen.last(),
        Some(ModelEvent::Complete { .. })
    ));

    let artifact = manager.get_artifact("base-en").unwrap();
    assert_eq!(artifact.status, ArtifactStatus::Installed);
    let path = artifact.path.unwrap();
    assert_eq!(sha256_file(&path).await.unwrap(), sha256_hex(&body()));
    assert!(path.starts_with(dir.path().join("models")));

    manager.begin_download("broken").await.unwrap();
    let events_seen = events_until_done(&mut events, "broken").await;
    assert!(matches!(
        events_seen.last(),
        Some(ModelEvent::Failed { .. })
    ));
    assert!(matches!(
        manager.get_artifact("broken").unwrap().status,
        ArtifactStatus::Failed { .. }
    ));
}
