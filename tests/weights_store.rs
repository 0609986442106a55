//! Weights resolution against a mock mirror: search order, streamed
//! downloads, digest pinning, and auth.

use clipsieve::weights::{WeightsError, WeightsStore, WEIGHTS_TOKEN_ENV};
use mockito::Server;
use sha2::{Digest, Sha256};
use std::path::PathBuf;
use url::Url;

struct TempDirGuard {
    path: PathBuf,
}

impl TempDirGuard {
    fn new(tag: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "clipsieve-weights-{}-{}-{}",
            tag,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .unwrap()
                .subsec_nanos()
        ));
        std::fs::create_dir_all(&path).unwrap();
        Self { path }
    }
}

impl Drop for TempDirGuard {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.path);
    }
}

#[tokio::test]
async fn test_local_root_beats_mirror() {
    let dir = TempDirGuard::new("local-first");
    let local = dir.path.join("yolo11n.pt");
    std::fs::write(&local, b"local weights").unwrap();

    let mut server = Server::new_async().await;
    let mirror_mock = server
        .mock("GET", "/yolo11n.pt")
        .with_status(200)
        .with_body("mirror weights")
        .expect(0)
        .create_async()
        .await;

    let store = WeightsStore::new()
        .with_cache_dir(dir.path.join("cache"))
        .with_mirror(Url::parse(&server.url()).unwrap());
    store.ensure_root(&dir.path);

    let weights = store.resolve("yolo11n.pt").await.unwrap();
    assert_eq!(weights.path, local);
    assert_eq!(weights.size_bytes, b"local weights".len() as u64);
    mirror_mock.assert_async().await;
}

#[tokio::test]
async fn test_mirror_download_lands_in_cache() {
    let dir = TempDirGuard::new("download");
    let payload = b"fake model bytes".to_vec();
    let digest = format!("{:x}", Sha256::digest(&payload));

    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/weights/yolo11n.pt")
        .with_status(200)
        .with_body(payload.clone())
        .create_async()
        .await;

    // Mirror base without a trailing slash; the store joins with one.
    let mirror = Url::parse(&format!("{}/weights", server.url())).unwrap();
    let store = WeightsStore::new()
        .with_cache_dir(&dir.path)
        .with_mirror(mirror);

    let weights = store.resolve("yolo11n.pt").await.unwrap();
    mock.assert_async().await;

    assert_eq!(weights.path, dir.path.join("yolo11n.pt"));
    assert_eq!(weights.size_bytes, payload.len() as u64);
    assert_eq!(weights.sha256.as_deref(), Some(digest.as_str()));
    assert_eq!(std::fs::read(&weights.path).unwrap(), payload);
    // The digest sidecar makes reruns report the same checksum.
    let sidecar = std::fs::read_to_string(dir.path.join("yolo11n.pt.sha256")).unwrap();
    assert_eq!(sidecar.split_whitespace().next(), Some(digest.as_str()));
}

#[tokio::test]
async fn test_second_resolve_hits_cache_not_mirror() {
    let dir = TempDirGuard::new("cache-hit");
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/yolo11s.pt")
        .with_status(200)
        .with_body("once only")
        .expect(1)
        .create_async()
        .await;

    let store = WeightsStore::new()
        .with_cache_dir(&dir.path)
        .with_mirror(Url::parse(&server.url()).unwrap());

    let first = store.resolve("yolo11s.pt").await.unwrap();
    let second = store.resolve("yolo11s.pt").await.unwrap();
    assert_eq!(first.path, second.path);
    mock.assert_async().await;

    // A fresh store with the same cache directory resolves locally and
    // still reports the recorded digest.
    let fresh = WeightsStore::new().with_cache_dir(&dir.path);
    let local = fresh.resolve("yolo11s.pt").await.unwrap();
    assert_eq!(local.path, first.path);
    assert_eq!(local.sha256, first.sha256);
}

#[tokio::test]
async fn test_pinned_digest_mismatch_rejected() {
    let dir = TempDirGuard::new("bad-digest");
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/yolo11n.pt")
        .with_status(200)
        .with_header("x-weights-sha256", &"0".repeat(64))
        .with_body("tampered bytes")
        .create_async()
        .await;

    let store = WeightsStore::new()
        .with_cache_dir(&dir.path)
        .with_mirror(Url::parse(&server.url()).unwrap());

    let err = store.resolve("yolo11n.pt").await.unwrap_err();
    assert!(matches!(err, WeightsError::ChecksumMismatch { .. }));

    // Nothing lands in the cache, not even a partial file.
    let leftovers: Vec<_> = std::fs::read_dir(&dir.path)
        .unwrap()
        .flatten()
        .map(|e| e.file_name())
        .collect();
    assert!(leftovers.is_empty(), "leftovers: {:?}", leftovers);
}

#[tokio::test]
async fn test_mirror_error_status_reported() {
    let dir = TempDirGuard::new("status");
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/absent.pt")
        .with_status(404)
        .create_async()
        .await;

    let store = WeightsStore::new()
        .with_cache_dir(&dir.path)
        .with_mirror(Url::parse(&server.url()).unwrap());

    let err = store.resolve("absent.pt").await.unwrap_err();
    match err {
        WeightsError::Download { reason, .. } => assert!(reason.contains("404")),
        other => panic!("expected Download error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_empty_payload_rejected() {
    let dir = TempDirGuard::new("empty");
    let mut server = Server::new_async().await;
    let _mock = server
        .mock("GET", "/yolo11n.pt")
        .with_status(200)
        .with_body("")
        .create_async()
        .await;

    let store = WeightsStore::new()
        .with_cache_dir(&dir.path)
        .with_mirror(Url::parse(&server.url()).unwrap());

    let err = store.resolve("yolo11n.pt").await.unwrap_err();
    match err {
        WeightsError::Download { reason, .. } => assert!(reason.contains("empty")),
        other => panic!("expected Download error, got {:?}", other),
    }
    assert!(!dir.path.join("yolo11n.pt").exists());
}

#[tokio::test]
async fn test_mirror_token_sent_as_bearer() {
    let dir = TempDirGuard::new("token");
    std::env::set_var(WEIGHTS_TOKEN_ENV, "sesame");

    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/yolo11m.pt")
        .match_header("authorization", "Bearer sesame")
        .with_status(200)
        .with_body("token gated bytes")
        .create_async()
        .await;

    let store = WeightsStore::new()
        .with_cache_dir(&dir.path)
        .with_mirror(Url::parse(&server.url()).unwrap());

    let weights = store.resolve("yolo11m.pt").await.unwrap();
    assert_eq!(weights.size_bytes, "token gated bytes".len() as u64);
    mock.assert_async().await;

    std::env::remove_var(WEIGHTS_TOKEN_ENV);
}
