//! Offline downloader scenarios against in-process CDNs
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use async_trait::async_trait;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::Router;
use hls_offline::manifest::{bundle_version, rewrite_for_offline, segment_references};
use hls_offline::{
    DownloadError, DownloadProgress, FsBundleStore, HlsOfflineDownloader, HttpFetcher, RetryConfig,
    SegmentFetcher,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

const MANIFEST_PATH: &str = "trainers/t1/videocourses/v1/hls/playlist.m3u8";
const HLS_DIR: &str = "trainers/t1/videocourses/v1/hls";
const SOURCE_URL: &str = "https://app.example.com/videos/v1";

fn manifest_with(segment_count: usize) -> String {
    let mut manifest = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
    for i in 0..segment_count {
        manifest.push_str("#EXTINF:6.0,\n");
        manifest.push_str(&format!("segment-{:03}.ts\n", i));
    }
    manifest.push_str("#EXT-X-ENDLIST\n");
    manifest
}

/// Serves files from a map, tracking concurrency and per-path attempts
#[derive(Default)]
struct FakeCdn {
    files: HashMap<String, Vec<u8>>,
    always_missing: Vec<String>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    attempts: Mutex<HashMap<String, usize>>,
}

impl FakeCdn {
    fn with_bundle(segment_count: usize) -> Self {
        let mut files = HashMap::new();
        files.insert(MANIFEST_PATH.to_string(), manifest_with(segment_count).into_bytes());
        for i in 0..segment_count {
            files.insert(
                format!("{}/segment-{:03}.ts", HLS_DIR, i),
                vec![i as u8; 188 * (i + 1)],
            );
        }
        Self {
            files,
            ..Default::default()
        }
    }

    fn attempts_for(&self, path: &str) -> usize {
        self.attempts.lock().unwrap().get(path).copied().unwrap_or(0)
    }
}

#[async_trait]
impl SegmentFetcher for FakeCdn {
    async fn fetch(&self, path: &str) -> hls_offline::Result<Vec<u8>> {
        *self.attempts.lock().unwrap().entry(path.to_string()).or_insert(0) += 1;

        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.always_missing.iter().any(|p| p == path) {
            return Err(DownloadError::Status {
                url: path.to_string(),
                status: 404,
            });
        }
        self.files.get(path).cloned().ok_or(DownloadError::Status {
            url: path.to_string(),
            status: 404,
        })
    }

    fn resolve_url(&self, path: &str) -> hls_offline::Result<String> {
        Ok(format!("https://cdn.test/{}", path))
    }
}

fn downloader_for(cdn: Arc<FakeCdn>) -> HlsOfflineDownloader {
    HlsOfflineDownloader::new(cdn).with_retry(RetryConfig::immediate())
}

#[tokio::test]
async fn test_concurrency_bounded_at_five() {
    let cdn = Arc::new(FakeCdn::with_bundle(23));
    let downloader = downloader_for(Arc::clone(&cdn));

    let mut progress = Vec::new();
    let bundle = downloader
        .download_bundle(MANIFEST_PATH, SOURCE_URL, |p| progress.push(p))
        .await
        .expect("bundle");

    assert_eq!(bundle.segments.len(), 23);
    let peak = cdn.peak_in_flight.load(Ordering::SeqCst);
    assert!(peak <= 5, "peak in-flight was {}", peak);
    assert!(peak > 1, "downloads never overlapped");

    // Manifest first, then one report per segment
    assert_eq!(progress.len(), 24);
    assert_eq!(progress[0], DownloadProgress { completed: 1, total: 24 });
    assert_eq!(progress[23], DownloadProgress { completed: 24, total: 24 });
    assert!(progress.windows(2).all(|w| w[1].completed == w[0].completed + 1));
}

#[tokio::test]
async fn test_segment_failing_every_attempt_yields_no_bundle() {
    let failing = format!("{}/segment-004.ts", HLS_DIR);
    let mut cdn = FakeCdn::with_bundle(8);
    cdn.always_missing.push(failing.clone());
    let cdn = Arc::new(cdn);
    let downloader = downloader_for(Arc::clone(&cdn));

    let store_dir = TempDir::new().unwrap();
    let store = FsBundleStore::new(store_dir.path());

    let result = downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await;
    assert!(result.is_none());
    assert_eq!(cdn.attempts_for(&failing), 5);

    if let Some(bundle) = result {
        store.save(&bundle).await.unwrap();
    }
    assert!(store.load("v1").await.unwrap().is_none());
    assert_eq!(std::fs::read_dir(store_dir.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    struct Flaky {
        inner: FakeCdn,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl SegmentFetcher for Flaky {
        async fn fetch(&self, path: &str) -> hls_offline::Result<Vec<u8>> {
            if path.ends_with("segment-002.ts")
                && self
                    .failures_left
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                    .is_ok()
            {
                return Err(DownloadError::Network("connection reset".to_string()));
            }
            self.inner.fetch(path).await
        }

        fn resolve_url(&self, path: &str) -> hls_offline::Result<String> {
            self.inner.resolve_url(path)
        }
    }

    let flaky = Arc::new(Flaky {
        inner: FakeCdn::with_bundle(4),
        failures_left: AtomicUsize::new(3),
    });
    let downloader = HlsOfflineDownloader::new(flaky).with_retry(RetryConfig::immediate());

    let bundle = downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await;
    assert_eq!(bundle.map(|b| b.segments.len()), Some(4));
}

#[tokio::test]
async fn test_every_reference_has_exactly_one_key() {
    let cdn = Arc::new(FakeCdn::with_bundle(7));
    let bundle = downloader_for(cdn)
        .download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {})
        .await
        .expect("bundle");

    let references = segment_references(&bundle.manifest);
    assert_eq!(references.len(), 7);
    assert_eq!(bundle.segments.len(), 7);
    for reference in references {
        assert!(!reference.contains('/'));
        assert!(bundle.segments.contains_key(reference));
    }
    assert_eq!(bundle.segments["segment-003.ts"].len(), 188 * 4);
    assert_eq!(bundle.video_id, "v1");
    assert_eq!(bundle.source_video_url, SOURCE_URL);
}

#[tokio::test]
async fn test_manifest_without_segments_never_succeeds() {
    let mut cdn = FakeCdn::with_bundle(0);
    cdn.files.insert(MANIFEST_PATH.to_string(), b"#EXTM3U\n#EXT-X-ENDLIST\n".to_vec());
    let cdn = Arc::new(cdn);

    let downloader = downloader_for(Arc::clone(&cdn));
    assert!(downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await.is_none());
    assert!(downloader.remote_version(MANIFEST_PATH).await.is_none());
}

#[tokio::test]
async fn test_reference_without_file_name_never_succeeds() {
    let mut cdn = FakeCdn::with_bundle(1);
    cdn.files.insert(
        MANIFEST_PATH.to_string(),
        b"#EXTM3U\n#EXTINF:6.0,\nsegment-000.ts\n#EXTINF:6.0,\n?sig=abc\n#EXT-X-ENDLIST\n".to_vec(),
    );
    // The directory itself answers, so only manifest validation can reject it
    cdn.files.insert(format!("{}/", HLS_DIR), b"<html>index</html>".to_vec());
    let cdn = Arc::new(cdn);

    let downloader = downloader_for(Arc::clone(&cdn));
    assert!(downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await.is_none());
    assert!(downloader.remote_version(MANIFEST_PATH).await.is_none());
    assert_eq!(cdn.attempts_for(&format!("{}/", HLS_DIR)), 0);
}

#[tokio::test]
async fn test_version_is_deterministic_across_downloads() {
    let cdn = Arc::new(FakeCdn::with_bundle(3));
    let downloader = downloader_for(cdn);

    let first = downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await.unwrap();
    let second = downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await.unwrap();

    assert_eq!(first.version, second.version);
    assert_eq!(first.version, bundle_version(&rewrite_for_offline(&manifest_with(3))));
    assert_eq!(first.version.len(), 16);
}

#[tokio::test]
async fn test_saved_bundle_tracks_remote_version() {
    let cdn = Arc::new(FakeCdn::with_bundle(2));
    let downloader = downloader_for(cdn);
    let store_dir = TempDir::new().unwrap();
    let store = FsBundleStore::new(store_dir.path());

    let bundle = downloader.download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {}).await.unwrap();
    store.save(&bundle).await.unwrap();

    let remote = downloader.remote_version(MANIFEST_PATH).await.unwrap();
    assert!(store.is_current("v1", &remote).await.unwrap());
}

// HTTP

type CdnFiles = Arc<HashMap<String, Vec<u8>>>;

async fn serve_file(
    State(files): State<CdnFiles>,
    Path(path): Path<String>,
) -> Result<Vec<u8>, StatusCode> {
    files.get(&path).cloned().ok_or(StatusCode::NOT_FOUND)
}

async fn start_cdn(files: HashMap<String, Vec<u8>>) -> String {
    let app = Router::new()
        .route("/cdn/*path", get(serve_file))
        .with_state(Arc::new(files));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}/cdn", addr)
}

#[tokio::test]
async fn test_http_download_end_to_end() {
    let cdn = FakeCdn::with_bundle(6);
    let base_url = start_cdn(cdn.files.clone()).await;

    let fetcher = HttpFetcher::new(base_url).unwrap().with_token("header.payload.sig");
    let downloader = HlsOfflineDownloader::new(Arc::new(fetcher)).with_retry(RetryConfig::immediate());

    let bundle = downloader
        .download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {})
        .await
        .expect("bundle over HTTP");
    assert_eq!(bundle.segments.len(), 6);
}

#[tokio::test]
async fn test_http_404_segment_yields_no_bundle() {
    let mut cdn = FakeCdn::with_bundle(6);
    cdn.files.remove(&format!("{}/segment-004.ts", HLS_DIR));
    let base_url = start_cdn(cdn.files.clone()).await;

    let downloader = HlsOfflineDownloader::new(Arc::new(HttpFetcher::new(base_url).unwrap()))
        .with_retry(RetryConfig::immediate());

    assert!(downloader
        .download_bundle(MANIFEST_PATH, SOURCE_URL, |_| {})
        .await
        .is_none());
}
