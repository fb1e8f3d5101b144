//! Upload to offline playback: a queued job is transcoded into storage, a
//! signed token is minted for the result, and the offline downloader pulls
//! the whole bundle through a token-checking storage front
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
use coursecast_types::{Event, EventType, TranscodingStatus, Video};
use hls_offline::{DownloadError, FsBundleStore, HlsOfflineDownloader, RetryConfig, SegmentFetcher};
use job_queue_client::{InMemoryJobQueue, JobQueue};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::watch;
use transcoding_worker::transcoder::{ProbeInfo, Result as TranscodeResult, Transcoder};
use transcoding_worker::{
    InMemoryVideoRepository, LocalStorage, StorageGateway, TranscodingWorker, VideoProcessor,
    VideoRepository,
};
use video_access::VideoAccessService;

const SECRET: &str = "e2e-secret-0123456789-abcdefghijklmnop";
const SEGMENTS: usize = 9;

/// Writes a fixed bundle instead of encoding
struct StubTranscoder;

#[async_trait]
impl Transcoder for StubTranscoder {
    async fn probe(&self, _input: &Path) -> TranscodeResult<ProbeInfo> {
        Ok(ProbeInfo {
            width: 1280,
            height: 720,
            duration_sec: Some(54),
        })
    }

    async fn transcode_to_hls(&self, _input: &Path, out_dir: &Path, _height: u32) -> TranscodeResult<()> {
        tokio::fs::create_dir_all(out_dir).await?;
        let mut playlist = String::from("#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n");
        for i in 0..SEGMENTS {
            let name = format!("segment-{:03}.ts", i);
            tokio::fs::write(out_dir.join(&name), vec![0x47; 188 * (i + 1)]).await?;
            playlist.push_str(&format!("#EXTINF:6.000000,\n{}\n", name));
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        tokio::fs::write(out_dir.join("playlist.m3u8"), playlist).await?;
        Ok(())
    }

    async fn extract_thumbnail(&self, _input: &Path, output: &Path) -> TranscodeResult<()> {
        tokio::fs::write(output, b"\xFF\xD8\xFF\xE0").await?;
        Ok(())
    }
}

/// Serves bundle files from storage only to holders of a valid token for
/// the video
struct GatedStorage {
    storage: Arc<LocalStorage>,
    access: VideoAccessService,
    video_id: String,
    token: String,
}

#[async_trait]
impl SegmentFetcher for GatedStorage {
    async fn fetch(&self, path: &str) -> hls_offline::Result<Vec<u8>> {
        if self
            .access
            .verify_token_for_video(&self.token, &self.video_id)
            .is_none()
        {
            return Err(DownloadError::Status {
                url: path.to_string(),
                status: 403,
            });
        }
        self.storage
            .download(path)
            .await
            .map_err(|_| DownloadError::Status {
                url: path.to_string(),
                status: 404,
            })
    }

    fn resolve_url(&self, path: &str) -> hls_offline::Result<String> {
        Ok(format!("https://cdn.coursecast.test/{}", path))
    }
}

struct Pipeline {
    _storage_dir: TempDir,
    _work_dir: TempDir,
    storage: Arc<LocalStorage>,
    repository: Arc<InMemoryVideoRepository>,
}

/// Upload, enqueue and transcode one video; returns its final row
async fn transcode(video_id: &str, trainer_id: &str) -> (Pipeline, Video) {
    let storage_dir = TempDir::new().unwrap();
    let work_dir = TempDir::new().unwrap();
    let storage = Arc::new(LocalStorage::new(storage_dir.path()));
    let repository = Arc::new(InMemoryVideoRepository::new());

    let original_path = format!("uploads/{}/raw.mp4", video_id);
    storage
        .upload_buffer(b"raw upload bytes".to_vec(), &original_path, "video/mp4")
        .await
        .unwrap();
    repository
        .register(&Video::new_pending(
            video_id,
            trainer_id,
            original_path.clone(),
            "video/mp4",
            16,
        ))
        .await
        .unwrap();

    let queue = Arc::new(InMemoryJobQueue::new(3));
    let job = coursecast_types::TranscodingJobPayload {
        video_id: video_id.to_string(),
        trainer_id: trainer_id.to_string(),
        original_path,
    };
    queue
        .publish(&Event::transcoding_job("e2e", &job).unwrap())
        .await
        .unwrap();
    queue.close();

    let processor = VideoProcessor::new(
        storage.clone(),
        repository.clone(),
        Arc::new(StubTranscoder),
        work_dir.path(),
    );
    let worker = TranscodingWorker::new(queue.clone(), processor, repository.clone());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    worker.run(shutdown_rx).await.unwrap();

    assert_eq!(queue.published_of(EventType::VideoTranscoded).len(), 1);

    let video = repository.get(video_id).await.unwrap().unwrap();
    (
        Pipeline {
            _storage_dir: storage_dir,
            _work_dir: work_dir,
            storage,
            repository,
        },
        video,
    )
}

#[tokio::test]
async fn test_upload_to_offline_playback() {
    let (pipeline, video) = transcode("v1", "t1").await;
    assert_eq!(video.transcoding_status, TranscodingStatus::Completed);
    assert!(video.relative_path.is_none());
    let manifest_path = video.hls_manifest_path.clone().unwrap();
    assert_eq!(manifest_path, "trainers/t1/videocourses/v1/hls/playlist.m3u8");

    // Player asks for a signed URL to the manifest
    let access = VideoAccessService::new(SECRET).unwrap();
    let signed = access
        .generate_signed_url(
            &format!("https://cdn.coursecast.test/{}", manifest_path),
            &video.id,
            "student-7",
            30,
        )
        .unwrap();
    let grant = access.verify_signed_url(&signed).unwrap();
    assert_eq!(grant.video_id, "v1");
    assert_eq!(grant.user_id, "student-7");

    let token = access.generate_token(&video.id, "student-7", 30).unwrap();
    let fetcher = GatedStorage {
        storage: pipeline.storage.clone(),
        access: access.clone(),
        video_id: video.id.clone(),
        token,
    };
    let downloader = HlsOfflineDownloader::new(Arc::new(fetcher)).with_retry(RetryConfig::immediate());

    let mut last_progress = None;
    let bundle = downloader
        .download_bundle(&manifest_path, &signed, |p| last_progress = Some(p))
        .await
        .expect("offline bundle");

    assert_eq!(bundle.video_id, "v1");
    assert_eq!(bundle.segments.len(), SEGMENTS);
    assert_eq!(last_progress.map(|p| (p.completed, p.total)), Some((SEGMENTS + 1, SEGMENTS + 1)));

    // Bundle size recorded by the worker covers every uploaded artifact
    let segment_bytes: u64 = bundle.segments.values().map(|s| s.len() as u64).sum();
    assert!(video.file_size > segment_bytes);

    let store_dir = TempDir::new().unwrap();
    let store = FsBundleStore::new(store_dir.path());
    store.save(&bundle).await.unwrap();

    let remote = downloader.remote_version(&manifest_path).await.unwrap();
    assert!(store.is_current("v1", &remote).await.unwrap());
    assert_eq!(store.load("v1").await.unwrap().unwrap(), bundle);
}

#[tokio::test]
async fn test_token_for_another_video_cannot_download() {
    let (pipeline, video) = transcode("v2", "t1").await;
    let manifest_path = video.hls_manifest_path.clone().unwrap();

    let access = VideoAccessService::new(SECRET).unwrap();
    let fetcher = GatedStorage {
        storage: pipeline.storage.clone(),
        access: access.clone(),
        video_id: video.id.clone(),
        token: access.generate_token("some-other-video", "student-7", 30).unwrap(),
    };
    let downloader = HlsOfflineDownloader::new(Arc::new(fetcher)).with_retry(RetryConfig::immediate());

    assert!(downloader
        .download_bundle(&manifest_path, "https://app.coursecast.test/v2", |_| {})
        .await
        .is_none());
    assert_eq!(
        pipeline.repository.get("v2").await.unwrap().unwrap().transcoding_status,
        TranscodingStatus::Completed
    );
}

#[tokio::test]
async fn test_expired_token_cannot_download() {
    let (pipeline, video) = transcode("v3", "t2").await;
    let manifest_path = video.hls_manifest_path.clone().unwrap();

    let access = VideoAccessService::new(SECRET).unwrap();
    let fetcher = GatedStorage {
        storage: pipeline.storage.clone(),
        access: access.clone(),
        video_id: video.id.clone(),
        token: access.generate_token(&video.id, "student-7", 0).unwrap(),
    };
    let downloader = HlsOfflineDownloader::new(Arc::new(fetcher)).with_retry(RetryConfig::immediate());

    assert!(downloader.remote_version(&manifest_path).await.is_none());
}
