//! Shared fixtures for worker tests
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


#![allow(dead_code)]

use async_trait::async_trait;
use coursecast_types::{TranscodingJobPayload, Video};
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use transcoding_worker::transcoder::{ProbeInfo, Result, TranscodeError, Transcoder};
use transcoding_worker::{
    InMemoryVideoRepository, LocalStorage, StorageGateway, VideoProcessor, VideoRepository,
};

/// Transcoder double that writes a small HLS bundle instead of encoding
pub struct FakeTranscoder {
    pub height: u32,
    pub segments: usize,
    pub fail_transcode: bool,
    pub fail_thumbnail: bool,
    /// Write a truncated thumbnail before failing
    pub partial_thumbnail: bool,
    pub transcoded_heights: Mutex<Vec<u32>>,
}

impl FakeTranscoder {
    pub fn new(height: u32) -> Self {
        Self {
            height,
            segments: 3,
            fail_transcode: false,
            fail_thumbnail: false,
            partial_thumbnail: false,
            transcoded_heights: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Transcoder for FakeTranscoder {
    async fn probe(&self, input: &Path) -> Result<ProbeInfo> {
        let size = tokio::fs::metadata(input).await?.len();
        if size == 0 {
            return Err(TranscodeError::Failed {
                program: "ffprobe".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Invalid data found when processing input".to_string(),
            });
        }
        Ok(ProbeInfo {
            width: self.height * 16 / 9,
            height: self.height,
            duration_sec: Some(18),
        })
    }

    async fn transcode_to_hls(&self, _input: &Path, out_dir: &Path, height: u32) -> Result<()> {
        self.transcoded_heights.lock().unwrap().push(height);
        if self.fail_transcode {
            return Err(TranscodeError::Failed {
                program: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Conversion failed!".to_string(),
            });
        }

        tokio::fs::create_dir_all(out_dir).await?;
        let mut playlist = String::from(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:6\n#EXT-X-PLAYLIST-TYPE:VOD\n",
        );
        for i in 0..self.segments {
            let name = format!("segment-{:03}.ts", i);
            tokio::fs::write(out_dir.join(&name), vec![i as u8; 188]).await?;
            playlist.push_str(&format!("#EXTINF:6.000000,\n{}\n", name));
        }
        playlist.push_str("#EXT-X-ENDLIST\n");
        tokio::fs::write(out_dir.join("playlist.m3u8"), playlist).await?;
        Ok(())
    }

    async fn extract_thumbnail(&self, _input: &Path, output: &Path) -> Result<()> {
        if self.partial_thumbnail {
            tokio::fs::write(output, b"").await?;
            return Err(TranscodeError::Failed {
                program: "ffmpeg".to_string(),
                status: "exit status: 1".to_string(),
                stderr: "Error while decoding stream".to_string(),
            });
        }
        if self.fail_thumbnail {
            return Err(TranscodeError::NoVideoStream);
        }
        tokio::fs::write(output, b"\xFF\xD8\xFF\xE0jpeg").await?;
        Ok(())
    }
}

pub struct Harness {
    pub storage_dir: TempDir,
    pub work_dir: TempDir,
    pub storage: Arc<LocalStorage>,
    pub repository: Arc<InMemoryVideoRepository>,
    pub transcoder: Arc<FakeTranscoder>,
}

impl Harness {
    pub fn new(transcoder: FakeTranscoder) -> Self {
        let storage_dir = TempDir::new().unwrap();
        let work_dir = TempDir::new().unwrap();
        Self {
            storage: Arc::new(LocalStorage::new(storage_dir.path())),
            repository: Arc::new(InMemoryVideoRepository::new()),
            transcoder: Arc::new(transcoder),
            storage_dir,
            work_dir,
        }
    }

    pub fn processor(&self) -> VideoProcessor {
        VideoProcessor::new(
            self.storage.clone(),
            self.repository.clone(),
            self.transcoder.clone(),
            self.work_dir.path(),
        )
    }

    /// Register a PENDING video and store its original upload
    pub async fn upload(&self, video_id: &str, trainer_id: &str, bytes: &[u8]) -> TranscodingJobPayload {
        let original_path = format!("uploads/{}/raw.mp4", video_id);
        self.storage
            .upload_buffer(bytes.to_vec(), &original_path, "video/mp4")
            .await
            .unwrap();
        self.repository
            .register(&Video::new_pending(
                video_id,
                trainer_id,
                original_path.clone(),
                "video/mp4",
                bytes.len() as u64,
            ))
            .await
            .unwrap();

        TranscodingJobPayload {
            video_id: video_id.to_string(),
            trainer_id: trainer_id.to_string(),
            original_path,
        }
    }

    pub async fn video(&self, video_id: &str) -> Video {
        self.repository.get(video_id).await.unwrap().unwrap()
    }
}
