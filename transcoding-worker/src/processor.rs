//! Video Processor - one transcoding job from download to cleanup
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


use anyhow::{anyhow, Context};
use coursecast_types::{layout, TranscodeOutcome, TranscodingJobPayload, TranscodingStatus};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

use crate::repository::{CompletedTranscode, VideoRepository};
use crate::storage::StorageGateway;
use crate::transcoder::Transcoder;

const HLS_DIR_NAME: &str = "hls";
const SOURCE_FILE_STEM: &str = "source";

/// Runs transcoding jobs against the storage gateway, the repository and a
/// transcoder
pub struct VideoProcessor {
    storage: Arc<dyn StorageGateway>,
    repository: Arc<dyn VideoRepository>,
    transcoder: Arc<dyn Transcoder>,
    work_dir: PathBuf,
}

impl VideoProcessor {
    pub fn new(
        storage: Arc<dyn StorageGateway>,
        repository: Arc<dyn VideoRepository>,
        transcoder: Arc<dyn Transcoder>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            storage,
            repository,
            transcoder,
            work_dir: work_dir.into(),
        }
    }

    /// Working directory of one video's job
    pub fn job_dir(&self, video_id: &str) -> PathBuf {
        self.work_dir.join(video_id)
    }

    /// Process one job
    ///
    /// Never returns an error: every failure is persisted as `FAILED` with
    /// its message and reported in the outcome.
    pub async fn process(&self, job: &TranscodingJobPayload) -> TranscodeOutcome {
        if let Err(e) = job.validate() {
            error!(video_id = job.video_id, error = %e, "Rejected invalid transcoding job");
            return TranscodeOutcome::failed(e.to_string());
        }

        // A redelivered job for a finished video is a no-op
        match self.repository.get(&job.video_id).await {
            Ok(Some(video)) if video.transcoding_status == TranscodingStatus::Completed => {
                if let Some(manifest) = video.hls_manifest_path {
                    info!(video_id = job.video_id, "Video already transcoded, skipping job");
                    return TranscodeOutcome::succeeded(manifest);
                }
            }
            Ok(_) => {}
            Err(e) => {
                error!(video_id = job.video_id, error = %e, "Failed to load video");
                return TranscodeOutcome::failed(format!("failed to load video: {}", e));
            }
        }

        // Persisted before any I/O so a crash leaves a visible PROCESSING row
        if let Err(e) = self.repository.mark_processing(&job.video_id).await {
            error!(video_id = job.video_id, error = %e, "Failed to mark video as processing");
            return TranscodeOutcome::failed(format!("failed to start processing: {}", e));
        }

        info!(
            video_id = job.video_id,
            trainer_id = job.trainer_id,
            original_path = job.original_path,
            "Starting transcoding job"
        );

        let job_dir = self.job_dir(&job.video_id);
        let result = self.run_pipeline(job, &job_dir).await;

        // Unconditional cleanup of the working directory
        match tokio::fs::remove_dir_all(&job_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                video_id = job.video_id,
                dir = %job_dir.display(),
                error = %e,
                "Failed to remove working directory"
            ),
        }

        match result {
            Ok(manifest_path) => {
                info!(
                    video_id = job.video_id,
                    manifest = manifest_path,
                    "Transcoding job completed"
                );
                TranscodeOutcome::succeeded(manifest_path)
            }
            Err(e) => {
                let message = format!("{:#}", e);
                error!(video_id = job.video_id, error = %message, "Transcoding job failed");
                if let Err(persist_err) = self.repository.mark_failed(&job.video_id, &message).await {
                    error!(
                        video_id = job.video_id,
                        error = %persist_err,
                        "Failed to persist FAILED status"
                    );
                }
                TranscodeOutcome::failed(message)
            }
        }
    }

    /// Steps between PROCESSING and COMPLETED; returns the manifest path
    async fn run_pipeline(&self, job: &TranscodingJobPayload, job_dir: &Path) -> anyhow::Result<String> {
        let manifest_path = layout::manifest_path(&job.trainer_id, &job.video_id)?;
        let hls_dir = job_dir.join(HLS_DIR_NAME);

        // Leftovers from an attempt that crashed mid-job
        if tokio::fs::try_exists(job_dir).await.unwrap_or(false) {
            tokio::fs::remove_dir_all(job_dir)
                .await
                .context("failed to clear stale working directory")?;
        }
        tokio::fs::create_dir_all(&hls_dir)
            .await
            .context("failed to create working directory")?;

        let bytes = self
            .storage
            .download(&job.original_path)
            .await
            .with_context(|| format!("failed to download original {}", job.original_path))?;
        let source = job_dir.join(source_file_name(&job.original_path));
        tokio::fs::write(&source, &bytes)
            .await
            .context("failed to write source file")?;
        info!(video_id = job.video_id, size = bytes.len(), "Original downloaded");
        drop(bytes);

        let probe = self
            .transcoder
            .probe(&source)
            .await
            .context("failed to probe source video")?;
        if probe.height == 0 {
            return Err(anyhow!("probe reported zero pixel height"));
        }
        info!(
            video_id = job.video_id,
            height = probe.height,
            duration_sec = ?probe.duration_sec,
            "Source probed"
        );

        self.transcoder
            .transcode_to_hls(&source, &hls_dir, probe.height)
            .await
            .context("failed to transcode to HLS")?;

        if !tokio::fs::try_exists(hls_dir.join(layout::MANIFEST_FILE_NAME))
            .await
            .unwrap_or(false)
        {
            return Err(anyhow!("transcoder produced no playlist"));
        }

        // Best-effort: a missing thumbnail never fails the job
        let thumbnail_file = hls_dir.join(layout::THUMBNAIL_FILE_NAME);
        let has_thumbnail = match self.transcoder.extract_thumbnail(&source, &thumbnail_file).await {
            Ok(()) => tokio::fs::try_exists(&thumbnail_file).await.unwrap_or(false),
            Err(e) => {
                warn!(video_id = job.video_id, error = %e, "Thumbnail extraction failed");
                false
            }
        };
        // A failed extraction may leave a truncated file behind
        if !has_thumbnail {
            match tokio::fs::remove_file(&thumbnail_file).await {
                Ok(()) => debug!(video_id = job.video_id, "Removed partial thumbnail"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(anyhow::Error::new(e).context("failed to remove partial thumbnail"));
                }
            }
        }

        let bundle_size = self.upload_bundle(job, &hls_dir).await?;
        let thumbnail_path = if has_thumbnail {
            Some(layout::thumbnail_path(&job.trainer_id, &job.video_id)?)
        } else {
            None
        };

        self.repository
            .mark_completed(
                &job.video_id,
                &CompletedTranscode {
                    hls_manifest_path: manifest_path.clone(),
                    thumbnail_path,
                    bundle_size,
                    duration_sec: probe.duration_sec,
                },
            )
            .await
            .context("failed to persist COMPLETED status")?;

        // Best-effort: a leftover original only wastes storage
        match self.storage.delete(&job.original_path).await {
            Ok(()) => {
                if let Err(e) = self.repository.clear_original(&job.video_id).await {
                    warn!(video_id = job.video_id, error = %e, "Failed to clear original path");
                }
            }
            Err(e) => warn!(
                video_id = job.video_id,
                original_path = job.original_path,
                error = %e,
                "Failed to delete original upload"
            ),
        }

        Ok(manifest_path)
    }

    /// Upload every file of the HLS directory; returns the total size
    async fn upload_bundle(&self, job: &TranscodingJobPayload, hls_dir: &Path) -> anyhow::Result<u64> {
        let mut files = Vec::new();
        let mut entries = tokio::fs::read_dir(hls_dir)
            .await
            .context("failed to list HLS output")?;
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_file() {
                files.push(entry.path());
            }
        }
        files.sort();

        let mut total = 0u64;
        for file in &files {
            let name = file
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| anyhow!("non UTF-8 file name in HLS output: {:?}", file))?;
            let key = layout::object_path(&job.trainer_id, &job.video_id, name)?;
            let bytes = tokio::fs::read(file)
                .await
                .with_context(|| format!("failed to read {}", name))?;
            total += bytes.len() as u64;

            self.storage
                .upload_buffer(bytes, &key, layout::content_type_for(name))
                .await
                .with_context(|| format!("failed to upload {}", key))?;
        }

        info!(
            video_id = job.video_id,
            files = files.len(),
            bundle_size = total,
            "HLS bundle uploaded"
        );
        Ok(total)
    }
}

/// Local file name of the downloaded original, keeping its extension
fn source_file_name(original_path: &str) -> String {
    let name = layout::file_name(original_path);
    match name.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty() && !ext.is_empty() && ext.chars().all(|c| c.is_ascii_alphanumeric()) =>
        {
            format!("{}.{}", SOURCE_FILE_STEM, ext.to_ascii_lowercase())
        }
        _ => SOURCE_FILE_STEM.to_string(),
    }
}
