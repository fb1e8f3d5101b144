//! Offline HLS downloader
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


use chrono::Utc;
use coursecast_types::layout;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::bundle::{DownloadProgress, OfflineBundle};
use crate::error::{DownloadError, Result};
use crate::fetcher::SegmentFetcher;
use crate::manifest;
use crate::pool::BoundedPool;
use crate::retry::{retry_with_backoff, RetryConfig};

/// Downloads a manifest and every segment it references into memory
pub struct HlsOfflineDownloader {
    fetcher: Arc<dyn SegmentFetcher>,
    retry: RetryConfig,
    pool: BoundedPool,
}

impl HlsOfflineDownloader {
    pub fn new(fetcher: Arc<dyn SegmentFetcher>) -> Self {
        Self {
            fetcher,
            retry: RetryConfig::default(),
            pool: BoundedPool::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.pool = BoundedPool::new(limit);
        self
    }

    /// Download a complete bundle
    ///
    /// Returns `None` on any failure: manifest unavailable, no segments,
    /// a segment still failing after its retries, or a gap between the
    /// manifest and the downloaded files. `on_progress` is called after
    /// every finished file, the manifest being the first.
    pub async fn download_bundle<P>(
        &self,
        manifest_path: &str,
        source_video_url: &str,
        mut on_progress: P,
    ) -> Option<OfflineBundle>
    where
        P: FnMut(DownloadProgress),
    {
        match self
            .try_download(manifest_path, source_video_url, &mut on_progress)
            .await
        {
            Ok(bundle) => {
                info!(
                    video_id = bundle.video_id,
                    version = bundle.version,
                    segments = bundle.segments.len(),
                    size_bytes = bundle.total_size(),
                    "Offline bundle downloaded"
                );
                Some(bundle)
            }
            Err(e) => {
                warn!(
                    manifest_path = manifest_path,
                    error = %e,
                    "Offline bundle download failed"
                );
                None
            }
        }
    }

    /// Version the bundle would get if downloaded now
    ///
    /// Only the manifest is fetched. `None` when it cannot be fetched or
    /// references no segments.
    pub async fn remote_version(&self, manifest_path: &str) -> Option<String> {
        let result = async {
            let text = self.fetch_manifest(manifest_path).await?;
            manifest::parse_segments(&text)?;
            Ok::<_, DownloadError>(manifest::bundle_version(&manifest::rewrite_for_offline(&text)))
        }
        .await;

        match result {
            Ok(version) => Some(version),
            Err(e) => {
                warn!(manifest_path = manifest_path, error = %e, "Remote version check failed");
                None
            }
        }
    }

    async fn fetch_with_retry(&self, path: &str) -> Result<Vec<u8>> {
        retry_with_backoff(&self.retry, path, || self.fetcher.fetch(path)).await
    }

    async fn fetch_manifest(&self, manifest_path: &str) -> Result<String> {
        let bytes = self.fetch_with_retry(manifest_path).await?;
        String::from_utf8(bytes)
            .map_err(|e| DownloadError::MalformedManifest(format!("manifest is not UTF-8: {}", e)))
    }

    async fn try_download<P>(
        &self,
        manifest_path: &str,
        source_video_url: &str,
        on_progress: &mut P,
    ) -> Result<OfflineBundle>
    where
        P: FnMut(DownloadProgress),
    {
        let video_id = layout::video_id_from_manifest_path(manifest_path)
            .ok_or_else(|| DownloadError::InvalidPath(format!("no video id in {}", manifest_path)))?;

        debug!(
            video_id = video_id,
            url = self.fetcher.resolve_url(manifest_path).unwrap_or_default(),
            "Fetching manifest"
        );
        let text = self.fetch_manifest(manifest_path).await?;
        let references = manifest::parse_segments(&text)?;

        // A file referenced twice is fetched once
        let mut seen = HashSet::new();
        let wanted: Vec<&str> = references
            .iter()
            .map(|r| manifest::local_file_name(r))
            .filter(|name| seen.insert(*name))
            .collect();

        let total = wanted.len() + 1;
        let mut completed = 1;
        on_progress(DownloadProgress { completed, total });

        let fetched = self
            .pool
            .run(
                wanted.iter().copied(),
                |name| {
                    let path = manifest::segment_storage_path(manifest_path, name);
                    async move {
                        let bytes = self.fetch_with_retry(&path).await?;
                        Ok::<_, DownloadError>((name.to_string(), bytes))
                    }
                },
                |_| {
                    completed += 1;
                    on_progress(DownloadProgress { completed, total });
                },
            )
            .await?;

        let segments: BTreeMap<String, Vec<u8>> = fetched.into_iter().collect();

        let missing: Vec<String> = references
            .iter()
            .map(|r| manifest::local_file_name(r))
            .filter(|name| !segments.contains_key(*name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() {
            return Err(DownloadError::MissingSegments(missing));
        }

        let rewritten = manifest::rewrite_for_offline(&text);
        let version = manifest::bundle_version(&rewritten);

        Ok(OfflineBundle {
            manifest: rewritten,
            segments,
            video_id,
            version,
            downloaded_at: Utc::now(),
            source_video_url: source_video_url.to_string(),
        })
    }
}
