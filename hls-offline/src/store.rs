//! On-disk store for downloaded bundles
//!
//! `{root}/{videoId}/` holds the rewritten manifest, the segment files and
//! `bundle.json`. A bundle is written into a hidden staging directory and
//! renamed into place, so a reader sees either the previous bundle or the
//! complete new one.
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


use coursecast_types::layout::MANIFEST_FILE_NAME;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bundle::{BundleMetadata, OfflineBundle};
use crate::error::{DownloadError, Result};

pub const METADATA_FILE_NAME: &str = "bundle.json";

#[derive(Debug, Clone)]
pub struct FsBundleStore {
    root: PathBuf,
}

impl FsBundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn bundle_dir(&self, video_id: &str) -> Result<PathBuf> {
        validate_file_name(video_id)?;
        Ok(self.root.join(video_id))
    }

    /// Persist a bundle, replacing any earlier version of the same video
    pub async fn save(&self, bundle: &OfflineBundle) -> Result<PathBuf> {
        let target = self.bundle_dir(&bundle.video_id)?;
        for name in bundle.segments.keys() {
            validate_file_name(name)?;
            if name == MANIFEST_FILE_NAME || name == METADATA_FILE_NAME {
                return Err(DownloadError::InvalidPath(format!("reserved segment name {}", name)));
            }
        }

        fs::create_dir_all(&self.root).await?;
        let staging = self
            .root
            .join(format!(".{}.partial-{}", bundle.video_id, Uuid::new_v4()));
        fs::create_dir(&staging).await?;

        if let Err(e) = write_bundle_files(&staging, bundle).await {
            if let Err(cleanup) = fs::remove_dir_all(&staging).await {
                warn!(path = %staging.display(), error = %cleanup, "Failed to remove staging directory");
            }
            return Err(e);
        }

        let previous = if fs::try_exists(&target).await? {
            let retired = self
                .root
                .join(format!(".{}.retired-{}", bundle.video_id, Uuid::new_v4()));
            fs::rename(&target, &retired).await?;
            Some(retired)
        } else {
            None
        };

        fs::rename(&staging, &target).await?;

        if let Some(retired) = previous {
            if let Err(e) = fs::remove_dir_all(&retired).await {
                warn!(path = %retired.display(), error = %e, "Failed to remove superseded bundle");
            }
        }

        info!(
            video_id = bundle.video_id,
            version = bundle.version,
            path = %target.display(),
            "Offline bundle saved"
        );
        Ok(target)
    }

    /// Stored metadata, or `None` when no bundle exists for the video
    pub async fn metadata(&self, video_id: &str) -> Result<Option<BundleMetadata>> {
        let path = self.bundle_dir(video_id)?.join(METADATA_FILE_NAME);
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn load(&self, video_id: &str) -> Result<Option<OfflineBundle>> {
        let metadata = match self.metadata(video_id).await? {
            Some(metadata) => metadata,
            None => return Ok(None),
        };
        let dir = self.bundle_dir(video_id)?;

        let manifest = fs::read_to_string(dir.join(MANIFEST_FILE_NAME)).await?;
        let mut segments = BTreeMap::new();
        for name in &metadata.segments {
            validate_file_name(name)?;
            segments.insert(name.clone(), fs::read(dir.join(name)).await?);
        }

        debug!(video_id = video_id, segments = segments.len(), "Offline bundle loaded");

        Ok(Some(OfflineBundle {
            manifest,
            segments,
            video_id: metadata.video_id,
            version: metadata.version,
            downloaded_at: metadata.downloaded_at,
            source_video_url: metadata.source_video_url,
        }))
    }

    /// Whether the stored bundle for `video_id` has `version`
    pub async fn is_current(&self, video_id: &str, version: &str) -> Result<bool> {
        Ok(self
            .metadata(video_id)
            .await?
            .map_or(false, |m| m.version == version))
    }

    /// Delete a stored bundle; `false` when there was none
    pub async fn remove(&self, video_id: &str) -> Result<bool> {
        let dir = self.bundle_dir(video_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(video_id = video_id, "Offline bundle removed");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

async fn write_bundle_files(dir: &Path, bundle: &OfflineBundle) -> Result<()> {
    fs::write(dir.join(MANIFEST_FILE_NAME), bundle.manifest.as_bytes()).await?;
    for (name, bytes) in &bundle.segments {
        fs::write(dir.join(name), bytes).await?;
    }
    // Metadata last: its presence marks a complete bundle
    let metadata = serde_json::to_vec_pretty(&bundle.metadata())?;
    fs::write(dir.join(METADATA_FILE_NAME), metadata).await?;
    Ok(())
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\')
    {
        return Err(DownloadError::InvalidPath(name.to_string()));
    }
    Ok(())
}
