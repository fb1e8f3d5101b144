//! Offline bundle model
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


use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A complete, self-contained HLS bundle held on the client
#[derive(Debug, Clone, PartialEq)]
pub struct OfflineBundle {
    /// Manifest text with every segment reference rewritten to a bare file name
    pub manifest: String,
    /// Segment bytes keyed by file name
    pub segments: BTreeMap<String, Vec<u8>>,
    pub video_id: String,
    /// First 16 hex chars of the SHA-256 of `manifest`
    pub version: String,
    pub downloaded_at: DateTime<Utc>,
    pub source_video_url: String,
}

impl OfflineBundle {
    /// Bytes held by the bundle, manifest included
    pub fn total_size(&self) -> u64 {
        let segments: usize = self.segments.values().map(Vec::len).sum();
        (segments + self.manifest.len()) as u64
    }

    pub fn segment_names(&self) -> impl Iterator<Item = &str> {
        self.segments.keys().map(String::as_str)
    }

    pub fn metadata(&self) -> BundleMetadata {
        BundleMetadata {
            video_id: self.video_id.clone(),
            version: self.version.clone(),
            downloaded_at: self.downloaded_at,
            source_video_url: self.source_video_url.clone(),
            segments: self.segments.keys().cloned().collect(),
        }
    }
}

/// `bundle.json` stored beside the files of a persisted bundle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleMetadata {
    pub video_id: String,
    pub version: String,
    pub downloaded_at: DateTime<Utc>,
    pub source_video_url: String,
    pub segments: Vec<String>,
}

/// Files finished so far; the manifest counts as the first file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DownloadProgress {
    pub completed: usize,
    pub total: usize,
}

impl DownloadProgress {
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.completed as f64 / self.total as f64
        }
    }
}
