//! Video entity and its transcoding state machine
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
use std::fmt;
use std::str::FromStr;

use crate::error::{CoursecastError, Result};

/// Transcoding lifecycle of a video
///
/// `Pending -> Processing -> Completed`, or `Processing -> Failed`.
/// A redelivered job re-enters `Processing` from `Failed` (or from a
/// `Processing` row abandoned by a crashed worker).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TranscodingStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl TranscodingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TranscodingStatus::Pending => "PENDING",
            TranscodingStatus::Processing => "PROCESSING",
            TranscodingStatus::Completed => "COMPLETED",
            TranscodingStatus::Failed => "FAILED",
        }
    }

    /// Whether the state machine allows moving from `self` to `next`
    pub fn can_transition_to(&self, next: TranscodingStatus) -> bool {
        use TranscodingStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Failed, Processing)
                | (Processing, Processing)
                | (Processing, Completed)
                | (Processing, Failed)
        )
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, TranscodingStatus::Completed | TranscodingStatus::Failed)
    }
}

impl fmt::Display for TranscodingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TranscodingStatus {
    type Err = CoursecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "PENDING" => Ok(TranscodingStatus::Pending),
            "PROCESSING" => Ok(TranscodingStatus::Processing),
            "COMPLETED" => Ok(TranscodingStatus::Completed),
            "FAILED" => Ok(TranscodingStatus::Failed),
            other => Err(CoursecastError::UnknownStatus(other.to_string())),
        }
    }
}

/// A trainer-uploaded video
///
/// `file_size` holds the original upload size until transcoding completes,
/// after which it holds the size of the delivered HLS bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Video {
    pub id: String,
    pub trainer_id: String,
    /// Storage path of the original upload; `None` once it has been deleted
    pub relative_path: Option<String>,
    pub mime_type: String,
    pub file_size: u64,
    pub duration_sec: Option<u32>,
    pub hls_manifest_path: Option<String>,
    pub thumbnail_path: Option<String>,
    pub transcoding_status: TranscodingStatus,
    pub transcoding_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub transcoded_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl Video {
    /// A freshly registered upload awaiting transcoding
    pub fn new_pending(
        id: impl Into<String>,
        trainer_id: impl Into<String>,
        relative_path: impl Into<String>,
        mime_type: impl Into<String>,
        file_size: u64,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            trainer_id: trainer_id.into(),
            relative_path: Some(relative_path.into()),
            mime_type: mime_type.into(),
            file_size,
            duration_sec: None,
            hls_manifest_path: None,
            thumbnail_path: None,
            transcoding_status: TranscodingStatus::Pending,
            transcoding_error: None,
            created_at: now,
            transcoded_at: None,
            updated_at: now,
        }
    }

    fn transition(&mut self, next: TranscodingStatus) -> Result<()> {
        if !self.transcoding_status.can_transition_to(next) {
            return Err(CoursecastError::InvalidTransition {
                from: self.transcoding_status,
                to: next,
            });
        }
        self.transcoding_status = next;
        self.updated_at = Utc::now();
        Ok(())
    }

    /// Job picked up by a worker
    pub fn mark_processing(&mut self) -> Result<()> {
        self.transition(TranscodingStatus::Processing)?;
        self.transcoding_error = None;
        self.hls_manifest_path = None;
        Ok(())
    }

    /// Bundle uploaded; `bundle_size` replaces the original upload size
    pub fn mark_completed(
        &mut self,
        hls_manifest_path: impl Into<String>,
        thumbnail_path: Option<String>,
        bundle_size: u64,
        duration_sec: Option<u32>,
    ) -> Result<()> {
        self.transition(TranscodingStatus::Completed)?;
        self.hls_manifest_path = Some(hls_manifest_path.into());
        self.thumbnail_path = thumbnail_path;
        self.file_size = bundle_size;
        if duration_sec.is_some() {
            self.duration_sec = duration_sec;
        }
        self.transcoding_error = None;
        self.transcoded_at = Some(self.updated_at);
        Ok(())
    }

    /// Any step of the job failed
    pub fn mark_failed(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(TranscodingStatus::Failed)?;
        self.hls_manifest_path = None;
        self.transcoding_error = Some(non_empty_error(error.into()));
        Ok(())
    }

    /// Original upload removed from storage
    pub fn clear_original(&mut self) {
        self.relative_path = None;
        self.updated_at = Utc::now();
    }

    /// Check the manifest/status and error/status invariants
    pub fn check_invariants(&self) -> Result<()> {
        let completed = self.transcoding_status == TranscodingStatus::Completed;
        if self.hls_manifest_path.is_some() != completed {
            return Err(CoursecastError::InvalidPayload(format!(
                "video {} has manifest={} with status {}",
                self.id,
                self.hls_manifest_path.is_some(),
                self.transcoding_status
            )));
        }
        if self.transcoding_status == TranscodingStatus::Failed
            && self.transcoding_error.as_deref().map_or(true, str::is_empty)
        {
            return Err(CoursecastError::MissingField(format!(
                "transcoding_error for failed video {}",
                self.id
            )));
        }
        Ok(())
    }
}

/// Failed rows must always carry a readable message
pub fn non_empty_error(error: String) -> String {
    if error.trim().is_empty() {
        "unknown transcoding error".to_string()
    } else {
        error
    }
}
