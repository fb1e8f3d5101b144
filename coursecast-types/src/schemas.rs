//! Job and event payload schemas
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


use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoursecastError, Result};

// ============================================================================
// Job Payloads
// ============================================================================

/// Payload of a `video-transcoding` job
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodingJobPayload {
    pub video_id: String,
    pub trainer_id: String,
    pub original_path: String,
}

impl TranscodingJobPayload {
    pub fn validate(&self) -> Result<()> {
        if self.video_id.trim().is_empty() {
            return Err(CoursecastError::MissingField("videoId".to_string()));
        }
        if self.trainer_id.trim().is_empty() {
            return Err(CoursecastError::MissingField("trainerId".to_string()));
        }
        if self.original_path.trim().is_empty() {
            return Err(CoursecastError::MissingField("originalPath".to_string()));
        }
        // Ids become path components of the bundle layout
        crate::layout::hls_prefix(&self.trainer_id, &self.video_id)?;
        Ok(())
    }
}

/// Result of processing one job, reported across the pipeline boundary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeOutcome {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hls_manifest_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TranscodeOutcome {
    pub fn succeeded(hls_manifest_path: impl Into<String>) -> Self {
        Self {
            success: true,
            hls_manifest_path: Some(hls_manifest_path.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            hls_manifest_path: None,
            error: Some(error.into()),
        }
    }
}

// ============================================================================
// Notification Payloads
// ============================================================================

/// Payload for `video.transcoded` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoTranscodedPayload {
    pub video_id: String,
    pub trainer_id: String,
    pub hls_manifest_path: String,
    pub thumbnail_path: Option<String>,
    /// Size of the delivered HLS bundle in bytes
    pub bundle_size: u64,
    pub duration_sec: Option<u32>,
}

/// Payload for `video.transcoding_failed` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoTranscodingFailedPayload {
    pub video_id: String,
    pub trainer_id: String,
    pub error: String,
    /// 1-based delivery attempt that failed
    pub attempt: u32,
    pub failed_at: chrono::DateTime<chrono::Utc>,
}

/// Payload for `video.transcoding_dead_lettered` event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterPayload {
    pub original_event_id: Uuid,
    pub video_id: String,
    pub failure_reason: String,
    pub delivery_count: u32,
    pub failed_at: chrono::DateTime<chrono::Utc>,
    pub original_payload: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_payload_wire_format() {
        let job: TranscodingJobPayload = serde_json::from_str(
            r#"{"videoId":"v1","trainerId":"t1","originalPath":"uploads/v1/raw.mp4"}"#,
        )
        .unwrap();
        assert_eq!(job.video_id, "v1");
        assert_eq!(job.original_path, "uploads/v1/raw.mp4");
        assert!(job.validate().is_ok());
    }

    #[test]
    fn test_job_payload_rejects_path_like_ids() {
        let job = TranscodingJobPayload {
            video_id: "..".to_string(),
            trainer_id: "t1".to_string(),
            original_path: "uploads/x/raw.mp4".to_string(),
        };
        assert!(matches!(job.validate(), Err(CoursecastError::InvalidStoragePath(_))));
    }

    #[test]
    fn test_outcome_shape() {
        let ok = serde_json::to_value(TranscodeOutcome::succeeded("a/playlist.m3u8")).unwrap();
        assert_eq!(ok["success"], true);
        assert!(ok.get("error").is_none());

        let failed = serde_json::to_value(TranscodeOutcome::failed("probe failed")).unwrap();
        assert_eq!(failed["success"], false);
        assert_eq!(failed["error"], "probe failed");
        assert!(failed.get("hlsManifestPath").is_none());
    }
}
