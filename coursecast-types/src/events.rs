//! Event envelope for jobs and notifications on the message bus
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
use uuid::Uuid;

use crate::error::{CoursecastError, Result};
use crate::schemas::*;

/// Event type identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    /// Transcoding job (the `video-transcoding` job type)
    #[serde(rename = "video-transcoding")]
    VideoTranscoding,
    #[serde(rename = "video.transcoded")]
    VideoTranscoded,
    #[serde(rename = "video.transcoding_failed")]
    VideoTranscodingFailed,
    #[serde(rename = "video.transcoding_dead_lettered")]
    VideoTranscodingDeadLettered,
}

impl EventType {
    /// Wire name, also used to derive queue subjects
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::VideoTranscoding => "video-transcoding",
            EventType::VideoTranscoded => "video.transcoded",
            EventType::VideoTranscodingFailed => "video.transcoding_failed",
            EventType::VideoTranscodingDeadLettered => "video.transcoding_dead_lettered",
        }
    }
}

/// Base event structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Event type identifier
    pub event_type: EventType,

    /// Unique event identifier
    pub event_id: Uuid,

    /// Event timestamp
    pub timestamp: DateTime<Utc>,

    /// Source service that published the event
    pub source: String,

    /// Event payload (type depends on event_type)
    pub payload: serde_json::Value,
}

impl Event {
    /// Create a new event
    pub fn new(
        event_type: EventType,
        source: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<Self> {
        let payload_value = serde_json::to_value(payload)?;

        Ok(Self {
            event_type,
            event_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload: payload_value,
        })
    }

    /// Wrap a transcoding job
    pub fn transcoding_job(source: impl Into<String>, job: &TranscodingJobPayload) -> Result<Self> {
        Self::new(EventType::VideoTranscoding, source, job)
    }

    /// Deserialize the payload into a specific type
    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T> {
        serde_json::from_value(self.payload.clone())
            .map_err(|e| CoursecastError::InvalidPayload(e.to_string()))
    }

    /// Validate the event structure
    pub fn validate(&self) -> Result<()> {
        match self.event_type {
            EventType::VideoTranscoding => {
                let job: TranscodingJobPayload = self.payload_as()?;
                job.validate()?;
            }
            EventType::VideoTranscoded => {
                let _: VideoTranscodedPayload = self.payload_as()?;
            }
            EventType::VideoTranscodingFailed => {
                let _: VideoTranscodingFailedPayload = self.payload_as()?;
            }
            EventType::VideoTranscodingDeadLettered => {
                let _: DeadLetterPayload = self.payload_as()?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job() -> TranscodingJobPayload {
        TranscodingJobPayload {
            video_id: "v1".to_string(),
            trainer_id: "t1".to_string(),
            original_path: "uploads/v1/raw.mp4".to_string(),
        }
    }

    #[test]
    fn test_event_creation() {
        let event = Event::transcoding_job("test-service", &job()).unwrap();
        assert_eq!(event.event_type, EventType::VideoTranscoding);
        assert_eq!(event.source, "test-service");
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::transcoding_job("test", &job()).unwrap();
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"video-transcoding\""));
        assert!(json.contains("\"originalPath\""));

        let deserialized: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.event_type, deserialized.event_type);
        assert_eq!(event.event_id, deserialized.event_id);
        assert_eq!(deserialized.payload_as::<TranscodingJobPayload>().unwrap(), job());
    }

    #[test]
    fn test_validate_rejects_incomplete_job() {
        let event = Event::new(
            EventType::VideoTranscoding,
            "test",
            serde_json::json!({ "videoId": "v1", "trainerId": "", "originalPath": "x" }),
        )
        .unwrap();
        assert!(event.validate().is_err());
    }
}
