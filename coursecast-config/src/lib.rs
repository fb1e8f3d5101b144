//! Configuration management for Coursecast services
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


use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::str::FromStr;

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    Development,
    Test,
    Production,
}

impl Environment {
    pub fn is_production(&self) -> bool {
        matches!(self, Environment::Production)
    }
}

impl FromStr for Environment {
    type Err = config::ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "dev" | "development" | "local" => Ok(Environment::Development),
            "test" | "testing" => Ok(Environment::Test),
            "prod" | "production" => Ok(Environment::Production),
            other => Err(config::ConfigError::Message(format!(
                "Unknown APP_ENV value: {}",
                other
            ))),
        }
    }
}

/// Message bus (job queue) configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MessageBusConfig {
    pub url: String,
    pub stream_name: String,
    pub subject_prefix: String,
    /// Deliveries attempted before a job is dead-lettered
    pub max_deliver: u32,
    /// Seconds a job may stay unacknowledged before redelivery
    pub ack_wait_secs: u64,
}

/// Object storage configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ObjectStorageConfig {
    pub endpoint: String,
    pub access_key: String,
    pub secret_key: String,
    pub bucket: String,
    pub region: Option<String>,
}

/// Video access token configuration
#[derive(Debug, Clone, Deserialize)]
pub struct VideoAccessConfig {
    pub secret: Option<String>,
    pub default_ttl_minutes: u64,
}

/// External transcoder settings
#[derive(Debug, Clone, Deserialize)]
pub struct TranscodeConfig {
    pub work_dir: PathBuf,
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Encoder thread bound
    pub threads: u32,
    /// `nice` level for the encoder process, 0 disables
    pub nice_level: i32,
    /// Run the encoder in the idle I/O scheduling class (`ionice -c3`)
    pub idle_io_priority: bool,
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub message_bus: MessageBusConfig,
    pub object_storage: Option<ObjectStorageConfig>,
    pub local_storage_root: Option<PathBuf>,
    pub cdn_base_url: Option<String>,
    pub video_access: VideoAccessConfig,
    pub transcode: TranscodeConfig,
    pub database_url: Option<String>,
    pub health_check_port: u16,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, config::ConfigError> {
        // Load .env file if it exists
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, config::ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let environment = match var("APP_ENV") {
            Some(value) => value.parse()?,
            None => Environment::Development,
        };

        let message_bus = MessageBusConfig {
            url: var("MESSAGE_BUS_URL").unwrap_or_else(|| "nats://localhost:4222".to_string()),
            stream_name: var("MESSAGE_BUS_STREAM_NAME")
                .unwrap_or_else(|| "coursecast-jobs".to_string()),
            subject_prefix: "coursecast".to_string(),
            max_deliver: parse_or("JOB_MAX_DELIVER", var("JOB_MAX_DELIVER"), 3)?,
            ack_wait_secs: parse_or("JOB_ACK_WAIT_SECS", var("JOB_ACK_WAIT_SECS"), 3600)?,
        };

        // Build object storage config if all required vars are present
        let object_storage = if let (Some(endpoint), Some(access_key), Some(secret_key), Some(bucket)) = (
            var("OBJECT_STORAGE_ENDPOINT"),
            var("OBJECT_STORAGE_ACCESS_KEY"),
            var("OBJECT_STORAGE_SECRET_KEY"),
            var("OBJECT_STORAGE_BUCKET"),
        ) {
            Some(ObjectStorageConfig {
                endpoint,
                access_key,
                secret_key,
                bucket,
                region: var("OBJECT_STORAGE_REGION"),
            })
        } else {
            None
        };

        let video_access = VideoAccessConfig {
            secret: var("VIDEO_ACCESS_SECRET"),
            default_ttl_minutes: parse_or(
                "VIDEO_TOKEN_TTL_MINUTES",
                var("VIDEO_TOKEN_TTL_MINUTES"),
                60,
            )?,
        };

        let transcode = TranscodeConfig {
            work_dir: var("TRANSCODE_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| env::temp_dir().join("coursecast-transcode")),
            ffmpeg_path: var("FFMPEG_PATH").unwrap_or_else(|| "ffmpeg".to_string()),
            ffprobe_path: var("FFPROBE_PATH").unwrap_or_else(|| "ffprobe".to_string()),
            threads: parse_or("TRANSCODE_THREADS", var("TRANSCODE_THREADS"), 2)?,
            nice_level: parse_or("TRANSCODE_NICE", var("TRANSCODE_NICE"), 10)?,
            idle_io_priority: parse_or("TRANSCODE_IONICE", var("TRANSCODE_IONICE"), true)?,
        };

        Ok(Self {
            environment,
            message_bus,
            object_storage,
            local_storage_root: var("LOCAL_STORAGE_ROOT").map(PathBuf::from),
            cdn_base_url: var("CDN_BASE_URL"),
            video_access,
            transcode,
            database_url: var("DATABASE_URL"),
            health_check_port: parse_or("HEALTH_CHECK_PORT", var("HEALTH_CHECK_PORT"), 8080)?,
            log_level: Some(var("LOG_LEVEL").unwrap_or_else(|| "info".to_string())),
            log_format: var("LOG_FORMAT"),
        })
    }

    /// Get message bus URL
    pub fn message_bus_url(&self) -> &str {
        &self.message_bus.url
    }

    /// Get log level, defaulting to "info"
    pub fn log_level(&self) -> &str {
        self.log_level.as_deref().unwrap_or("info")
    }

    /// Get log format, defaulting to "json"
    pub fn log_format(&self) -> &str {
        self.log_format.as_deref().unwrap_or("json")
    }
}

fn parse_or<T: FromStr>(key: &str, value: Option<String>, default: T) -> Result<T, config::ConfigError> {
    match value {
        Some(raw) => raw.trim().parse().map_err(|_| {
            config::ConfigError::Message(format!("Invalid value for {}: {}", key, raw))
        }),
        None => Ok(default),
    }
}
