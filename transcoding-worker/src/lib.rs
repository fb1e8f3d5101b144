//! Transcoding Worker Library
//!
//! This library turns uploaded videos into HLS bundles:
//! - Storage gateway over S3-compatible or local storage
//! - Video repository holding the transcoding state machine
//! - FFmpeg transcoder at source resolution
//! - Job processor and queue-driven worker
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


pub mod health;
pub mod processor;
pub mod repository;
pub mod storage;
pub mod transcoder;
pub mod worker;

pub use processor::VideoProcessor;
pub use repository::{CompletedTranscode, InMemoryVideoRepository, PostgresVideoRepository, VideoRepository};
pub use storage::{LocalStorage, S3Storage, StorageGateway};
pub use transcoder::{FfmpegTranscoder, ProbeInfo, Transcoder};
pub use worker::{TranscodingWorker, WorkerStats};
