//! HLS Offline Library
//!
//! Client-side download of a complete HLS bundle (manifest plus every
//! segment) for disconnected playback:
//! - Bounded-concurrency segment fetching with per-file retry
//! - Manifest rewriting to location-independent file names
//! - Content-hash versioning for staleness checks
//! - An on-disk bundle store
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


pub mod bundle;
pub mod downloader;
pub mod error;
pub mod fetcher;
pub mod manifest;
pub mod pool;
pub mod retry;
pub mod store;

pub use bundle::{BundleMetadata, DownloadProgress, OfflineBundle};
pub use downloader::HlsOfflineDownloader;
pub use error::{DownloadError, Result};
pub use fetcher::{HttpFetcher, SegmentFetcher};
pub use pool::BoundedPool;
pub use retry::RetryConfig;
pub use store::FsBundleStore;
