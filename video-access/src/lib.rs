//! Video Access Library
//!
//! Stateless signing and verification of time-boxed playback capabilities
//! binding a video to a user. Tokens are HS256 JWTs carrying
//! `{videoId, userId, expiresAt}` plus the standard `exp` claim, and both
//! expiries must pass on verification.
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


pub mod error;
pub mod secret;
pub mod service;

pub use error::*;
pub use service::*;

use std::sync::OnceLock;

static SHARED: OnceLock<Result<VideoAccessService>> = OnceLock::new();

/// Process-wide service built from the environment on first use
///
/// Constructing [`VideoAccessService`] directly is preferred wherever the
/// secret can be passed in; this accessor serves call sites that cannot.
pub fn shared() -> std::result::Result<&'static VideoAccessService, &'static AccessError> {
    SHARED
        .get_or_init(|| {
            let config = coursecast_config::AppConfig::from_env()
                .map_err(|e| AccessError::Config(e.to_string()))?;
            VideoAccessService::from_config(&config.video_access, config.environment)
        })
        .as_ref()
}
