//! Fetching manifests and segments from the CDN
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


use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::error::{DownloadError, Result};

/// Query parameter carrying the access token on CDN requests
pub const TOKEN_QUERY_PARAM: &str = "token";

/// Source of bundle files, addressed by storage path
#[async_trait]
pub trait SegmentFetcher: Send + Sync {
    /// Fetch one file; any non-success response is an error
    async fn fetch(&self, path: &str) -> Result<Vec<u8>>;

    /// Public URL a path resolves to (for logging and bundle metadata)
    fn resolve_url(&self, path: &str) -> Result<String>;
}

/// reqwest-backed fetcher rooted at a CDN base URL
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpFetcher {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| DownloadError::Network(format!("Failed to create HTTP client: {}", e)))?;

        let base_url = base_url.into();
        Url::parse(&base_url).map_err(|e| DownloadError::InvalidPath(format!("{}: {}", base_url, e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    /// Append `?token=...` to every request
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn request_url(&self, path: &str) -> Result<Url> {
        let joined = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        let mut url = Url::parse(&joined).map_err(|e| DownloadError::InvalidPath(format!("{}: {}", joined, e)))?;
        if let Some(token) = &self.token {
            url.query_pairs_mut().append_pair(TOKEN_QUERY_PARAM, token);
        }
        Ok(url)
    }
}

#[async_trait]
impl SegmentFetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>> {
        let url = self.request_url(path)?;
        debug!(path = path, "Fetching");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::Status {
                url: self.resolve_url(path)?,
                status: status.as_u16(),
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| DownloadError::Network(e.to_string()))?;
        Ok(bytes.to_vec())
    }

    fn resolve_url(&self, path: &str) -> Result<String> {
        let mut url = self.request_url(path)?;
        // Never leak the token into logs or stored metadata
        url.set_query(None);
        Ok(url.to_string())
    }
}
