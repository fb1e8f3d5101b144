//! Storage Gateway - object storage for originals and HLS bundles
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
use coursecast_config::ObjectStorageConfig;
use rusoto_core::{credential::StaticProvider, request::HttpClient, Region, RusotoError};
use rusoto_s3::{
    DeleteObjectRequest, GetObjectError, GetObjectRequest, HeadObjectError, HeadObjectRequest,
    PutObjectRequest, S3Client, S3,
};
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Cache policy for immutable HLS artifacts
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000";

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage path: {0}")]
    InvalidPath(String),

    #[error("Download failed for {path}: {message}")]
    Download { path: String, message: String },

    #[error("Upload failed for {path}: {message}")]
    Upload { path: String, message: String },

    #[error("Delete failed for {path}: {message}")]
    Delete { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage backend error: {0}")]
    Backend(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

/// Narrow object-store contract. Implementations do not retry; callers
/// own resilience.
#[async_trait]
pub trait StorageGateway: Send + Sync {
    async fn download(&self, path: &str) -> Result<Vec<u8>>;

    async fn upload_buffer(&self, bytes: Vec<u8>, path: &str, content_type: &str) -> Result<()>;

    async fn delete(&self, path: &str) -> Result<()>;

    async fn exists(&self, path: &str) -> Result<bool>;

    fn backend_name(&self) -> &str;
}

/// S3-compatible object storage
pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    /// Create a new S3 storage client
    pub fn new(config: &ObjectStorageConfig) -> Result<Self> {
        let credentials =
            StaticProvider::new_minimal(config.access_key.clone(), config.secret_key.clone());

        let region = Region::Custom {
            name: config
                .region
                .clone()
                .unwrap_or_else(|| "us-east-1".to_string()),
            endpoint: Self::extract_endpoint(&config.endpoint),
        };

        info!(
            endpoint = config.endpoint,
            bucket = config.bucket,
            "Creating S3 storage client"
        );

        let http_client = HttpClient::new()
            .map_err(|e| StorageError::Backend(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client: S3Client::new_with(http_client, credentials, region),
            bucket: config.bucket.clone(),
        })
    }

    /// Endpoint URL from configuration; bare hosts are treated as HTTPS
    fn extract_endpoint(endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.trim_end_matches('/').to_string()
        } else {
            format!("https://{}", endpoint.trim_end_matches('/'))
        }
    }
}

#[async_trait]
impl StorageGateway for S3Storage {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let request = GetObjectRequest {
            bucket: self.bucket.clone(),
            key: path.to_string(),
            ..Default::default()
        };

        let output = self.client.get_object(request).await.map_err(|e| match e {
            RusotoError::Service(GetObjectError::NoSuchKey(_)) => {
                StorageError::NotFound(path.to_string())
            }
            other => StorageError::Download {
                path: path.to_string(),
                message: other.to_string(),
            },
        })?;

        let body = output.body.ok_or_else(|| StorageError::Download {
            path: path.to_string(),
            message: "response has no body".to_string(),
        })?;

        let mut bytes = Vec::with_capacity(output.content_length.unwrap_or(0).max(0) as usize);
        body.into_async_read().read_to_end(&mut bytes).await?;

        debug!(path = path, size = bytes.len(), "Object downloaded");
        Ok(bytes)
    }

    async fn upload_buffer(&self, bytes: Vec<u8>, path: &str, content_type: &str) -> Result<()> {
        let size = bytes.len();
        let request = PutObjectRequest {
            bucket: self.bucket.clone(),
            key: path.to_string(),
            body: Some(bytes.into()),
            content_type: Some(content_type.to_string()),
            cache_control: Some(IMMUTABLE_CACHE_CONTROL.to_string()),
            ..Default::default()
        };

        self.client
            .put_object(request)
            .await
            .map_err(|e| StorageError::Upload {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        debug!(path = path, size = size, content_type = content_type, "Object uploaded");
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let request = DeleteObjectRequest {
            bucket: self.bucket.clone(),
            key: path.to_string(),
            ..Default::default()
        };

        self.client
            .delete_object(request)
            .await
            .map_err(|e| StorageError::Delete {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        debug!(path = path, "Object deleted");
        Ok(())
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let request = HeadObjectRequest {
            bucket: self.bucket.clone(),
            key: path.to_string(),
            ..Default::default()
        };

        match self.client.head_object(request).await {
            Ok(_) => Ok(true),
            Err(RusotoError::Service(HeadObjectError::NoSuchKey(_))) => Ok(false),
            Err(RusotoError::Unknown(response)) if response.status.as_u16() == 404 => Ok(false),
            Err(e) => Err(StorageError::Backend(e.to_string())),
        }
    }

    fn backend_name(&self) -> &str {
        "s3"
    }
}

/// Filesystem-rooted storage for development and tests
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a storage path under the root, rejecting anything that escapes it
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        if path.is_empty()
            || relative
                .components()
                .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageGateway for LocalStorage {
    async fn download(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.resolve(path)?;
        match tokio::fs::read(&file).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn upload_buffer(&self, bytes: Vec<u8>, path: &str, _content_type: &str) -> Result<()> {
        let file = self.resolve(path)?;
        if let Some(parent) = file.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&file, bytes).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let file = self.resolve(path)?;
        match tokio::fs::remove_file(&file).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::Delete {
                path: path.to_string(),
                message: e.to_string(),
            }),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let file = self.resolve(path)?;
        Ok(tokio::fs::try_exists(&file).await?)
    }

    fn backend_name(&self) -> &str {
        "local"
    }
}
