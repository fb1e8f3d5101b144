//! Video Repository - persisted video state
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
use coursecast_types::{CoursecastError, TranscodingStatus, Video};
use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::RwLock;
use tokio_postgres::{Client, NoTls, Row};
use tracing::{error, info};

#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("Video not found: {0}")]
    NotFound(String),

    #[error("Video already registered: {0}")]
    AlreadyExists(String),

    #[error(transparent)]
    Domain(#[from] CoursecastError),

    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    #[error("Invalid row: {0}")]
    InvalidRow(String),
}

pub type Result<T> = std::result::Result<T, RepositoryError>;

/// Values written when a transcode completes
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedTranscode {
    pub hls_manifest_path: String,
    pub thumbnail_path: Option<String>,
    /// Total size of the uploaded HLS bundle
    pub bundle_size: u64,
    pub duration_sec: Option<u32>,
}

/// Persistence of [`Video`] rows
///
/// Each transition is applied atomically and only from a state the
/// transcoding state machine allows.
#[async_trait]
pub trait VideoRepository: Send + Sync {
    /// Insert a freshly uploaded video in `PENDING`
    async fn register(&self, video: &Video) -> Result<()>;

    async fn get(&self, video_id: &str) -> Result<Option<Video>>;

    async fn mark_processing(&self, video_id: &str) -> Result<Video>;

    async fn mark_completed(&self, video_id: &str, completed: &CompletedTranscode) -> Result<Video>;

    async fn mark_failed(&self, video_id: &str, error: &str) -> Result<Video>;

    /// Forget the original upload path once the file is gone
    async fn clear_original(&self, video_id: &str) -> Result<()>;
}

/// In-memory repository for tests and local development
#[derive(Default)]
pub struct InMemoryVideoRepository {
    videos: RwLock<HashMap<String, Video>>,
}

impl InMemoryVideoRepository {
    pub fn new() -> Self {
        Self::default()
    }

    async fn update<F>(&self, video_id: &str, f: F) -> Result<Video>
    where
        F: FnOnce(&mut Video) -> std::result::Result<(), CoursecastError> + Send,
    {
        let mut videos = self.videos.write().await;
        let stored = videos
            .get_mut(video_id)
            .ok_or_else(|| RepositoryError::NotFound(video_id.to_string()))?;

        // Apply on a copy so a rejected transition leaves the row untouched
        let mut next = stored.clone();
        f(&mut next)?;
        *stored = next.clone();
        Ok(next)
    }
}

#[async_trait]
impl VideoRepository for InMemoryVideoRepository {
    async fn register(&self, video: &Video) -> Result<()> {
        let mut videos = self.videos.write().await;
        if videos.contains_key(&video.id) {
            return Err(RepositoryError::AlreadyExists(video.id.clone()));
        }
        videos.insert(video.id.clone(), video.clone());
        Ok(())
    }

    async fn get(&self, video_id: &str) -> Result<Option<Video>> {
        Ok(self.videos.read().await.get(video_id).cloned())
    }

    async fn mark_processing(&self, video_id: &str) -> Result<Video> {
        self.update(video_id, |video| video.mark_processing()).await
    }

    async fn mark_completed(&self, video_id: &str, completed: &CompletedTranscode) -> Result<Video> {
        let completed = completed.clone();
        self.update(video_id, move |video| {
            video.mark_completed(
                completed.hls_manifest_path,
                completed.thumbnail_path,
                completed.bundle_size,
                completed.duration_sec,
            )
        })
        .await
    }

    async fn mark_failed(&self, video_id: &str, error: &str) -> Result<Video> {
        let error = error.to_string();
        self.update(video_id, move |video| video.mark_failed(error)).await
    }

    async fn clear_original(&self, video_id: &str) -> Result<()> {
        self.update(video_id, |video| {
            video.clear_original();
            Ok(())
        })
        .await
        .map(|_| ())
    }
}

const VIDEO_COLUMNS: &str = "id, trainer_id, relative_path, mime_type, file_size, duration_sec, \
     hls_manifest_path, thumbnail_path, transcoding_status, transcoding_error, \
     created_at, transcoded_at, updated_at";

/// Postgres-backed repository
pub struct PostgresVideoRepository {
    client: Client,
}

impl PostgresVideoRepository {
    /// Connect and make sure the `videos` table exists
    pub async fn connect(database_url: &str) -> Result<Self> {
        info!("Connecting to video database");

        let (client, connection) = tokio_postgres::connect(database_url, NoTls).await?;

        // Spawn connection task
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                error!(error = %e, "Database connection error");
            }
        });

        Self::run_migrations(&client).await?;

        info!("Video database connected and initialized");

        Ok(Self { client })
    }

    /// Run database migrations
    async fn run_migrations(client: &Client) -> Result<()> {
        client
            .execute(
                r#"
                CREATE TABLE IF NOT EXISTS videos (
                    id TEXT PRIMARY KEY,
                    trainer_id TEXT NOT NULL,
                    relative_path TEXT,
                    mime_type TEXT NOT NULL,
                    file_size BIGINT NOT NULL,
                    duration_sec INTEGER,
                    hls_manifest_path TEXT,
                    thumbnail_path TEXT,
                    transcoding_status VARCHAR(16) NOT NULL
                        CHECK (transcoding_status IN ('PENDING', 'PROCESSING', 'COMPLETED', 'FAILED')),
                    transcoding_error TEXT,
                    created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    transcoded_at TIMESTAMPTZ,
                    updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
                    CHECK ((hls_manifest_path IS NOT NULL) = (transcoding_status = 'COMPLETED')),
                    CHECK (transcoding_status <> 'FAILED' OR transcoding_error IS NOT NULL)
                )
                "#,
                &[],
            )
            .await?;

        client
            .execute(
                r#"
                CREATE INDEX IF NOT EXISTS idx_videos_trainer_id
                ON videos(trainer_id)
                "#,
                &[],
            )
            .await?;

        Ok(())
    }

    /// Run a guarded transition; zero rows means missing or not allowed
    async fn transition(
        &self,
        video_id: &str,
        next: TranscodingStatus,
        statement: &str,
        params: &[&(dyn tokio_postgres::types::ToSql + Sync)],
    ) -> Result<Video> {
        match self.client.query_opt(statement, params).await? {
            Some(row) => video_from_row(&row),
            None => match self.get(video_id).await? {
                Some(current) => Err(CoursecastError::InvalidTransition {
                    from: current.transcoding_status,
                    to: next,
                }
                .into()),
                None => Err(RepositoryError::NotFound(video_id.to_string())),
            },
        }
    }
}

fn video_from_row(row: &Row) -> Result<Video> {
    let status: String = row.try_get("transcoding_status")?;
    let file_size: i64 = row.try_get("file_size")?;
    let duration_sec: Option<i32> = row.try_get("duration_sec")?;

    Ok(Video {
        id: row.try_get("id")?,
        trainer_id: row.try_get("trainer_id")?,
        relative_path: row.try_get("relative_path")?,
        mime_type: row.try_get("mime_type")?,
        file_size: u64::try_from(file_size)
            .map_err(|_| RepositoryError::InvalidRow(format!("negative file_size {}", file_size)))?,
        duration_sec: duration_sec
            .map(u32::try_from)
            .transpose()
            .map_err(|_| RepositoryError::InvalidRow("negative duration_sec".to_string()))?,
        hls_manifest_path: row.try_get("hls_manifest_path")?,
        thumbnail_path: row.try_get("thumbnail_path")?,
        transcoding_status: status.parse()?,
        transcoding_error: row.try_get("transcoding_error")?,
        created_at: row.try_get("created_at")?,
        transcoded_at: row.try_get("transcoded_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl VideoRepository for PostgresVideoRepository {
    async fn register(&self, video: &Video) -> Result<()> {
        let inserted = self
            .client
            .execute(
                r#"
                INSERT INTO videos (id, trainer_id, relative_path, mime_type, file_size,
                                    transcoding_status, created_at, updated_at)
                VALUES ($1, $2, $3, $4, $5, 'PENDING', $6, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
                &[
                    &video.id,
                    &video.trainer_id,
                    &video.relative_path,
                    &video.mime_type,
                    &(video.file_size as i64),
                    &video.created_at,
                ],
            )
            .await?;

        if inserted == 0 {
            return Err(RepositoryError::AlreadyExists(video.id.clone()));
        }
        Ok(())
    }

    async fn get(&self, video_id: &str) -> Result<Option<Video>> {
        let statement = format!("SELECT {} FROM videos WHERE id = $1", VIDEO_COLUMNS);
        self.client
            .query_opt(statement.as_str(), &[&video_id])
            .await?
            .map(|row| video_from_row(&row))
            .transpose()
    }

    async fn mark_processing(&self, video_id: &str) -> Result<Video> {
        let statement = format!(
            r#"
            UPDATE videos
            SET transcoding_status = 'PROCESSING',
                transcoding_error = NULL,
                hls_manifest_path = NULL,
                updated_at = NOW()
            WHERE id = $1 AND transcoding_status IN ('PENDING', 'PROCESSING', 'FAILED')
            RETURNING {}
            "#,
            VIDEO_COLUMNS
        );
        self.transition(video_id, TranscodingStatus::Processing, &statement, &[&video_id])
            .await
    }

    async fn mark_completed(&self, video_id: &str, completed: &CompletedTranscode) -> Result<Video> {
        let statement = format!(
            r#"
            UPDATE videos
            SET transcoding_status = 'COMPLETED',
                hls_manifest_path = $2,
                thumbnail_path = $3,
                file_size = $4,
                duration_sec = COALESCE($5, duration_sec),
                transcoding_error = NULL,
                transcoded_at = NOW(),
                updated_at = NOW()
            WHERE id = $1 AND transcoding_status = 'PROCESSING'
            RETURNING {}
            "#,
            VIDEO_COLUMNS
        );
        let bundle_size = completed.bundle_size as i64;
        let duration_sec = completed.duration_sec.map(|d| d as i32);
        self.transition(
            video_id,
            TranscodingStatus::Completed,
            &statement,
            &[
                &video_id,
                &completed.hls_manifest_path,
                &completed.thumbnail_path,
                &bundle_size,
                &duration_sec,
            ],
        )
        .await
    }

    async fn mark_failed(&self, video_id: &str, error: &str) -> Result<Video> {
        let statement = format!(
            r#"
            UPDATE videos
            SET transcoding_status = 'FAILED',
                transcoding_error = $2,
                hls_manifest_path = NULL,
                updated_at = NOW()
            WHERE id = $1 AND transcoding_status = 'PROCESSING'
            RETURNING {}
            "#,
            VIDEO_COLUMNS
        );
        let error = coursecast_types::video::non_empty_error(error.to_string());
        self.transition(video_id, TranscodingStatus::Failed, &statement, &[&video_id, &error])
            .await
    }

    async fn clear_original(&self, video_id: &str) -> Result<()> {
        let updated = self
            .client
            .execute(
                "UPDATE videos SET relative_path = NULL, updated_at = NOW() WHERE id = $1",
                &[&video_id],
            )
            .await?;

        if updated == 0 {
            return Err(RepositoryError::NotFound(video_id.to_string()));
        }
        Ok(())
    }
}
