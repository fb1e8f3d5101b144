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

// Publish a transcoding job to the queue, optionally registering the
// PENDING video row first
//
// Usage: enqueue-transcode <video-id> <trainer-id> <original-path>
//        [--register] [--mime TYPE] [--size BYTES]
use anyhow::{anyhow, Context, Result};
use coursecast_config::AppConfig;
use coursecast_logging::init_console_logging;
use coursecast_types::{Event, TranscodingJobPayload, Video};
use job_queue_client::nats::NatsJobQueue;
use job_queue_client::JobQueue;
use std::time::Duration;
use tracing::info;
use transcoding_worker::{PostgresVideoRepository, VideoRepository};

struct Args {
    job: TranscodingJobPayload,
    register: bool,
    mime_type: String,
    file_size: u64,
}

fn usage() -> anyhow::Error {
    anyhow!(
        "usage: enqueue-transcode <video-id> <trainer-id> <original-path> \
         [--register] [--mime TYPE] [--size BYTES]"
    )
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Args> {
    let video_id = args.next().ok_or_else(usage)?;
    let trainer_id = args.next().ok_or_else(usage)?;
    let original_path = args.next().ok_or_else(usage)?;

    let mut parsed = Args {
        job: TranscodingJobPayload {
            video_id,
            trainer_id,
            original_path,
        },
        register: false,
        mime_type: "video/mp4".to_string(),
        file_size: 0,
    };

    while let Some(flag) = args.next() {
        match flag.as_str() {
            "--register" => parsed.register = true,
            "--mime" => parsed.mime_type = args.next().ok_or_else(usage)?,
            "--size" => {
                parsed.file_size = args
                    .next()
                    .ok_or_else(usage)?
                    .parse()
                    .context("--size must be a byte count")?
            }
            _ => return Err(usage()),
        }
    }

    parsed.job.validate().context("invalid job")?;
    Ok(parsed)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;

    let config = AppConfig::from_env()
        .map_err(|e| anyhow!("Failed to load configuration: {}", e))?;
    init_console_logging("enqueue-transcode", config.log_level());

    if args.register {
        let database_url = config
            .database_url
            .as_deref()
            .context("--register needs DATABASE_URL")?;
        let repository = PostgresVideoRepository::connect(database_url).await?;
        let video = Video::new_pending(
            &args.job.video_id,
            &args.job.trainer_id,
            &args.job.original_path,
            &args.mime_type,
            args.file_size,
        );
        repository.register(&video).await?;
        info!(video_id = args.job.video_id, "Registered PENDING video");
    }

    let queue = NatsJobQueue::new(
        config.message_bus_url(),
        config.message_bus.stream_name.clone(),
        config.message_bus.max_deliver,
        Duration::from_secs(config.message_bus.ack_wait_secs),
    )
    .await?;

    let event = Event::transcoding_job("enqueue-transcode", &args.job)?;
    queue.publish(&event).await?;

    info!(
        event_id = %event.event_id,
        video_id = args.job.video_id,
        trainer_id = args.job.trainer_id,
        original_path = args.job.original_path,
        "Transcoding job published"
    );

    Ok(())
}
