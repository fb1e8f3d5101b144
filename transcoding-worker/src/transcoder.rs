//! Transcoder - probing and HLS segmentation through FFmpeg
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
use coursecast_config::TranscodeConfig;
use coursecast_types::layout::{MANIFEST_FILE_NAME, SEGMENT_FILE_PATTERN};
use serde::Deserialize;
use std::ffi::OsString;
use std::path::Path;
use thiserror::Error;
use tokio::process::Command;
use tracing::{debug, info};

/// Target segment duration in seconds
pub const HLS_SEGMENT_SECONDS: u32 = 6;

/// Lines of encoder stderr kept in error messages
const STDERR_TAIL_LINES: usize = 8;

#[derive(Error, Debug)]
pub enum TranscodeError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("Unparsable probe output: {0}")]
    ProbeOutput(String),

    #[error("No video stream in input")]
    NoVideoStream,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, TranscodeError>;

/// What the worker needs to know about a source video
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeInfo {
    pub width: u32,
    pub height: u32,
    /// Whole seconds; `None` when the container does not report it
    pub duration_sec: Option<u32>,
}

/// Encoder capability used by the processor
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn probe(&self, input: &Path) -> Result<ProbeInfo>;

    async fn probe_height(&self, input: &Path) -> Result<u32> {
        Ok(self.probe(input).await?.height)
    }

    /// Segment `input` into `out_dir/playlist.m3u8` plus `segment-NNN.ts`
    /// files, encoded at `height`
    async fn transcode_to_hls(&self, input: &Path, out_dir: &Path, height: u32) -> Result<()>;

    /// Write a small JPEG of the first frame to `output`
    async fn extract_thumbnail(&self, input: &Path, output: &Path) -> Result<()>;
}

#[derive(Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    #[serde(default)]
    tags: Option<ProbeTags>,
    #[serde(default)]
    side_data_list: Vec<ProbeSideData>,
}

#[derive(Deserialize)]
struct ProbeTags {
    rotate: Option<String>,
}

#[derive(Deserialize)]
struct ProbeSideData {
    rotation: Option<f64>,
}

impl ProbeStream {
    /// Display rotation in degrees, normalized to `0..360`
    fn rotation(&self) -> i32 {
        let degrees = self
            .side_data_list
            .iter()
            .find_map(|d| d.rotation)
            .map(|r| r.round() as i32)
            .or_else(|| {
                self.tags
                    .as_ref()
                    .and_then(|t| t.rotate.as_deref())
                    .and_then(|r| r.trim().parse::<i32>().ok())
            })
            .unwrap_or(0);
        degrees.rem_euclid(360)
    }
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// FFmpeg/FFprobe subprocess transcoder
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    threads: u32,
    nice_level: i32,
    idle_io_priority: bool,
}

impl FfmpegTranscoder {
    pub fn new(config: &TranscodeConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            ffprobe_path: config.ffprobe_path.clone(),
            threads: config.threads.max(1),
            nice_level: config.nice_level,
            idle_io_priority: config.idle_io_priority,
        }
    }

    /// Encoder invocation, wrapped in `ionice -c3` and `nice` when
    /// configured
    fn encoder_command(&self, args: Vec<OsString>) -> Command {
        let mut chain: Vec<OsString> = Vec::new();
        if self.idle_io_priority {
            chain.extend([OsString::from("ionice"), OsString::from("-c3")]);
        }
        if self.nice_level > 0 {
            chain.extend([
                OsString::from("nice"),
                OsString::from("-n"),
                OsString::from(self.nice_level.to_string()),
            ]);
        }
        chain.push(self.ffmpeg_path.clone().into());

        let mut command = Command::new(&chain[0]);
        command.args(&chain[1..]).args(args).kill_on_drop(true);
        command
    }

    fn hls_args(&self, input: &Path, out_dir: &Path, height: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-hide_banner".into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "0:a:0?".into(),
            "-threads".into(),
            self.threads.to_string().into(),
            "-c:v".into(),
            "libx264".into(),
            "-preset".into(),
            "veryfast".into(),
            "-profile:v".into(),
            "main".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            // Source resolution; x264 needs even dimensions
            "-vf".into(),
            format!("scale=-2:{}", even_height(height)).into(),
            "-c:a".into(),
            "aac".into(),
            "-b:a".into(),
            "128k".into(),
            "-ac".into(),
            "2".into(),
            "-f".into(),
            "hls".into(),
            "-hls_time".into(),
            HLS_SEGMENT_SECONDS.to_string().into(),
            "-hls_playlist_type".into(),
            "vod".into(),
            "-hls_list_size".into(),
            "0".into(),
            "-hls_segment_filename".into(),
        ];
        args.push(out_dir.join(SEGMENT_FILE_PATTERN).into_os_string());
        args.push(out_dir.join(MANIFEST_FILE_NAME).into_os_string());
        args
    }

    fn thumbnail_args(&self, input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-hide_banner".into(),
            "-y".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-threads".into(),
            self.threads.to_string().into(),
            "-frames:v".into(),
            "1".into(),
            "-vf".into(),
            "scale=320:-2".into(),
            "-q:v".into(),
            "5".into(),
            output.as_os_str().to_owned(),
        ]
    }

    async fn run(&self, program: &str, mut command: Command) -> Result<std::process::Output> {
        let output = command.output().await.map_err(|source| TranscodeError::Spawn {
            program: program.to_string(),
            source,
        })?;

        if !output.status.success() {
            return Err(TranscodeError::Failed {
                program: program.to_string(),
                status: output.status.to_string(),
                stderr: stderr_tail(&output.stderr),
            });
        }
        Ok(output)
    }
}

/// Largest even height not above `height`
fn even_height(height: u32) -> u32 {
    (height & !1).max(2)
}

/// Last few non-empty lines of a process's stderr
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "no output".to_string()
    } else {
        tail
    }
}

fn parse_probe_output(stdout: &[u8]) -> Result<ProbeInfo> {
    let parsed: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| TranscodeError::ProbeOutput(e.to_string()))?;

    let stream = parsed
        .streams
        .into_iter()
        .find(|s| s.height.unwrap_or(0) > 0)
        .ok_or(TranscodeError::NoVideoStream)?;

    let duration_sec = parsed
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.trim().parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(|d| d.round() as u32);

    // FFmpeg auto-rotates on decode, so report the displayed dimensions
    let (width, height) = match stream.rotation() {
        90 | 270 => (stream.height.unwrap_or(0), stream.width.unwrap_or(0)),
        _ => (stream.width.unwrap_or(0), stream.height.unwrap_or(0)),
    };

    Ok(ProbeInfo {
        width,
        height,
        duration_sec,
    })
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn probe(&self, input: &Path) -> Result<ProbeInfo> {
        let mut command = Command::new(&self.ffprobe_path);
        command
            .args([
                "-v",
                "error",
                "-select_streams",
                "v:0",
                "-show_entries",
                "stream=width,height:stream_tags=rotate:stream_side_data=rotation:format=duration",
                "-of",
                "json",
            ])
            .arg(input)
            .kill_on_drop(true);

        let output = self.run(&self.ffprobe_path, command).await?;
        let info = parse_probe_output(&output.stdout)?;

        debug!(
            input = %input.display(),
            width = info.width,
            height = info.height,
            duration_sec = ?info.duration_sec,
            "Probed source video"
        );
        Ok(info)
    }

    async fn transcode_to_hls(&self, input: &Path, out_dir: &Path, height: u32) -> Result<()> {
        tokio::fs::create_dir_all(out_dir).await?;

        info!(
            input = %input.display(),
            height = height,
            threads = self.threads,
            nice = self.nice_level,
            idle_io = self.idle_io_priority,
            "Transcoding to HLS"
        );

        let command = self.encoder_command(self.hls_args(input, out_dir, height));
        self.run(&self.ffmpeg_path, command).await?;

        info!(out_dir = %out_dir.display(), "HLS transcoding completed");
        Ok(())
    }

    async fn extract_thumbnail(&self, input: &Path, output: &Path) -> Result<()> {
        let command = self.encoder_command(self.thumbnail_args(input, output));
        self.run(&self.ffmpeg_path, command).await?;
        Ok(())
    }
}
