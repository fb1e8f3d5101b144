//! Storage layout for transcoded bundles
//!
//! `trainers/{trainerId}/videocourses/{videoId}/hls/{playlist.m3u8 | segment-NNN.ts | thumbnail.jpg}`
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


use crate::error::{CoursecastError, Result};

pub const MANIFEST_FILE_NAME: &str = "playlist.m3u8";
pub const THUMBNAIL_FILE_NAME: &str = "thumbnail.jpg";
/// printf-style pattern handed to the segmenter
pub const SEGMENT_FILE_PATTERN: &str = "segment-%03d.ts";

pub const MANIFEST_CONTENT_TYPE: &str = "application/vnd.apple.mpegurl";
pub const SEGMENT_CONTENT_TYPE: &str = "video/mp2t";
pub const THUMBNAIL_CONTENT_TYPE: &str = "image/jpeg";

/// Path prefix under which every artifact of one video lives
pub fn hls_prefix(trainer_id: &str, video_id: &str) -> Result<String> {
    validate_component(trainer_id)?;
    validate_component(video_id)?;
    Ok(format!("trainers/{}/videocourses/{}/hls", trainer_id, video_id))
}

pub fn manifest_path(trainer_id: &str, video_id: &str) -> Result<String> {
    object_path(trainer_id, video_id, MANIFEST_FILE_NAME)
}

pub fn thumbnail_path(trainer_id: &str, video_id: &str) -> Result<String> {
    object_path(trainer_id, video_id, THUMBNAIL_FILE_NAME)
}

pub fn object_path(trainer_id: &str, video_id: &str, file_name: &str) -> Result<String> {
    validate_component(file_name)?;
    Ok(format!("{}/{}", hls_prefix(trainer_id, video_id)?, file_name))
}

/// Directory part of a storage path (`""` when the path has no directory)
pub fn parent_dir(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Last path component
pub fn file_name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path,
    }
}

pub fn join(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir.trim_end_matches('/'), name.trim_start_matches('/'))
    }
}

/// Video id embedded in a manifest path laid out by [`manifest_path`]
pub fn video_id_from_manifest_path(path: &str) -> Option<String> {
    let mut parts = path.split('/').filter(|p| !p.is_empty());
    while let Some(part) = parts.next() {
        if part == "videocourses" {
            return parts.next().map(str::to_string);
        }
    }
    None
}

/// MIME type used when uploading a bundle file
pub fn content_type_for(file_name: &str) -> &'static str {
    match file_name.rsplit('.').next() {
        Some("m3u8") => MANIFEST_CONTENT_TYPE,
        Some("ts") => SEGMENT_CONTENT_TYPE,
        Some("jpg") | Some("jpeg") => THUMBNAIL_CONTENT_TYPE,
        _ => "application/octet-stream",
    }
}

fn validate_component(component: &str) -> Result<()> {
    if component.is_empty()
        || component == "."
        || component == ".."
        || component.contains('/')
        || component.contains('\\')
    {
        return Err(CoursecastError::InvalidStoragePath(component.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_path_layout() {
        assert_eq!(
            manifest_path("t1", "v1").unwrap(),
            "trainers/t1/videocourses/v1/hls/playlist.m3u8"
        );
        assert_eq!(
            thumbnail_path("t1", "v1").unwrap(),
            "trainers/t1/videocourses/v1/hls/thumbnail.jpg"
        );
    }

    #[test]
    fn test_traversal_components_rejected() {
        assert!(hls_prefix("..", "v1").is_err());
        assert!(hls_prefix("t1", "a/b").is_err());
        assert!(object_path("t1", "v1", "").is_err());
    }

    #[test]
    fn test_video_id_extraction() {
        assert_eq!(
            video_id_from_manifest_path("trainers/t1/videocourses/v9/hls/playlist.m3u8"),
            Some("v9".to_string())
        );
        assert_eq!(video_id_from_manifest_path("media/v9/playlist.m3u8"), None);
    }

    #[test]
    fn test_path_helpers() {
        assert_eq!(parent_dir("a/b/playlist.m3u8"), "a/b");
        assert_eq!(parent_dir("playlist.m3u8"), "");
        assert_eq!(file_name("a/b/segment-001.ts"), "segment-001.ts");
        assert_eq!(join("a/b", "c.ts"), "a/b/c.ts");
        assert_eq!(join("", "c.ts"), "c.ts");
        assert_eq!(content_type_for("segment-001.ts"), SEGMENT_CONTENT_TYPE);
        assert_eq!(content_type_for("playlist.m3u8"), MANIFEST_CONTENT_TYPE);
    }
}
