//! HLS manifest tooling
//!
//! Every non-empty line that does not start with `#` is a segment
//! reference. References may be bare names, relative paths or absolute
//! URLs; offline playback only needs the final file name.
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


use coursecast_types::layout;
use sha2::{Digest, Sha256};

use crate::error::{DownloadError, Result};

/// Hex characters of the SHA-256 digest kept as the bundle version
pub const VERSION_HEX_LEN: usize = 16;

fn is_segment_line(line: &str) -> bool {
    !line.is_empty() && !line.starts_with('#')
}

/// Segment references in manifest order
pub fn segment_references(manifest: &str) -> Vec<&str> {
    manifest
        .lines()
        .map(str::trim)
        .filter(|line| is_segment_line(line))
        .collect()
}

/// Like [`segment_references`], but a manifest with no segments, or with a
/// reference that has no usable file name, is an error
pub fn parse_segments(manifest: &str) -> Result<Vec<&str>> {
    let segments = segment_references(manifest);
    if segments.is_empty() {
        return Err(DownloadError::MalformedManifest(
            "manifest references no segments".to_string(),
        ));
    }
    if let Some(bad) = segments
        .iter()
        .find(|reference| !is_usable_file_name(local_file_name(reference)))
    {
        return Err(DownloadError::MalformedManifest(format!(
            "segment reference without a file name: {}",
            bad
        )));
    }
    Ok(segments)
}

fn is_usable_file_name(name: &str) -> bool {
    !name.is_empty() && !name.starts_with('.') && !name.contains('\\')
}

/// Bare file name of a segment reference, without any query or fragment
pub fn local_file_name(reference: &str) -> &str {
    let without_query = reference
        .split(|c| c == '?' || c == '#')
        .next()
        .unwrap_or(reference);
    layout::file_name(without_query)
}

/// Storage path of a segment: the manifest's directory joined with the
/// segment's file name
pub fn segment_storage_path(manifest_path: &str, reference: &str) -> String {
    layout::join(layout::parent_dir(manifest_path), local_file_name(reference))
}

/// Rewrite every segment reference to its bare file name
pub fn rewrite_for_offline(manifest: &str) -> String {
    let mut rewritten = String::with_capacity(manifest.len());
    for line in manifest.lines() {
        let trimmed = line.trim();
        if is_segment_line(trimmed) {
            rewritten.push_str(local_file_name(trimmed));
        } else {
            rewritten.push_str(line);
        }
        rewritten.push('\n');
    }
    rewritten
}

/// First 16 hex characters of the SHA-256 of a (rewritten) manifest
pub fn bundle_version(rewritten_manifest: &str) -> String {
    let digest = Sha256::digest(rewritten_manifest.as_bytes());
    let mut version = hex::encode(digest);
    version.truncate(VERSION_HEX_LEN);
    version
}
