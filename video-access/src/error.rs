//! Error types for video access
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


use thiserror::Error;

/// Errors raised while building the service or minting tokens
///
/// Verification never surfaces these; it fails closed to `None`/`false`.
#[derive(Error, Debug)]
pub enum AccessError {
    #[error("VIDEO_ACCESS_SECRET is required in production")]
    MissingSecret,

    #[error("Secret must be at least {min} characters, got {actual}")]
    SecretTooShort { min: usize, actual: usize },

    #[error("Invalid TTL: {0} minutes")]
    InvalidTtl(u64),

    #[error("Token encoding failed: {0}")]
    Encoding(#[from] jsonwebtoken::errors::Error),

    #[error("Invalid signing key: {0}")]
    InvalidKey(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, AccessError>;
