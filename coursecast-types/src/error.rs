//! Error types for Coursecast
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

use crate::video::TranscodingStatus;

/// Errors that can occur in Coursecast services
#[derive(Error, Debug)]
pub enum CoursecastError {
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid storage path: {0}")]
    InvalidStoragePath(String),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition {
        from: TranscodingStatus,
        to: TranscodingStatus,
    },

    #[error("Unknown transcoding status: {0}")]
    UnknownStatus(String),
}

pub type Result<T> = std::result::Result<T, CoursecastError>;
