//! Signing secret policy
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


use coursecast_config::Environment;
use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::warn;

use crate::error::{AccessError, Result};

/// Minimum accepted secret length in characters
pub const MIN_SECRET_LENGTH: usize = 32;

const GENERATED_SECRET_LENGTH: usize = 64;

/// Longest run of one repeated character tolerated without a warning
const MAX_REPEAT_RUN: usize = 8;

/// Resolve the signing secret for an environment
///
/// * A configured secret must be at least [`MIN_SECRET_LENGTH`] characters.
/// * Missing in production is fatal.
/// * Missing elsewhere yields a random per-process secret, so tokens minted
///   by this process do not verify in any other.
pub fn resolve_secret(configured: Option<&str>, environment: Environment) -> Result<String> {
    match configured.map(str::trim).filter(|s| !s.is_empty()) {
        Some(secret) => {
            validate_secret(secret)?;
            if looks_low_entropy(secret) {
                warn!("VIDEO_ACCESS_SECRET passes the length check but looks low-entropy");
            }
            Ok(secret.to_string())
        }
        None if environment.is_production() => Err(AccessError::MissingSecret),
        None => {
            warn!(
                environment = ?environment,
                "VIDEO_ACCESS_SECRET not set, generating a random per-process secret; \
                 tokens will not validate across restarts or other instances"
            );
            Ok(generate_secret())
        }
    }
}

pub fn validate_secret(secret: &str) -> Result<()> {
    let actual = secret.chars().count();
    if actual < MIN_SECRET_LENGTH {
        return Err(AccessError::SecretTooShort {
            min: MIN_SECRET_LENGTH,
            actual,
        });
    }
    Ok(())
}

/// Random alphanumeric secret
pub fn generate_secret() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LENGTH)
        .map(char::from)
        .collect()
}

/// Long single-character runs or very few distinct characters
pub fn looks_low_entropy(secret: &str) -> bool {
    let mut longest = 0;
    let mut run = 0;
    let mut previous = None;
    for c in secret.chars() {
        if Some(c) == previous {
            run += 1;
        } else {
            run = 1;
            previous = Some(c);
        }
        longest = longest.max(run);
    }

    let mut distinct: Vec<char> = secret.chars().collect();
    distinct.sort_unstable();
    distinct.dedup();

    longest > MAX_REPEAT_RUN || distinct.len() < 8
}
