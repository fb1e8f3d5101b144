//! Retry logic with exponential backoff for offline downloads
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


use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Retry configuration for one file download
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first one
    pub max_attempts: u32,
    /// Delay before the second attempt
    pub initial_delay: Duration,
    /// Cap for exponential backoff
    pub max_delay: Duration,
    /// Multiplier for exponential backoff (2.0 doubles)
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration, multiplier: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay,
            multiplier,
        }
    }

    /// Five attempts with no waiting between them
    pub fn immediate() -> Self {
        Self::new(5, Duration::ZERO, Duration::ZERO, 2.0)
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    pub fn delay_after_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        // initial_delay * (multiplier ^ (attempt - 1))
        let factor = self.multiplier.powi(attempt.saturating_sub(1).min(30) as i32);
        let delay = self.initial_delay.as_secs_f64() * factor;
        // Negative or NaN factors mean no wait
        if delay.is_nan() {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()).max(0.0))
    }
}

/// Retry an operation with exponential backoff
///
/// Every error is treated as transient; the last one is returned once the
/// attempts are exhausted.
pub async fn retry_with_backoff<F, Fut, T, E>(config: &RetryConfig, label: &str, mut f: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(result) => {
                if attempt > 1 {
                    debug!(file = label, attempt = attempt, "Download succeeded after retry");
                }
                return Ok(result);
            }
            Err(e) if attempt >= max_attempts => {
                warn!(
                    file = label,
                    attempts = attempt,
                    error = %e,
                    "Download failed after all retry attempts"
                );
                return Err(e);
            }
            Err(e) => {
                let delay = config.delay_after_attempt(attempt);
                warn!(
                    file = label,
                    attempt = attempt,
                    max_attempts = max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Download failed, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
        }
    }
}
