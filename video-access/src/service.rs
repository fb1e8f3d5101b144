//! Token and signature service
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


use chrono::{DateTime, TimeZone, Utc};
use coursecast_config::{Environment, VideoAccessConfig};
use hmac::{Hmac, Mac};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::fmt;
use tracing::debug;
use url::Url;

use crate::error::{AccessError, Result};
use crate::secret;

type HmacSha256 = Hmac<Sha256>;

/// Query parameter carrying the token in signed URLs
pub const TOKEN_QUERY_PARAM: &str = "token";

pub const DEFAULT_TTL_MINUTES: u64 = 60;

/// Longest TTL a token may be minted with (one year)
pub const MAX_TTL_MINUTES: u64 = 525_600;

const TOKEN_ALGORITHM: Algorithm = Algorithm::HS256;

/// Signed claim set. `exp` is the token format's own expiry (seconds),
/// `expiresAt` the embedded one (milliseconds); both are always equal.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoClaims {
    video_id: String,
    user_id: String,
    expires_at: i64,
    iat: i64,
    exp: i64,
}

/// Verified content of an access token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenPayload {
    pub video_id: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

/// Stateless signer/verifier of playback capabilities
///
/// Holds only the immutable secret, so one instance can be shared freely
/// across threads. Outstanding tokens can only be revoked by rotating the
/// secret.
#[derive(Clone)]
pub struct VideoAccessService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    mac: HmacSha256,
    default_ttl_minutes: u64,
}

impl VideoAccessService {
    /// Build from an explicit secret of at least 32 characters
    pub fn new(secret: &str) -> Result<Self> {
        secret::validate_secret(secret)?;
        let mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|e| AccessError::InvalidKey(e.to_string()))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            mac,
            default_ttl_minutes: DEFAULT_TTL_MINUTES,
        })
    }

    /// Build from configuration, applying the environment's secret policy
    pub fn from_config(config: &VideoAccessConfig, environment: Environment) -> Result<Self> {
        let secret = secret::resolve_secret(config.secret.as_deref(), environment)?;
        Ok(Self::new(&secret)?.with_default_ttl(config.default_ttl_minutes))
    }

    pub fn with_default_ttl(mut self, ttl_minutes: u64) -> Self {
        self.default_ttl_minutes = ttl_minutes;
        self
    }

    pub fn default_ttl_minutes(&self) -> u64 {
        self.default_ttl_minutes
    }

    /// Mint a token for `(video_id, user_id)` valid for `ttl_minutes`
    ///
    /// A TTL of zero mints a token that is already expired.
    pub fn generate_token(&self, video_id: &str, user_id: &str, ttl_minutes: u64) -> Result<String> {
        if ttl_minutes > MAX_TTL_MINUTES {
            return Err(AccessError::InvalidTtl(ttl_minutes));
        }

        let now = Utc::now();
        let expires_at = now + chrono::Duration::minutes(ttl_minutes as i64);
        let claims = VideoClaims {
            video_id: video_id.to_string(),
            user_id: user_id.to_string(),
            expires_at: expires_at.timestamp_millis(),
            iat: now.timestamp(),
            exp: expires_at.timestamp(),
        };

        let token = encode(&Header::new(TOKEN_ALGORITHM), &claims, &self.encoding_key)?;
        debug!(video_id = video_id, ttl_minutes = ttl_minutes, "Access token generated");
        Ok(token)
    }

    /// Mint a token with the service's default TTL
    pub fn generate_default_token(&self, video_id: &str, user_id: &str) -> Result<String> {
        self.generate_token(video_id, user_id, self.default_ttl_minutes)
    }

    /// Verify a token; any failure yields `None`
    pub fn verify_token(&self, token: &str) -> Option<AccessTokenPayload> {
        let mut validation = Validation::new(TOKEN_ALGORITHM);
        validation.leeway = 0;

        let claims = match decode::<VideoClaims>(token, &self.decoding_key, &validation) {
            Ok(data) => data.claims,
            Err(e) => {
                debug!(error = %e, "Access token rejected");
                return None;
            }
        };

        let now_ms = Utc::now().timestamp_millis();
        if claims.expires_at <= now_ms {
            debug!(video_id = %claims.video_id, "Access token past its expiresAt");
            return None;
        }

        let expires_at = Utc.timestamp_millis_opt(claims.expires_at).single()?;
        Some(AccessTokenPayload {
            video_id: claims.video_id,
            user_id: claims.user_id,
            expires_at,
        })
    }

    /// Verify a token and require it to be bound to `video_id`
    pub fn verify_token_for_video(&self, token: &str, video_id: &str) -> Option<AccessTokenPayload> {
        self.verify_token(token)
            .filter(|payload| payload.video_id == video_id)
    }

    /// `{base_url}?token={jwt}` (or `&token=` when the base already has a query)
    pub fn generate_signed_url(
        &self,
        base_url: &str,
        video_id: &str,
        user_id: &str,
        ttl_minutes: u64,
    ) -> Result<String> {
        let token = self.generate_token(video_id, user_id, ttl_minutes)?;
        let separator = if base_url.contains('?') { '&' } else { '?' };
        Ok(format!("{}{}{}={}", base_url, separator, TOKEN_QUERY_PARAM, token))
    }

    /// Extract the token from a signed URL and verify it
    ///
    /// Accepts absolute URLs and root-relative paths.
    pub fn verify_signed_url(&self, url: &str) -> Option<AccessTokenPayload> {
        let parsed = match Url::parse(url) {
            Ok(parsed) => parsed,
            Err(url::ParseError::RelativeUrlWithoutBase) if url.starts_with('/') => {
                Url::parse("http://localhost").ok()?.join(url).ok()?
            }
            Err(e) => {
                debug!(error = %e, "Malformed signed URL");
                return None;
            }
        };

        let token = parsed
            .query_pairs()
            .find(|(key, _)| key == TOKEN_QUERY_PARAM)
            .map(|(_, value)| value.into_owned())?;

        self.verify_token(&token)
    }

    /// Hex HMAC-SHA256 of `data` under the service secret
    pub fn generate_hmac_signature(&self, data: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Constant-time check of a hex signature
    pub fn verify_hmac_signature(&self, data: &str, signature: &str) -> bool {
        let expected = match hex::decode(signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };
        let mut mac = self.mac.clone();
        mac.update(data.as_bytes());
        mac.verify_slice(&expected).is_ok()
    }
}

impl fmt::Debug for VideoAccessService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VideoAccessService")
            .field("default_ttl_minutes", &self.default_ttl_minutes)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "0123456789abcdef-coursecast-test-secret";

    fn service() -> VideoAccessService {
        VideoAccessService::new(SECRET).unwrap()
    }

    #[test]
    fn test_token_round_trip() {
        let service = service();
        let token = service.generate_token("v1", "u1", 60).unwrap();
        let payload = service.verify_token(&token).unwrap();
        assert_eq!(payload.video_id, "v1");
        assert_eq!(payload.user_id, "u1");
        assert!(payload.expires_at > Utc::now());
    }

    #[test]
    fn test_zero_ttl_fails_immediately() {
        let service = service();
        let token = service.generate_token("v1", "u1", 0).unwrap();
        assert!(service.verify_token(&token).is_none());
    }

    #[test]
    fn test_excessive_ttl_rejected() {
        assert!(matches!(
            service().generate_token("v1", "u1", MAX_TTL_MINUTES + 1),
            Err(AccessError::InvalidTtl(_))
        ));
    }

    #[test]
    fn test_inner_expiry_enforced_even_with_valid_signature() {
        let service = service();
        let now = Utc::now();
        let claims = VideoClaims {
            video_id: "v1".to_string(),
            user_id: "u1".to_string(),
            expires_at: (now - chrono::Duration::minutes(1)).timestamp_millis(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(10)).timestamp(),
        };
        let token = encode(&Header::new(TOKEN_ALGORITHM), &claims, &service.encoding_key).unwrap();
        assert!(service.verify_token(&token).is_none());
    }

    #[test]
    fn test_other_secret_rejected() {
        let token = service().generate_token("v1", "u1", 60).unwrap();
        let other = VideoAccessService::new("another-secret-of-sufficient-length!").unwrap();
        assert!(other.verify_token(&token).is_none());
    }

    #[test]
    fn test_other_algorithm_rejected() {
        let now = Utc::now();
        let claims = VideoClaims {
            video_id: "v1".to_string(),
            user_id: "u1".to_string(),
            expires_at: (now + chrono::Duration::minutes(10)).timestamp_millis(),
            iat: now.timestamp(),
            exp: (now + chrono::Duration::minutes(10)).timestamp(),
        };
        let token = encode(
            &Header::new(Algorithm::HS512),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap();
        assert!(service().verify_token(&token).is_none());
    }

    #[test]
    fn test_garbage_tokens_rejected() {
        let service = service();
        for token in ["", "abc", "a.b.c", "....", "eyJhbGciOiJIUzI1NiJ9.e30."] {
            assert!(service.verify_token(token).is_none(), "accepted {:?}", token);
        }
    }

    #[test]
    fn test_token_bound_to_video() {
        let service = service();
        let token = service.generate_token("v1", "u1", 60).unwrap();
        assert!(service.verify_token_for_video(&token, "v1").is_some());
        assert!(service.verify_token_for_video(&token, "v2").is_none());
    }

    #[test]
    fn test_signed_url_round_trip() {
        let service = service();
        let url = service
            .generate_signed_url("https://cdn.example.com/hls/playlist.m3u8", "v1", "u1", 60)
            .unwrap();
        assert!(url.starts_with("https://cdn.example.com/hls/playlist.m3u8?token="));
        let payload = service.verify_signed_url(&url).unwrap();
        assert_eq!(payload.video_id, "v1");

        let relative = service
            .generate_signed_url("/api/videos/v1/manifest?quality=auto", "v1", "u1", 60)
            .unwrap();
        assert!(relative.contains("?quality=auto&token="));
        assert!(service.verify_signed_url(&relative).is_some());
    }

    #[test]
    fn test_signed_url_malformed_inputs() {
        let service = service();
        assert!(service.verify_signed_url("not a url").is_none());
        assert!(service.verify_signed_url("https://cdn.example.com/playlist.m3u8").is_none());
        assert!(service
            .verify_signed_url("https://cdn.example.com/playlist.m3u8?token=")
            .is_none());
    }

    #[test]
    fn test_hmac_signature() {
        let service = service();
        let signature = service.generate_hmac_signature("trainers/t1/videocourses/v1");
        assert_eq!(signature.len(), 64);
        assert!(service.verify_hmac_signature("trainers/t1/videocourses/v1", &signature));
        assert!(!service.verify_hmac_signature("trainers/t1/videocourses/v2", &signature));
        assert!(!service.verify_hmac_signature("trainers/t1/videocourses/v1", "zz"));
        assert!(!service.verify_hmac_signature("trainers/t1/videocourses/v1", ""));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(matches!(
            VideoAccessService::new("short"),
            Err(AccessError::SecretTooShort { .. })
        ));
    }
}
