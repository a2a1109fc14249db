//! Wire types for the authentication endpoints.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::credentials::Credentials;
use crate::error::{SyncError, SyncResult};

/// Body of `POST /api/auth/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

/// Body of `POST /api/auth/refresh`.
#[derive(Debug, Clone, Serialize)]
pub struct RefreshRequest<'a> {
    pub refresh_token: &'a str,
}

/// Response from the login and refresh endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Absent when the server does not rotate refresh tokens
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>, // API may not return this; decode from JWT
}

impl TokenResponse {
    /// Build the credential pair this response grants.
    ///
    /// `previous_refresh` is kept when the response carries no rotated
    /// refresh token. The lifetime comes from `expires_in`, then the JWT
    /// `exp` claim, then `default_lifetime`.
    pub fn into_credentials(
        self,
        issued_at: DateTime<Utc>,
        previous_refresh: Option<&str>,
        default_lifetime: Duration,
    ) -> SyncResult<Credentials> {
        if self.access_token.is_empty() {
            return Err(SyncError::InvalidResponse {
                message: "token response carries an empty access_token".to_string(),
            });
        }

        let refresh_token = match (self.refresh_token, previous_refresh) {
            (Some(token), _) if !token.is_empty() => token,
            (_, Some(previous)) => previous.to_string(),
            _ => {
                return Err(SyncError::InvalidResponse {
                    message: "token response carries no refresh_token".to_string(),
                })
            }
        };

        let lifetime = self
            .expires_in
            .or_else(|| get_jwt_expires_in(&self.access_token, issued_at))
            .map(Duration::from_secs)
            .unwrap_or(default_lifetime);

        Ok(Credentials::new(
            self.access_token,
            refresh_token,
            issued_at,
            lifetime,
        ))
    }
}

/// JWT claims for extracting expiration time.
#[derive(Deserialize)]
struct JwtClaims {
    exp: i64,
}

/// Extract the remaining lifetime from a JWT access token.
///
/// Returns the number of seconds between `now` and the `exp` claim (zero if
/// already past), or None if the token is not a decodable JWT.
pub fn get_jwt_expires_in(access_token: &str, now: DateTime<Utc>) -> Option<u64> {
    let parts: Vec<&str> = access_token.split('.').collect();
    if parts.len() != 3 {
        return None;
    }
    let payload = URL_SAFE_NO_PAD.decode(parts[1]).ok()?;
    let claims: JwtClaims = serde_json::from_slice(&payload).ok()?;
    Some(claims.exp.saturating_sub(now.timestamp()).max(0) as u64)
}
