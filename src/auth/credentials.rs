//! Credential pair and its durable store.
//!
//! The pair is persisted as one JSON document under a single well-known key
//! of the [`KeyValueStore`]. Absence of the key means "logged out".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::error::SyncResult;
use crate::traits::KeyValueStore;

/// Authentication credentials for the chat API.
///
/// Both tokens are always present together; "no credentials" is expressed
/// as `Option<Credentials>::None`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Short-lived token attached to every API call.
    pub access_token: String,
    /// Longer-lived token used only to obtain a new pair.
    pub refresh_token: String,
    /// When the server issued this pair.
    pub issued_at: DateTime<Utc>,
    /// Validity window of the access token, in seconds.
    pub expires_in: u64,
}

impl Credentials {
    /// Create a pair issued at `issued_at` and valid for `lifetime`.
    pub fn new(
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
        issued_at: DateTime<Utc>,
        lifetime: Duration,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
            issued_at,
            expires_in: lifetime.as_secs(),
        }
    }

    /// Validity window of the access token.
    pub fn lifetime(&self) -> Duration {
        Duration::from_secs(self.expires_in)
    }

    /// Instant after which the access token is expired. Lifetimes beyond
    /// the representable range saturate to `DateTime::<Utc>::MAX_UTC`.
    pub fn expires_at(&self) -> DateTime<Utc> {
        i64::try_from(self.expires_in)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| self.issued_at.checked_add_signed(lifetime))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    /// Age of the pair at `now`, as a fraction of its lifetime.
    ///
    /// A zero lifetime counts as fully aged. A pair issued in the future
    /// (clock skew) counts as brand new.
    pub fn age_fraction(&self, now: DateTime<Utc>) -> f64 {
        if self.expires_in == 0 {
            return 1.0;
        }
        let age_ms = (now - self.issued_at).num_milliseconds().max(0) as f64;
        age_ms / (self.expires_in as f64 * 1000.0)
    }

    /// Check if the access token is expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at()
    }

    /// Check if the pair is older than `threshold` of its lifetime.
    pub fn needs_refresh(&self, now: DateTime<Utc>, threshold: f64) -> bool {
        self.age_fraction(now) >= threshold
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("issued_at", &self.issued_at)
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Durable holder of the current credential pair.
///
/// Pure get/set/clear: no network, no policy. Clones share the same
/// underlying store.
#[derive(Clone)]
pub struct CredentialStore {
    kv: Arc<dyn KeyValueStore>,
    key: String,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("key", &self.key)
            .finish()
    }
}

impl CredentialStore {
    /// Create a store keeping the pair under `key`.
    pub fn new(kv: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// The storage key in use.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Load the current pair.
    ///
    /// A stored value that does not parse is treated as absent.
    pub async fn load(&self) -> SyncResult<Option<Credentials>> {
        let Some(raw) = self.kv.get(&self.key).await? else {
            return Ok(None);
        };

        match serde_json::from_str::<Credentials>(&raw) {
            Ok(creds) => Ok(Some(creds)),
            Err(e) => {
                warn!("Ignoring malformed credentials under '{}': {}", self.key, e);
                Ok(None)
            }
        }
    }

    /// Persist `creds`, replacing any previous pair.
    pub async fn save(&self, creds: &Credentials) -> SyncResult<()> {
        let raw = serde_json::to_string(creds).map_err(|e| crate::error::SyncError::Storage {
            message: format!("Failed to serialize credentials: {}", e),
        })?;
        self.kv.set(&self.key, &raw).await?;
        Ok(())
    }

    /// Remove the stored pair.
    pub async fn clear(&self) -> SyncResult<()> {
        self.kv.remove(&self.key).await?;
        Ok(())
    }
}
