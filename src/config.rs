//! Session configuration.
//!
//! Use the builder-style setters to customize behavior, or `from_env()` to
//! read overrides from `CHATGATE_*` environment variables.
//!
//! # Example
//!
//! ```ignore
//! use chatgate::config::SessionConfig;
//! use std::time::Duration;
//!
//! let config = SessionConfig::new("https://chat.example.com")
//!     .with_refresh_threshold(0.75)
//!     .with_refresh_check_interval(Duration::from_secs(30));
//! ```

use std::path::PathBuf;
use std::time::Duration;

use crate::cache::RetryPolicy;

/// Default API base URL (local development server).
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Storage key holding the serialized credential pair.
pub const CREDENTIALS_KEY: &str = "session.credentials";

/// Settings for the session core.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionConfig {
    /// Base URL of the chat API, without trailing slash
    pub base_url: String,
    /// Path of the login endpoint
    pub login_path: String,
    /// Path of the token refresh endpoint
    pub refresh_path: String,
    /// Path of the logout endpoint
    pub logout_path: String,
    /// Storage key for the credential pair
    pub credentials_key: String,
    /// Directory for the file-backed store (None: `~/.chatgate`)
    pub data_dir: Option<PathBuf>,
    /// Lifetime assumed when the server reports none (default: 15 minutes)
    pub default_token_lifetime: Duration,
    /// Fraction of the lifetime after which a proactive refresh fires
    pub refresh_threshold: f64,
    /// How often the proactive refresh timer checks credential age
    pub refresh_check_interval: Duration,
    /// Per-request timeout for the production HTTP client
    pub http_timeout: Duration,
    /// Backoff policy for records that are not visible yet
    pub retry: RetryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_API_URL.to_string(),
            login_path: "/api/auth/login".to_string(),
            refresh_path: "/api/auth/refresh".to_string(),
            logout_path: "/api/auth/logout".to_string(),
            credentials_key: CREDENTIALS_KEY.to_string(),
            data_dir: None,
            default_token_lifetime: Duration::from_secs(15 * 60),
            refresh_threshold: 0.8,
            refresh_check_interval: Duration::from_secs(60),
            http_timeout: Duration::from_secs(30),
            retry: RetryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create a config for the API at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::default().with_base_url(base_url)
    }

    /// Set the API base URL. A trailing slash is dropped.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the data directory for the file-backed store.
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = Some(dir.into());
        self
    }

    /// Set the fallback token lifetime.
    pub fn with_default_token_lifetime(mut self, lifetime: Duration) -> Self {
        self.default_token_lifetime = lifetime;
        self
    }

    /// Set the proactive refresh threshold, clamped to `(0, 1]`.
    pub fn with_refresh_threshold(mut self, threshold: f64) -> Self {
        self.refresh_threshold = if threshold.is_finite() {
            threshold.clamp(0.01, 1.0)
        } else {
            0.8
        };
        self
    }

    /// Set how often the proactive refresh timer runs.
    pub fn with_refresh_check_interval(mut self, interval: Duration) -> Self {
        self.refresh_check_interval = interval;
        self
    }

    /// Set the per-request HTTP timeout.
    pub fn with_http_timeout(mut self, timeout: Duration) -> Self {
        self.http_timeout = timeout;
        self
    }

    /// Set the not-yet-visible retry policy.
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Absolute URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Create config from `CHATGATE_*` environment variables.
    ///
    /// Unset or unparsable variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(url) = env_string("CHATGATE_API_URL") {
            config = config.with_base_url(url);
        }
        if let Some(dir) = env_string("CHATGATE_DATA_DIR") {
            config = config.with_data_dir(dir);
        }
        if let Some(threshold) = env_parse::<f64>("CHATGATE_REFRESH_THRESHOLD") {
            config = config.with_refresh_threshold(threshold);
        }
        if let Some(secs) = env_parse::<u64>("CHATGATE_REFRESH_INTERVAL_SECS") {
            config = config.with_refresh_check_interval(Duration::from_secs(secs.max(1)));
        }
        if let Some(secs) = env_parse::<u64>("CHATGATE_HTTP_TIMEOUT_SECS") {
            config = config.with_http_timeout(Duration::from_secs(secs.max(1)));
        }

        config
    }
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    let value = env_string(name)?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={:?}", name, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    const VARS: [&str; 5] = [
        "CHATGATE_API_URL",
        "CHATGATE_DATA_DIR",
        "CHATGATE_REFRESH_THRESHOLD",
        "CHATGATE_REFRESH_INTERVAL_SECS",
        "CHATGATE_HTTP_TIMEOUT_SECS",
    ];

    fn clear_env() {
        for var in VARS {
            std::env::remove_var(var);
        }
    }

    #[test]
    fn test_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.base_url, DEFAULT_API_URL);
        assert_eq!(config.refresh_threshold, 0.8);
        assert_eq!(config.credentials_key, "session.credentials");
        assert_eq!(config.retry, RetryPolicy::default());
    }

    #[test]
    fn test_builder_and_url() {
        let config = SessionConfig::new("https://chat.example.com/")
            .with_refresh_threshold(7.0)
            .with_data_dir("/tmp/chatgate");

        assert_eq!(config.base_url, "https://chat.example.com");
        assert_eq!(config.refresh_threshold, 1.0);
        assert_eq!(config.data_dir, Some(PathBuf::from("/tmp/chatgate")));
        assert_eq!(
            config.url("/api/chats"),
            "https://chat.example.com/api/chats"
        );
    }

    #[test]
    #[serial]
    fn test_from_env_overrides() {
        clear_env();
        std::env::set_var("CHATGATE_API_URL", "https://api.test");
        std::env::set_var("CHATGATE_REFRESH_THRESHOLD", "0.5");
        std::env::set_var("CHATGATE_REFRESH_INTERVAL_SECS", "15");

        let config = SessionConfig::from_env();
        clear_env();

        assert_eq!(config.base_url, "https://api.test");
        assert_eq!(config.refresh_threshold, 0.5);
        assert_eq!(config.refresh_check_interval, Duration::from_secs(15));
    }

    #[test]
    #[serial]
    fn test_from_env_ignores_garbage() {
        clear_env();
        std::env::set_var("CHATGATE_HTTP_TIMEOUT_SECS", "soon");

        let config = SessionConfig::from_env();
        clear_env();

        assert_eq!(config.http_timeout, SessionConfig::default().http_timeout);
    }
}
