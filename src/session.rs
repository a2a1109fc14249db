//! The session service.
//!
//! [`ChatSession`] wires the credential store, refresh coordinator,
//! authenticated transport and entity cache around injected collaborators,
//! and owns the login/logout lifecycle.
//!
//! # Example
//!
//! ```ignore
//! use chatgate::config::SessionConfig;
//! use chatgate::models::RecordKind;
//! use chatgate::session::ChatSession;
//!
//! let session = ChatSession::from_config(SessionConfig::from_env())?;
//! session.login("ada", "secret").await?;
//! session.start_proactive_refresh();
//! let chat = session.cache().create(RecordKind::Chat, json!({"title": "hi"})).await?;
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

use crate::adapters::{FileKeyValueStore, ReqwestHttpClient, SystemClock};
use crate::auth::api::{LoginRequest, TokenResponse};
use crate::auth::{CredentialStore, Credentials, ProactiveRefreshHandle, RefreshCoordinator};
use crate::cache::EntitySyncCache;
use crate::config::SessionConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::ApiErrorBody;
use crate::traits::{Clock, Headers, HttpClient, KeyValueStore};
use crate::transport::AuthenticatedTransport;

pub struct ChatSession {
    config: SessionConfig,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    credentials: CredentialStore,
    refresher: RefreshCoordinator,
    transport: AuthenticatedTransport,
    cache: EntitySyncCache,
    proactive: Mutex<Option<ProactiveRefreshHandle>>,
}

impl std::fmt::Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("config", &self.config)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ChatSession {
    /// Build a session around explicit collaborators.
    pub fn new(
        config: SessionConfig,
        http: Arc<dyn HttpClient>,
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let credentials = CredentialStore::new(store, config.credentials_key.clone());
        let refresher =
            RefreshCoordinator::new(http.clone(), credentials.clone(), clock.clone(), &config);
        let transport =
            AuthenticatedTransport::new(http.clone(), refresher.clone(), config.base_url.clone());
        let cache = EntitySyncCache::new(transport.clone(), config.retry);

        Self {
            config,
            http,
            clock,
            credentials,
            refresher,
            transport,
            cache,
            proactive: Mutex::new(None),
        }
    }

    /// Build a session with the production adapters: reqwest, a file store
    /// under the data directory, and the system clock.
    pub fn from_config(config: SessionConfig) -> SyncResult<Self> {
        let http = ReqwestHttpClient::with_timeout(config.http_timeout)?;
        let store = match &config.data_dir {
            Some(dir) => FileKeyValueStore::with_dir(dir),
            None => FileKeyValueStore::new()?,
        };
        info!("Session data in {}", store.dir().display());

        Ok(Self::new(
            config,
            Arc::new(http),
            Arc::new(store),
            Arc::new(SystemClock),
        ))
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.credentials
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    pub fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    pub fn cache(&self) -> &EntitySyncCache {
        &self.cache
    }

    /// Exchange a username and password for a credential pair.
    ///
    /// The pair is persisted and the record cache reset on success.
    pub async fn login(&self, username: &str, password: &str) -> SyncResult<Credentials> {
        let url = self.config.url(&self.config.login_path);
        let body = serde_json::to_string(&LoginRequest { username, password }).map_err(|e| {
            SyncError::ValidationFailure {
                message: e.to_string(),
            }
        })?;

        let response = self.http.post(&url, &body, &Headers::new()).await?;
        if !response.is_success() {
            let message = ApiErrorBody::from_response(&response).describe(&response);
            warn!("Login rejected ({}): {}", response.status, message);
            return Err(match response.status {
                401 => SyncError::Unauthenticated,
                400 | 422 => SyncError::ValidationFailure { message },
                status => SyncError::Server { status, message },
            });
        }

        let token: TokenResponse = response.json().map_err(|e| SyncError::InvalidResponse {
            message: format!("malformed login response: {}", e),
        })?;
        let creds =
            token.into_credentials(self.clock.now(), None, self.config.default_token_lifetime)?;

        self.refresher.replace_session(Some(&creds)).await?;
        self.cache.clear();
        info!("Logged in as {}", username);
        Ok(creds)
    }

    /// End the session.
    ///
    /// The server is told on a best-effort basis; local credentials and the
    /// record cache are cleared regardless. A refresh still in flight cannot
    /// bring the session back.
    pub async fn logout(&self) -> SyncResult<()> {
        if let Some(creds) = self.credentials.load().await? {
            let url = self.config.url(&self.config.logout_path);
            let mut headers = Headers::new();
            headers.insert(
                "Authorization".to_string(),
                format!("Bearer {}", creds.access_token),
            );
            match self.http.post(&url, "{}", &headers).await {
                Ok(response) if response.is_success() => {}
                Ok(response) => warn!("Server logout returned {}", response.status),
                Err(e) => warn!("Server logout failed: {}", e),
            }
        }

        self.refresher.replace_session(None).await?;
        self.cache.clear();
        info!("Logged out");
        Ok(())
    }

    /// Whether a credential pair is stored.
    pub async fn is_authenticated(&self) -> SyncResult<bool> {
        Ok(self.credentials.load().await?.is_some())
    }

    /// Start (or restart) the proactive refresh timer.
    pub fn start_proactive_refresh(&self) {
        let handle = self.refresher.spawn_proactive_refresh();
        *self.lock_proactive() = Some(handle);
    }

    /// Stop the proactive refresh timer if it is running.
    pub fn stop_proactive_refresh(&self) {
        if let Some(handle) = self.lock_proactive().take() {
            handle.stop();
        }
    }

    pub fn is_proactive_refresh_running(&self) -> bool {
        self.lock_proactive()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    fn lock_proactive(&self) -> MutexGuard<'_, Option<ProactiveRefreshHandle>> {
        self.proactive.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mock::{InMemoryStore, ManualClock, MockHttpClient, MockResponse};
    use crate::models::RecordKind;
    use crate::traits::HttpError;
    use serde_json::json;

    const LOGIN_URL: &str = "http://api.test/api/auth/login";
    const LOGOUT_URL: &str = "http://api.test/api/auth/logout";

    fn session(http: &MockHttpClient) -> ChatSession {
        ChatSession::new(
            SessionConfig::new("http://api.test"),
            Arc::new(http.clone()),
            Arc::new(InMemoryStore::new()),
            Arc::new(ManualClock::default()),
        )
    }

    #[tokio::test]
    async fn test_login_persists_pair() {
        let http = MockHttpClient::new();
        http.set_response(
            LOGIN_URL,
            MockResponse::json(
                200,
                json!({"access_token": "a1", "refresh_token": "r1", "expires_in": 900}),
            ),
        );
        let session = session(&http);

        assert!(!session.is_authenticated().await.unwrap());
        let creds = session.login("ada", "pw").await.unwrap();
        assert_eq!(creds.expires_in, 900);
        assert!(session.is_authenticated().await.unwrap());

        let requests = http.get_requests();
        assert_eq!(
            requests[0].body.as_deref(),
            Some(r#"{"username":"ada","password":"pw"}"#)
        );
        assert!(requests[0].bearer_token().is_none());
    }

    #[tokio::test]
    async fn test_login_failures_are_classified() {
        let http = MockHttpClient::new();
        let session = session(&http);

        http.set_response(LOGIN_URL, MockResponse::json(401, json!({"error": "bad password"})));
        assert_eq!(
            session.login("ada", "nope").await.unwrap_err(),
            SyncError::Unauthenticated
        );

        http.set_response(
            LOGIN_URL,
            MockResponse::json(422, json!({"error": "username required"})),
        );
        assert_eq!(
            session.login("", "pw").await.unwrap_err(),
            SyncError::ValidationFailure {
                message: "username required".to_string()
            }
        );

        http.set_response(LOGIN_URL, MockResponse::json(200, json!({"nope": true})));
        assert!(matches!(
            session.login("ada", "pw").await,
            Err(SyncError::InvalidResponse { .. })
        ));
        assert!(!session.is_authenticated().await.unwrap());
    }

    #[tokio::test]
    async fn test_logout_clears_even_when_server_fails() {
        let http = MockHttpClient::new();
        http.set_response(
            LOGIN_URL,
            MockResponse::json(200, json!({"access_token": "a1", "refresh_token": "r1"})),
        );
        http.set_response(
            LOGOUT_URL,
            MockResponse::Error(HttpError::ConnectionFailed("down".to_string())),
        );
        http.set_response(
            "http://api.test/api/chats",
            MockResponse::json(
                201,
                json!({"id": "c1", "updated_at": "2026-01-01T00:00:00Z"}),
            ),
        );
        let session = session(&http);

        session.login("ada", "pw").await.unwrap();
        session.cache().create(RecordKind::Chat, json!({})).await.unwrap();
        assert_eq!(session.cache().len(), 1);

        session.logout().await.unwrap();
        assert!(!session.is_authenticated().await.unwrap());
        assert!(session.cache().is_empty());
        assert_eq!(http.count_requests_to("/api/auth/logout"), 1);
    }

    #[tokio::test]
    async fn test_logout_without_credentials_skips_server() {
        let http = MockHttpClient::new();
        let session = session(&http);

        session.logout().await.unwrap();
        assert_eq!(http.request_count(), 0);
    }

    #[tokio::test]
    async fn test_proactive_refresh_lifecycle() {
        let http = MockHttpClient::new();
        let session = session(&http);

        assert!(!session.is_proactive_refresh_running());
        session.start_proactive_refresh();
        assert!(session.is_proactive_refresh_running());
        session.stop_proactive_refresh();
        assert!(!session.is_proactive_refresh_running());
    }
}
