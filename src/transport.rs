//! Authenticated transport.
//!
//! Wraps the raw [`HttpClient`]: attaches the stored access token, and on a
//! 401 asks the [`RefreshCoordinator`] for a new pair and retries exactly
//! once. A logical call never produces more than two network calls.

use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::auth::RefreshCoordinator;
use crate::error::{SyncError, SyncResult};
use crate::traits::{Headers, HttpClient, Method, Response};

/// Header carrying the per-call correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

#[derive(Clone)]
pub struct AuthenticatedTransport {
    http: Arc<dyn HttpClient>,
    refresher: RefreshCoordinator,
    base_url: String,
}

impl std::fmt::Debug for AuthenticatedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticatedTransport")
            .field("base_url", &self.base_url)
            .finish()
    }
}

impl AuthenticatedTransport {
    pub fn new(
        http: Arc<dyn HttpClient>,
        refresher: RefreshCoordinator,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            refresher,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn refresher(&self) -> &RefreshCoordinator {
        &self.refresher
    }

    /// Perform an authenticated call against `path`.
    ///
    /// Returns every response other than a 401 as-is, business errors and
    /// 5xx included. Fails with [`SyncError::Unauthenticated`] when no
    /// credential is stored or the retried call is rejected again.
    pub async fn call(
        &self,
        method: Method,
        path: &str,
        body: Option<&str>,
    ) -> SyncResult<Response> {
        let Some(creds) = self.refresher.store().load().await? else {
            return Err(SyncError::Unauthenticated);
        };

        let url = format!("{}{}", self.base_url, path);
        let request_id = Uuid::new_v4().to_string();

        let response = self
            .send(method, &url, body, &creds.access_token, &request_id)
            .await?;
        if response.status != 401 {
            return Ok(response);
        }

        info!(
            "Access token rejected on {} {} [{}], refreshing",
            method, path, request_id
        );
        let refreshed = self.refresher.refresh_if_stale(&creds.access_token).await?;

        let retried = self
            .send(method, &url, body, &refreshed.access_token, &request_id)
            .await?;
        if retried.status == 401 {
            warn!(
                "Refreshed token rejected on {} {} [{}]",
                method, path, request_id
            );
            return Err(SyncError::Unauthenticated);
        }

        Ok(retried)
    }

    /// Like [`call`](Self::call), serializing `body` as JSON.
    pub async fn call_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        body: Option<&T>,
    ) -> SyncResult<Response> {
        let encoded = body
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| SyncError::ValidationFailure {
                message: format!("request body is not serializable: {}", e),
            })?;
        self.call(method, path, encoded.as_deref()).await
    }

    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        access_token: &str,
        request_id: &str,
    ) -> SyncResult<Response> {
        let mut headers = Headers::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", access_token),
        );
        headers.insert(REQUEST_ID_HEADER.to_string(), request_id.to_string());

        debug!("{} {} [{}]", method, url, request_id);
        let response = self.http.send(method, url, body, &headers).await?;
        Ok(response)
    }
}
