//! Single-flight token refresh.
//!
//! [`RefreshCoordinator`] guarantees at most one refresh network call is
//! outstanding. Callers arriving while a refresh is running are queued and
//! all receive the same outcome, in arrival order, once it settles.
//!
//! The coordinator also owns the proactive refresh timer, which renews the
//! pair before it ages out so most calls never see a 401.
//!
//! Every write to the credential store goes through the coordinator's
//! session epoch. Login and logout bump the epoch; a refresh that started
//! under an older epoch settles without touching the store.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use super::api::{RefreshRequest, TokenResponse};
use super::credentials::{CredentialStore, Credentials};
use crate::config::SessionConfig;
use crate::error::{SyncError, SyncResult};
use crate::models::ApiErrorBody;
use crate::traits::{Clock, Headers, HttpClient};

type Waiter = oneshot::Sender<SyncResult<Credentials>>;

/// Why a refresh attempt failed, before its outcome is committed.
enum RefreshFailure {
    /// The pair is unusable and the session ends.
    Expired(String),
    Other(SyncError),
}

impl From<SyncError> for RefreshFailure {
    fn from(e: SyncError) -> Self {
        Self::Other(e)
    }
}

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<Waiter>,
}

/// Collapses concurrent refresh requests into one network call.
///
/// Cloning is cheap; clones share the in-flight state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    http: Arc<dyn HttpClient>,
    store: CredentialStore,
    clock: Arc<dyn Clock>,
    refresh_url: String,
    default_lifetime: Duration,
    threshold: f64,
    check_interval: Duration,
    state: Arc<Mutex<RefreshState>>,
    /// Held across store writes. Bumped whenever the session is replaced.
    epoch: Arc<tokio::sync::Mutex<u64>>,
}

impl std::fmt::Debug for RefreshCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshCoordinator")
            .field("refresh_url", &self.refresh_url)
            .field("in_flight", &self.is_in_flight())
            .finish()
    }
}

impl RefreshCoordinator {
    pub fn new(
        http: Arc<dyn HttpClient>,
        store: CredentialStore,
        clock: Arc<dyn Clock>,
        config: &SessionConfig,
    ) -> Self {
        Self {
            http,
            store,
            clock,
            refresh_url: config.url(&config.refresh_path),
            default_lifetime: config.default_token_lifetime,
            threshold: config.refresh_threshold,
            check_interval: config.refresh_check_interval,
            state: Arc::new(Mutex::new(RefreshState::default())),
            epoch: Arc::new(tokio::sync::Mutex::new(0)),
        }
    }

    /// The credential store this coordinator writes to.
    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    /// Install `creds` as the current session, or end it with `None`.
    ///
    /// A refresh still running from the previous session will not write its
    /// result over this one.
    pub async fn replace_session(&self, creds: Option<&Credentials>) -> SyncResult<()> {
        let mut epoch = self.epoch.lock().await;
        *epoch += 1;
        match creds {
            Some(creds) => self.store.save(creds).await,
            None => self.store.clear().await,
        }
    }

    /// Whether a refresh network call is currently outstanding.
    pub fn is_in_flight(&self) -> bool {
        self.lock_state().in_flight
    }

    /// Obtain a fresh credential pair.
    ///
    /// Starts a refresh if none is running, otherwise joins the running one.
    /// On failure the stored credentials are cleared and every waiter gets
    /// [`SyncError::SessionExpired`].
    pub async fn request_refresh(&self) -> SyncResult<Credentials> {
        let (tx, rx) = oneshot::channel();

        let leader = {
            let mut state = self.lock_state();
            state.waiters.push(tx);
            if state.in_flight {
                false
            } else {
                state.in_flight = true;
                true
            }
        };

        if leader {
            // Spawned so the refresh settles every waiter even if this
            // caller's future is dropped.
            let this = self.clone();
            tokio::spawn(async move { this.run_refresh().await });
        } else {
            debug!("Joining in-flight token refresh");
        }

        rx.await.unwrap_or_else(|_| {
            Err(SyncError::SessionExpired {
                reason: "refresh ended without an outcome".to_string(),
            })
        })
    }

    /// Refresh after `rejected_token` was refused by the server, unless the
    /// stored pair has already moved past it.
    ///
    /// A caller whose 401 arrives after another caller's refresh completed
    /// gets the stored pair without a second network call.
    pub async fn refresh_if_stale(&self, rejected_token: &str) -> SyncResult<Credentials> {
        if let Some(current) = self.store.load().await? {
            if current.access_token != rejected_token {
                debug!("Credential already refreshed by another caller");
                return Ok(current);
            }
        }
        self.request_refresh().await
    }

    /// Refresh if the stored pair is at least `threshold` of its lifetime
    /// old. Returns the new pair, or `None` when nothing was due.
    pub async fn refresh_if_aging(&self) -> SyncResult<Option<Credentials>> {
        let Some(current) = self.store.load().await? else {
            return Ok(None);
        };

        let now = self.clock.now();
        if !current.needs_refresh(now, self.threshold) {
            return Ok(None);
        }

        info!(
            "Credential at {:.0}% of its lifetime, refreshing proactively",
            current.age_fraction(now) * 100.0
        );
        self.request_refresh().await.map(Some)
    }

    /// Start the proactive refresh timer.
    ///
    /// The first check runs immediately, then once per check interval. The
    /// timer stops when the returned handle is stopped or dropped.
    pub fn spawn_proactive_refresh(&self) -> ProactiveRefreshHandle {
        let this = self.clone();
        let period = self.check_interval.max(Duration::from_millis(1));

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match this.refresh_if_aging().await {
                    Ok(Some(_)) => debug!("Proactive refresh completed"),
                    Ok(None) => {}
                    Err(SyncError::SessionExpired { reason }) => {
                        warn!("Proactive refresh ended the session: {}", reason);
                    }
                    Err(e) => warn!("Proactive refresh failed: {}", e),
                }
            }
        });

        ProactiveRefreshHandle { task }
    }

    async fn run_refresh(&self) {
        info!("Refreshing access token");
        let epoch = *self.epoch.lock().await;
        let attempt = self.perform_refresh().await;
        let outcome = self.commit(epoch, attempt).await;

        let waiters = {
            let mut state = self.lock_state();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };

        match &outcome {
            Ok(_) => info!("Token refresh succeeded ({} waiters)", waiters.len()),
            Err(e) => warn!(
                "Token refresh failed ({} waiters): {} [{}]",
                waiters.len(),
                e,
                e.error_code()
            ),
        }

        for waiter in waiters {
            // Receiver gone means that caller lost interest.
            let _ = waiter.send(outcome.clone());
        }
    }

    async fn perform_refresh(&self) -> Result<Credentials, RefreshFailure> {
        let Some(current) = self.store.load().await? else {
            return Err(RefreshFailure::Expired("no refresh token stored".to_string()));
        };

        let body = serde_json::to_string(&RefreshRequest {
            refresh_token: &current.refresh_token,
        })
        .map_err(|e| SyncError::InvalidResponse {
            message: e.to_string(),
        })?;

        let response = self
            .http
            .post(&self.refresh_url, &body, &Headers::new())
            .await
            .map_err(|e| RefreshFailure::Expired(format!("refresh request failed: {}", e)))?;

        if !response.is_success() {
            let detail = ApiErrorBody::from_response(&response).describe(&response);
            return Err(RefreshFailure::Expired(format!(
                "refresh rejected ({}): {}",
                response.status, detail
            )));
        }

        let token: TokenResponse = response
            .json()
            .map_err(|e| RefreshFailure::Expired(format!("malformed refresh response: {}", e)))?;

        token
            .into_credentials(
                self.clock.now(),
                Some(&current.refresh_token),
                self.default_lifetime,
            )
            .map_err(|e| RefreshFailure::Expired(e.to_string()))
    }

    /// Write the outcome of a refresh started under `epoch`.
    ///
    /// A success is saved and an expiry clears the pair. If the session was
    /// replaced meanwhile, the store is left alone and waiters get whatever
    /// session is current now.
    async fn commit(
        &self,
        epoch: u64,
        attempt: Result<Credentials, RefreshFailure>,
    ) -> SyncResult<Credentials> {
        let current_epoch = self.epoch.lock().await;
        if *current_epoch != epoch {
            info!("Session replaced during refresh, discarding its outcome");
            return self.store.load().await?.ok_or(SyncError::Unauthenticated);
        }

        match attempt {
            Ok(refreshed) => {
                self.store.save(&refreshed).await?;
                Ok(refreshed)
            }
            Err(RefreshFailure::Expired(reason)) => {
                if let Err(e) = self.store.clear().await {
                    warn!("Failed to clear credentials after refresh failure: {}", e);
                }
                Err(SyncError::SessionExpired { reason })
            }
            Err(RefreshFailure::Other(e)) => Err(e),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, RefreshState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle to the proactive refresh timer. Dropping it stops the timer.
#[derive(Debug)]
pub struct ProactiveRefreshHandle {
    task: JoinHandle<()>,
}

impl ProactiveRefreshHandle {
    /// Stop the timer. A refresh already handed to the coordinator still
    /// settles for its other waiters.
    pub fn stop(&self) {
        self.task.abort();
    }

    /// Whether the timer task has ended.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for ProactiveRefreshHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
