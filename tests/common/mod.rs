//! Common test utilities for integration tests.
//!
//! [`FakeChatServer`] is an in-process chat backend implementing
//! [`HttpClient`]. It issues and validates tokens, counts refreshes, and
//! delays the visibility of new records to imitate an eventually consistent
//! store. Time is tokio time, so `start_paused` tests run instantly.
//!
//! # Example
//!
//! ```ignore
//! let server = FakeChatServer::new();
//! server.set_visibility_lag(Duration::from_millis(2500));
//! let session = logged_in_session(&server).await;
//! ```

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

use chatgate::adapters::mock::{InMemoryStore, ManualClock};
use chatgate::config::SessionConfig;
use chatgate::traits::{Headers, HttpClient, HttpError, Method, Response};
use chatgate::ChatSession;

pub const BASE_URL: &str = "http://chat.test";
pub const USERNAME: &str = "ada";
pub const PASSWORD: &str = "correct horse";

/// A request as seen by the fake server.
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: Method,
    pub path: String,
    pub bearer: Option<String>,
}

struct StoredRecord {
    kind: &'static str,
    value: Value,
    visible_at: Instant,
}

struct ServerState {
    valid_access: HashSet<String>,
    current_refresh: Option<String>,
    issued: u32,
    token_lifetime: u64,
    refresh_delay: Duration,
    refresh_calls: usize,
    refresh_revoked: bool,
    visibility_lag: Duration,
    records: HashMap<String, StoredRecord>,
    next_id: u32,
    seen: Vec<SeenRequest>,
}

/// In-process chat backend.
#[derive(Clone)]
pub struct FakeChatServer {
    state: Arc<Mutex<ServerState>>,
}

impl FakeChatServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(ServerState {
                valid_access: HashSet::new(),
                current_refresh: None,
                issued: 0,
                token_lifetime: 900,
                refresh_delay: Duration::ZERO,
                refresh_calls: 0,
                refresh_revoked: false,
                visibility_lag: Duration::ZERO,
                records: HashMap::new(),
                next_id: 0,
                seen: Vec::new(),
            })),
        }
    }

    /// Latency of the refresh endpoint.
    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state.lock().unwrap().refresh_delay = delay;
    }

    /// How long newly created records stay invisible.
    pub fn set_visibility_lag(&self, lag: Duration) {
        self.state.lock().unwrap().visibility_lag = lag;
    }

    /// Lifetime reported for issued tokens, in seconds.
    pub fn set_token_lifetime(&self, secs: u64) {
        self.state.lock().unwrap().token_lifetime = secs;
    }

    /// Reject every access token issued so far.
    pub fn expire_access_tokens(&self) {
        self.state.lock().unwrap().valid_access.clear();
    }

    /// Reject the current refresh token.
    pub fn revoke_refresh_token(&self) {
        self.state.lock().unwrap().refresh_revoked = true;
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.lock().unwrap().refresh_calls
    }

    pub fn requests(&self) -> Vec<SeenRequest> {
        self.state.lock().unwrap().seen.clone()
    }

    /// Requests whose path equals `path`.
    pub fn requests_to(&self, path: &str) -> Vec<SeenRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == path)
            .collect()
    }

    /// Insert a record that is visible immediately, as if another client
    /// created it long ago.
    pub fn seed_chat(&self, id: &str, title: &str) {
        let mut state = self.state.lock().unwrap();
        state.records.insert(
            id.to_string(),
            StoredRecord {
                kind: "chat",
                value: json!({"id": id, "title": title, "updated_at": Utc::now()}),
                visible_at: Instant::now(),
            },
        );
    }

    fn issue_tokens(state: &mut ServerState) -> Value {
        state.issued += 1;
        let access = format!("access-{}", state.issued);
        let refresh = format!("refresh-{}", state.issued);
        state.valid_access.insert(access.clone());
        state.current_refresh = Some(refresh.clone());
        json!({
            "access_token": access,
            "refresh_token": refresh,
            "token_type": "Bearer",
            "expires_in": state.token_lifetime,
        })
    }

    fn login(&self, body: Option<&str>) -> Response {
        let body: Value = body
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or(Value::Null);
        if body["username"] != USERNAME || body["password"] != PASSWORD {
            return error(401, "Invalid credentials", "invalid_credentials");
        }
        let mut state = self.state.lock().unwrap();
        Response::json_body(200, &Self::issue_tokens(&mut state))
    }

    async fn refresh(&self, body: Option<&str>) -> Response {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.refresh_calls += 1;
            state.refresh_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let presented = body
            .and_then(|b| serde_json::from_str::<Value>(b).ok())
            .and_then(|v| v["refresh_token"].as_str().map(str::to_string));

        let mut state = self.state.lock().unwrap();
        if state.refresh_revoked || presented.is_none() || presented != state.current_refresh {
            return error(401, "Refresh token invalid", "invalid_refresh_token");
        }
        state.valid_access.clear();
        Response::json_body(200, &Self::issue_tokens(&mut state))
    }

    fn records_route(&self, method: Method, path: &str, body: Option<&str>) -> Response {
        let payload: Value = body
            .and_then(|b| serde_json::from_str(b).ok())
            .unwrap_or_else(|| json!({}));
        let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
        let mut state = self.state.lock().unwrap();
        let now = Instant::now();

        match (method, segments.as_slice()) {
            (Method::Post, ["api", "chats"]) => {
                let record = create(&mut state, "chat", None, payload);
                Response::json_body(201, &record)
            }
            (Method::Get, ["api", "chats"]) => {
                let chats: Vec<Value> = visible(&state, "chat", now)
                    .into_iter()
                    .cloned()
                    .collect();
                Response::json_body(200, &json!({ "chats": chats }))
            }
            (method, ["api", "chats", chat_id, "messages"]) => {
                if !is_visible(&state, chat_id, "chat", now) {
                    return error(404, "Chat not found", "chat_not_found");
                }
                match method {
                    Method::Post => {
                        let record = create(&mut state, "message", Some(*chat_id), payload);
                        Response::json_body(201, &record)
                    }
                    Method::Get => {
                        let messages: Vec<Value> = visible(&state, "message", now)
                            .into_iter()
                            .filter(|m| m["chat_id"] == *chat_id)
                            .cloned()
                            .collect();
                        Response::json_body(200, &Value::Array(messages))
                    }
                    _ => error(405, "Method not allowed", "method_not_allowed"),
                }
            }
            (method, ["api", collection @ ("chats" | "messages"), id]) => {
                let kind = if *collection == "chats" { "chat" } else { "message" };
                if !is_visible(&state, id, kind, now) {
                    return match kind {
                        "chat" => error(404, "Chat not found", "chat_not_found"),
                        _ => error(404, "Message not found", "message_not_found"),
                    };
                }
                match method {
                    Method::Get => Response::json_body(200, &state.records[*id].value),
                    Method::Patch | Method::Put => {
                        let Some(stored) = state.records.get_mut(*id) else {
                            return error(404, "Not found", "not_found");
                        };
                        if let (Some(target), Some(patch)) =
                            (stored.value.as_object_mut(), payload.as_object())
                        {
                            for (key, value) in patch {
                                target.insert(key.clone(), value.clone());
                            }
                            target.insert("updated_at".to_string(), json!(Utc::now()));
                        }
                        Response::json_body(200, &stored.value)
                    }
                    Method::Delete => {
                        state.records.remove(*id);
                        Response::new(204, bytes::Bytes::new())
                    }
                    Method::Post => error(405, "Method not allowed", "method_not_allowed"),
                }
            }
            _ => error(404, "Route not found", "route_not_found"),
        }
    }
}

impl Default for FakeChatServer {
    fn default() -> Self {
        Self::new()
    }
}

fn error(status: u16, message: &str, code: &str) -> Response {
    Response::json_body(status, &json!({ "error": message, "code": code }))
}

fn create(state: &mut ServerState, kind: &'static str, chat_id: Option<&str>, payload: Value) -> Value {
    state.next_id += 1;
    let id = format!("{}-{}", kind, state.next_id);
    let mut value = match payload {
        Value::Object(map) => Value::Object(map),
        _ => json!({}),
    };
    value["id"] = json!(id);
    value["updated_at"] = json!(Utc::now());
    if let Some(chat_id) = chat_id {
        value["chat_id"] = json!(chat_id);
    }

    let visible_at = Instant::now() + state.visibility_lag;
    state.records.insert(
        id,
        StoredRecord {
            kind,
            value: value.clone(),
            visible_at,
        },
    );
    value
}

fn is_visible(state: &ServerState, id: &str, kind: &str, now: Instant) -> bool {
    state
        .records
        .get(id)
        .map(|r| r.kind == kind && r.visible_at <= now)
        .unwrap_or(false)
}

fn visible<'a>(state: &'a ServerState, kind: &str, now: Instant) -> Vec<&'a Value> {
    state
        .records
        .values()
        .filter(|r| r.kind == kind && r.visible_at <= now)
        .map(|r| &r.value)
        .collect()
}

#[async_trait]
impl HttpClient for FakeChatServer {
    async fn send(
        &self,
        method: Method,
        url: &str,
        body: Option<&str>,
        headers: &Headers,
    ) -> Result<Response, HttpError> {
        let path = url
            .strip_prefix(BASE_URL)
            .ok_or_else(|| HttpError::InvalidUrl(url.to_string()))?
            .to_string();
        let bearer = headers
            .get("Authorization")
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::to_string);

        self.state.lock().unwrap().seen.push(SeenRequest {
            method,
            path: path.clone(),
            bearer: bearer.clone(),
        });

        let response = match path.as_str() {
            "/api/auth/login" => self.login(body),
            "/api/auth/refresh" => self.refresh(body).await,
            "/api/auth/logout" => Response::new(204, bytes::Bytes::new()),
            _ => {
                let authorized = bearer
                    .map(|token| self.state.lock().unwrap().valid_access.contains(&token))
                    .unwrap_or(false);
                if authorized {
                    self.records_route(method, &path, body)
                } else {
                    error(401, "Unauthorized", "unauthorized")
                }
            }
        };
        Ok(response)
    }
}

/// A session wired to `server`, with in-memory persistence and a manual
/// clock.
pub fn session_for(server: &FakeChatServer) -> (ChatSession, InMemoryStore, ManualClock) {
    session_with_config(server, SessionConfig::new(BASE_URL))
}

pub fn session_with_config(
    server: &FakeChatServer,
    config: SessionConfig,
) -> (ChatSession, InMemoryStore, ManualClock) {
    let store = InMemoryStore::new();
    let clock = ManualClock::new(fixed_start());
    let session = ChatSession::new(
        config,
        Arc::new(server.clone()),
        Arc::new(store.clone()),
        Arc::new(clock.clone()),
    );
    (session, store, clock)
}

/// A session already logged in as [`USERNAME`].
pub async fn logged_in_session(server: &FakeChatServer) -> (ChatSession, InMemoryStore, ManualClock) {
    let (session, store, clock) = session_for(server);
    session
        .login(USERNAME, PASSWORD)
        .await
        .expect("login against fake server");
    (session, store, clock)
}

pub fn fixed_start() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .expect("valid timestamp")
        .with_timezone(&Utc)
}
