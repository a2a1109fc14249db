//! Entity synchronization cache.
//!
//! Keeps the last-known snapshot of every chat and message this client has
//! seen, and hides the backend's propagation lag: a "not found" for a record
//! this client created is treated as "not visible yet" and retried with
//! bounded backoff, while a "not found" for anything else is final.

mod retry;

pub use retry::{RetryPolicy, RetryState};

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, warn};

use crate::error::{SyncError, SyncResult};
use crate::models::{is_record_not_found, ActOutcome, ApiErrorBody, Operation, Record, RecordKind};
use crate::traits::{Method, Response};
use crate::transport::AuthenticatedTransport;

#[derive(Debug, Clone)]
struct CachedRecord {
    kind: RecordKind,
    record: Record,
}

#[derive(Debug, Default)]
struct Entries {
    /// Snapshots indexed by record id
    records: HashMap<String, CachedRecord>,
    /// Ids this client created, whose absence means propagation lag
    created: HashSet<String>,
}

/// Local map of record snapshots with read-through to the API.
///
/// Cloning is cheap; clones share the same map.
#[derive(Clone)]
pub struct EntitySyncCache {
    transport: AuthenticatedTransport,
    retry: RetryPolicy,
    entries: Arc<Mutex<Entries>>,
}

impl std::fmt::Debug for EntitySyncCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntitySyncCache")
            .field("records", &self.len())
            .field("retry", &self.retry)
            .finish()
    }
}

impl EntitySyncCache {
    pub fn new(transport: AuthenticatedTransport, retry: RetryPolicy) -> Self {
        Self {
            transport,
            retry,
            entries: Arc::new(Mutex::new(Entries::default())),
        }
    }

    pub fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    /// Create a record and remember it as locally created.
    ///
    /// Messages are posted under the chat named by the payload's `chat_id`.
    /// If that chat was itself created locally and is not visible yet, the
    /// post is retried like any other operation on it.
    pub async fn create(&self, kind: RecordKind, payload: Value) -> SyncResult<Record> {
        let parent = match kind {
            RecordKind::Chat => None,
            RecordKind::Message => payload.get("chat_id").and_then(Value::as_str),
        };
        let path = kind.collection_path(parent)?;

        let response = match parent {
            Some(chat_id) => {
                self.send_with_retry(RecordKind::Chat, chat_id, Method::Post, &path, Some(&payload))
                    .await?
            }
            None => {
                self.transport
                    .call_json(Method::Post, &path, Some(&payload))
                    .await?
            }
        };

        let mut record: Record = parse_body(&expect_success(response)?)?;
        if record.parent_id.is_none() {
            record.parent_id = parent.map(str::to_string);
        }

        info!("Created {} {}", kind, record.id);
        self.insert_created(kind, record.clone());
        Ok(record)
    }

    /// Perform `operation` on an existing record.
    ///
    /// `payload` is sent for operations that carry a body (update, send
    /// message) and ignored otherwise.
    pub async fn act(
        &self,
        kind: RecordKind,
        id: &str,
        operation: Operation,
        payload: Option<Value>,
    ) -> SyncResult<ActOutcome> {
        let (method, path) = operation.request_for(kind, id)?;
        let body = if operation.has_body() {
            payload
        } else {
            None
        };

        let response = self
            .send_with_retry(kind, id, method, &path, body.as_ref())
            .await?;
        let response = expect_success(response)?;

        match operation {
            Operation::Fetch | Operation::Update => {
                let record: Record = parse_body(&response)?;
                Ok(ActOutcome::Record(self.upsert(kind, record)))
            }
            Operation::Delete => {
                self.remove(id);
                Ok(ActOutcome::Removed)
            }
            Operation::SendMessage => {
                let mut message: Record = parse_body(&response)?;
                if message.parent_id.is_none() {
                    message.parent_id = Some(id.to_string());
                }
                self.insert_created(RecordKind::Message, message.clone());
                Ok(ActOutcome::Record(message))
            }
            Operation::ListMessages => {
                let messages = parse_list(&response, RecordKind::Message)?;
                Ok(ActOutcome::Records(self.upsert_all(RecordKind::Message, messages)))
            }
        }
    }

    /// Cached snapshot of `id`, fetching it when absent.
    pub async fn get(&self, kind: RecordKind, id: &str) -> SyncResult<Record> {
        if let Some(record) = self.cached(id) {
            return Ok(record);
        }

        match self.act(kind, id, Operation::Fetch, None).await? {
            ActOutcome::Record(record) => Ok(record),
            other => Err(SyncError::InvalidResponse {
                message: format!("fetch produced {:?}", other),
            }),
        }
    }

    /// List records of `kind`, refreshing their snapshots.
    ///
    /// Messages are listed per chat, so `parent` is required for them.
    pub async fn list(&self, kind: RecordKind, parent: Option<&str>) -> SyncResult<Vec<Record>> {
        let path = kind.collection_path(parent)?;

        let response = match (kind, parent) {
            (RecordKind::Message, Some(chat_id)) => {
                self.send_with_retry(RecordKind::Chat, chat_id, Method::Get, &path, None)
                    .await?
            }
            _ => self.transport.call(Method::Get, &path, None).await?,
        };

        let records = parse_list(&expect_success(response)?, kind)?;
        Ok(self.upsert_all(kind, records))
    }

    /// Drop the snapshot of `id`; the next `get` refetches it.
    ///
    /// A locally created id stays marked as such.
    pub fn invalidate(&self, id: &str) -> bool {
        self.lock_entries().records.remove(id).is_some()
    }

    /// Forget `id` entirely, returning the snapshot if one was held.
    pub fn remove(&self, id: &str) -> Option<Record> {
        let mut entries = self.lock_entries();
        entries.created.remove(id);
        entries.records.remove(id).map(|cached| cached.record)
    }

    /// Current snapshot of `id`, without network.
    pub fn cached(&self, id: &str) -> Option<Record> {
        self.lock_entries()
            .records
            .get(id)
            .map(|cached| cached.record.clone())
    }

    /// Kind of the cached record `id`.
    pub fn cached_kind(&self, id: &str) -> Option<RecordKind> {
        self.lock_entries().records.get(id).map(|cached| cached.kind)
    }

    /// Whether `id` was created by this client.
    pub fn is_created_locally(&self, id: &str) -> bool {
        self.lock_entries().created.contains(id)
    }

    pub fn len(&self) -> usize {
        self.lock_entries().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Forget everything.
    pub fn clear(&self) {
        let mut entries = self.lock_entries();
        entries.records.clear();
        entries.created.clear();
    }

    /// Send a request about `kind`/`id`, retrying while a locally created
    /// record is not visible yet.
    ///
    /// The returned response is never a record-not-found for `kind`.
    async fn send_with_retry(
        &self,
        kind: RecordKind,
        id: &str,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> SyncResult<Response> {
        let mut state = self.retry.start();

        loop {
            state.record_attempt();
            let response = self.transport.call_json(method, path, body).await?;

            if !is_record_not_found(&response, kind) {
                if state.attempts() > 1 {
                    info!("{} {} visible after {} attempts", kind, id, state.attempts());
                }
                return Ok(response);
            }

            if !self.is_created_locally(id) {
                debug!("{} {} not found", kind, id);
                self.invalidate(id);
                return Err(SyncError::RecordNotFound {
                    kind,
                    id: id.to_string(),
                });
            }

            match state.next_wait() {
                Some(wait) => {
                    debug!(
                        "{} {} not visible yet (attempt {}), retrying in {:?}",
                        kind,
                        id,
                        state.attempts(),
                        wait
                    );
                    tokio::time::sleep(wait).await;
                }
                None => {
                    warn!(
                        "{} {} still not visible after {} attempts",
                        kind,
                        id,
                        state.attempts()
                    );
                    return Err(SyncError::RecordUnavailable {
                        kind,
                        id: id.to_string(),
                        attempts: state.attempts(),
                    });
                }
            }
        }
    }

    fn insert_created(&self, kind: RecordKind, record: Record) {
        let mut entries = self.lock_entries();
        entries.created.insert(record.id.clone());
        Self::upsert_locked(&mut entries, kind, record);
    }

    fn upsert(&self, kind: RecordKind, record: Record) -> Record {
        Self::upsert_locked(&mut self.lock_entries(), kind, record)
    }

    fn upsert_all(&self, kind: RecordKind, records: Vec<Record>) -> Vec<Record> {
        let mut entries = self.lock_entries();
        records
            .into_iter()
            .map(|record| Self::upsert_locked(&mut entries, kind, record))
            .collect()
    }

    /// Store `record` unless the cached copy is newer. Returns the snapshot
    /// that ends up cached.
    fn upsert_locked(entries: &mut Entries, kind: RecordKind, record: Record) -> Record {
        if let Some(existing) = entries.records.get(&record.id) {
            if existing.record.updated_at > record.updated_at {
                debug!("Ignoring stale snapshot of {} {}", kind, record.id);
                return existing.record.clone();
            }
        }
        entries.records.insert(
            record.id.clone(),
            CachedRecord {
                kind,
                record: record.clone(),
            },
        );
        record
    }

    fn lock_entries(&self) -> MutexGuard<'_, Entries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Turn a non-success response into the matching error.
fn expect_success(response: Response) -> SyncResult<Response> {
    if response.is_success() {
        return Ok(response);
    }

    let message = ApiErrorBody::from_response(&response).describe(&response);
    match response.status {
        400 | 409 | 422 => Err(SyncError::ValidationFailure { message }),
        status => Err(SyncError::Server { status, message }),
    }
}

fn parse_body<T: serde::de::DeserializeOwned>(response: &Response) -> SyncResult<T> {
    response.json().map_err(|e| SyncError::InvalidResponse {
        message: e.to_string(),
    })
}

/// Accepts a bare array or an object wrapping it under the plural kind name
/// (`{"chats": [...]}`, `{"messages": [...]}`).
fn parse_list(response: &Response, kind: RecordKind) -> SyncResult<Vec<Record>> {
    let value: Value = parse_body(response)?;
    let items = match value {
        Value::Array(_) => value,
        Value::Object(mut map) => {
            let key = match kind {
                RecordKind::Chat => "chats",
                RecordKind::Message => "messages",
            };
            map.remove(key).ok_or_else(|| SyncError::InvalidResponse {
                message: format!("list response has no '{}' field", key),
            })?
        }
        other => {
            return Err(SyncError::InvalidResponse {
                message: format!("unexpected list response: {}", other),
            })
        }
    };

    serde_json::from_value(items).map_err(|e| SyncError::InvalidResponse {
        message: e.to_string(),
    })
}
