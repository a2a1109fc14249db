//! Remote records (chats and messages) and the operations the cache can
//! perform on them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::SyncError;
use crate::traits::Method;

/// The kinds of record the chat API stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Chat,
    Message,
}

impl RecordKind {
    /// Lower-case name used in logs and messages.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Chat => "chat",
            RecordKind::Message => "message",
        }
    }

    /// Structured error code the API returns when a record of this kind is
    /// missing.
    pub fn not_found_code(&self) -> &'static str {
        match self {
            RecordKind::Chat => "chat_not_found",
            RecordKind::Message => "message_not_found",
        }
    }

    /// Error text older API builds send instead of a code.
    pub fn legacy_not_found_message(&self) -> &'static str {
        match self {
            RecordKind::Chat => "Chat not found",
            RecordKind::Message => "Message not found",
        }
    }

    /// Collection path used to create or list records of this kind.
    ///
    /// Messages live under their chat, so a parent id is required.
    pub fn collection_path(&self, parent_id: Option<&str>) -> Result<String, SyncError> {
        match (self, parent_id) {
            (RecordKind::Chat, _) => Ok("/api/chats".to_string()),
            (RecordKind::Message, Some(chat_id)) => Ok(format!(
                "/api/chats/{}/messages",
                urlencoding::encode(chat_id)
            )),
            (RecordKind::Message, None) => Err(SyncError::ValidationFailure {
                message: "a message must belong to a chat (missing chat_id)".to_string(),
            }),
        }
    }

    /// Path of a single record.
    pub fn item_path(&self, id: &str) -> String {
        match self {
            RecordKind::Chat => format!("/api/chats/{}", urlencoding::encode(id)),
            RecordKind::Message => format!("/api/messages/{}", urlencoding::encode(id)),
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A chat or message as returned by the API.
///
/// Fields other than `id`, the parent reference and `updated_at` are kept
/// verbatim in `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    #[serde(default, alias = "chat_id", skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl Record {
    /// Convenience accessor for a payload field.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.payload.get(name)
    }
}

/// Operations `EntitySyncCache::act` can perform on an existing record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Read the record.
    Fetch,
    /// Apply a partial update.
    Update,
    /// Delete the record.
    Delete,
    /// Post a message into a chat.
    SendMessage,
    /// List the messages of a chat.
    ListMessages,
}

impl Operation {
    /// Method and path for performing this operation on `kind`/`id`.
    pub fn request_for(&self, kind: RecordKind, id: &str) -> Result<(Method, String), SyncError> {
        match (self, kind) {
            (Operation::Fetch, _) => Ok((Method::Get, kind.item_path(id))),
            (Operation::Update, _) => Ok((Method::Patch, kind.item_path(id))),
            (Operation::Delete, _) => Ok((Method::Delete, kind.item_path(id))),
            (Operation::SendMessage, RecordKind::Chat) => Ok((
                Method::Post,
                RecordKind::Message.collection_path(Some(id))?,
            )),
            (Operation::ListMessages, RecordKind::Chat) => Ok((
                Method::Get,
                RecordKind::Message.collection_path(Some(id))?,
            )),
            (op, kind) => Err(SyncError::ValidationFailure {
                message: format!("{:?} is not supported on a {}", op, kind),
            }),
        }
    }

    /// Whether the request carries the caller's payload.
    pub fn has_body(&self) -> bool {
        matches!(self, Operation::Update | Operation::SendMessage)
    }
}

/// What a successful `act` produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ActOutcome {
    /// A single record (fetch, update, or the message that was sent).
    Record(Record),
    /// A list of records.
    Records(Vec<Record>),
    /// The record was deleted.
    Removed,
}

impl ActOutcome {
    /// The single record, if this outcome carries one.
    pub fn record(&self) -> Option<&Record> {
        match self {
            ActOutcome::Record(record) => Some(record),
            _ => None,
        }
    }
}
