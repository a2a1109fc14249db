//! Error bodies returned by the chat API.

use serde::Deserialize;

use super::record::RecordKind;
use crate::traits::Response;

/// Parsed `{ "error": ..., "code": ... }` body. Every field is optional and
/// an unparsable body yields the default.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

impl ApiErrorBody {
    /// Parse the error body of a response.
    pub fn from_response(response: &Response) -> Self {
        response.json().unwrap_or_default()
    }

    /// Best human-readable description, falling back to the raw body.
    pub fn describe(&self, response: &Response) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| {
                let text = response.text().unwrap_or_default();
                if text.is_empty() {
                    format!("HTTP {}", response.status)
                } else {
                    text.chars().take(200).collect()
                }
            })
    }

    /// Whether this body signals that a record of `kind` does not exist.
    ///
    /// The structured `code` is authoritative when present; the legacy error
    /// text is only consulted when the server sent no code at all.
    pub fn is_not_found_for(&self, kind: RecordKind) -> bool {
        match self.code.as_deref() {
            Some(code) => code == kind.not_found_code(),
            None => self.error.as_deref() == Some(kind.legacy_not_found_message()),
        }
    }
}

/// Whether `response` is a "record not found" for `kind`.
pub fn is_record_not_found(response: &Response, kind: RecordKind) -> bool {
    response.status == 404 && ApiErrorBody::from_response(response).is_not_found_for(kind)
}
