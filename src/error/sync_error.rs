//! The error type surfaced by every session-core operation.

use thiserror::Error;

use super::category::ErrorCategory;
use crate::models::RecordKind;
use crate::traits::{HttpError, StorageError};

/// Classified failure of a session-core operation.
///
/// `Clone` so a single refresh outcome can be handed to every queued waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SyncError {
    /// No usable credential, or the server still rejected us after one
    /// refresh-and-retry.
    #[error("not authenticated")]
    Unauthenticated,

    /// The refresh token was rejected (or the refresh could not complete);
    /// local credentials have been cleared.
    #[error("session expired: {reason}")]
    SessionExpired { reason: String },

    /// A record this client created is still not visible after the retry
    /// ceiling.
    #[error("{kind} {id} is not available yet after {attempts} attempts")]
    RecordUnavailable {
        kind: RecordKind,
        id: String,
        attempts: u32,
    },

    /// Authoritative absence of a record this client did not create.
    #[error("{kind} {id} not found")]
    RecordNotFound { kind: RecordKind, id: String },

    /// No response from the server.
    #[error("network failure: {message}")]
    NetworkFailure { message: String },

    /// The server rejected the request payload.
    #[error("validation failed: {message}")]
    ValidationFailure { message: String },

    /// Any other non-success response, passed through unmodified.
    #[error("server responded {status}: {message}")]
    Server { status: u16, message: String },

    /// A success response whose body could not be understood.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String },

    /// The credential store could not be read or written.
    #[error("storage failure: {message}")]
    Storage { message: String },
}

impl SyncError {
    /// Get the category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::Unauthenticated | SyncError::SessionExpired { .. } => ErrorCategory::Auth,
            SyncError::RecordUnavailable { .. } => ErrorCategory::Server,
            SyncError::RecordNotFound { .. } | SyncError::ValidationFailure { .. } => {
                ErrorCategory::User
            }
            SyncError::NetworkFailure { .. } => ErrorCategory::Network,
            SyncError::Server { status, .. } => {
                if *status >= 500 || *status == 429 {
                    ErrorCategory::Server
                } else {
                    ErrorCategory::Client
                }
            }
            SyncError::InvalidResponse { .. } => ErrorCategory::Client,
            SyncError::Storage { .. } => ErrorCategory::System,
        }
    }

    /// Check if the caller may reasonably retry later.
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }

    /// Check if the user must sign in again.
    pub fn requires_reauth(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthenticated | SyncError::SessionExpired { .. }
        )
    }

    /// Get a user-friendly error message.
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Unauthenticated => {
                "You are not signed in. Please sign in to continue.".to_string()
            }
            SyncError::SessionExpired { .. } => {
                "Your session has expired. Please sign in again.".to_string()
            }
            SyncError::RecordUnavailable { kind, .. } => format!(
                "Your new {} is still being saved. Please try again in a moment.",
                kind
            ),
            SyncError::RecordNotFound { kind, .. } => format!("That {} no longer exists.", kind),
            SyncError::NetworkFailure { .. } => {
                "Unable to reach the server. Please check your internet connection.".to_string()
            }
            SyncError::ValidationFailure { message } => message.clone(),
            SyncError::Server { status, .. } if *status >= 500 => {
                "The server encountered an error. Please try again later.".to_string()
            }
            SyncError::Server { status, message } => {
                format!("Request failed ({}): {}", status, message)
            }
            SyncError::InvalidResponse { .. } => {
                "Received an unexpected response from the server.".to_string()
            }
            SyncError::Storage { .. } => {
                "Could not save your session. Please check file permissions.".to_string()
            }
        }
    }

    /// Get a short error code for logging.
    pub fn error_code(&self) -> &'static str {
        match self {
            SyncError::Unauthenticated => "E_AUTH_NOT_AUTH",
            SyncError::SessionExpired { .. } => "E_AUTH_SESSION_EXP",
            SyncError::RecordUnavailable { .. } => "E_SYNC_UNAVAILABLE",
            SyncError::RecordNotFound { .. } => "E_SYNC_NOT_FOUND",
            SyncError::NetworkFailure { .. } => "E_NET_FAILURE",
            SyncError::ValidationFailure { .. } => "E_VALIDATION",
            SyncError::Server { .. } => "E_HTTP_STATUS",
            SyncError::InvalidResponse { .. } => "E_INVALID_RESPONSE",
            SyncError::Storage { .. } => "E_STORAGE",
        }
    }
}

impl From<HttpError> for SyncError {
    fn from(err: HttpError) -> Self {
        SyncError::NetworkFailure {
            message: err.to_string(),
        }
    }
}

impl From<StorageError> for SyncError {
    fn from(err: StorageError) -> Self {
        SyncError::Storage {
            message: err.to_string(),
        }
    }
}
