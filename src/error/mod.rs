//! Error handling for the session core.
//!
//! Every operation returns [`SyncResult`]. Failures are classified into a
//! [`SyncError`] variant, and each variant maps to an [`ErrorCategory`] that
//! tells the caller how to react:
//!
//! | Variant | Category | Caller reaction |
//! |---------|----------|-----------------|
//! | `Unauthenticated` | Auth | Show the sign-in prompt |
//! | `SessionExpired` | Auth | Clear local session, sign in again |
//! | `RecordUnavailable` | Server | Retry later, record is not lost |
//! | `RecordNotFound` | User | Treat as gone |
//! | `NetworkFailure` | Network | Caller's own retry policy |
//! | `ValidationFailure` | User | Show the message, never retry |

mod category;
mod sync_error;

pub use category::ErrorCategory;
pub use sync_error::SyncError;

/// Result alias used throughout the crate.
pub type SyncResult<T> = Result<T, SyncError>;
