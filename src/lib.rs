//! chatgate - session and synchronization core for a password-gated chat
//! client.
//!
//! This library keeps a short-lived access token valid across concurrent API
//! calls with a single-flight refresh, and hides the backend's eventual
//! consistency behind a record cache with bounded retries.

pub mod adapters;
pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod logging;
pub mod models;
pub mod session;
pub mod traits;
pub mod transport;

pub use error::{SyncError, SyncResult};
pub use session::ChatSession;
