//! Authentication module for chatgate.
//!
//! This module provides:
//! - Credential pair storage
//! - Wire types for the login and refresh endpoints
//! - Single-flight token refresh with a proactive timer

pub mod api;
pub mod credentials;
pub mod refresh;

pub use api::{get_jwt_expires_in, LoginRequest, TokenResponse};
pub use credentials::{CredentialStore, Credentials};
pub use refresh::{ProactiveRefreshHandle, RefreshCoordinator};
