//! Trait abstractions for the collaborators the session core depends on.
//!
//! # Traits
//!
//! - [`HttpClient`] - HTTP exchanges (the raw transport)
//! - [`KeyValueStore`] - Durable key-value persistence
//! - [`Clock`] - Wall-clock time

pub mod clock;
pub mod http;
pub mod storage;

pub use clock::Clock;
pub use http::{Headers, HttpClient, HttpError, Method, Response};
pub use storage::{KeyValueStore, StorageError};
