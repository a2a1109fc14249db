//! Concrete implementations of trait abstractions.
//!
//! # Adapters
//!
//! - [`ReqwestHttpClient`] - HTTP client using reqwest
//! - [`FileKeyValueStore`] - File-based key-value storage
//! - [`SystemClock`] - Operating system wall clock
//!
//! # Mock Implementations
//!
//! The [`mock`] submodule provides test doubles:
//! - [`mock::MockHttpClient`] - Scripted HTTP responses with request recording
//! - [`mock::InMemoryStore`] - In-memory key-value storage
//! - [`mock::ManualClock`] - Clock that only moves when told to

pub mod file_store;
pub mod mock;
pub mod reqwest_http;
pub mod system_clock;

pub use file_store::FileKeyValueStore;
pub use mock::{InMemoryStore, ManualClock, MockHttpClient};
pub use reqwest_http::ReqwestHttpClient;
pub use system_clock::SystemClock;
