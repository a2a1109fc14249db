//! Mock implementations for testing.
//!
//! These doubles let the session core be exercised without network, disk or
//! real time.
//!
//! # Available Mocks
//!
//! - [`MockHttpClient`] - HTTP client with configurable responses
//! - [`InMemoryStore`] - In-memory key-value storage
//! - [`ManualClock`] - Manually advanced clock

pub mod clock;
pub mod http;
pub mod store;

pub use clock::ManualClock;
pub use http::{MockHttpClient, MockResponse, RecordedRequest};
pub use store::InMemoryStore;
