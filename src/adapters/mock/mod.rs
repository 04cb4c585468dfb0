//! Mock implementations for testing.
//!
//! - [`MockHttpClient`] - HTTP transport with queued, scripted responses

pub mod http;

pub use http::{MockHttpClient, MockResponse, RecordedRequest};
