//! HTTP transport abstraction.
//!
//! The chat client talks to the backend through this trait so exchanges can
//! be driven against scripted byte streams in tests. Implementations are the
//! production reqwest adapter and the in-memory mock.

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use std::collections::HashMap;
use std::pin::Pin;

/// HTTP headers as a key-value map.
pub type Headers = HashMap<String, String>;

/// Byte stream of an SSE response body.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, HttpError>> + Send>>;

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: Bytes,
}

impl Response {
    pub fn new(status: u16, body: Bytes) -> Self {
        Self { status, body }
    }

    /// Whether the status is 2xx.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Response body as UTF-8 text, lossy on invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Parse the body as JSON.
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-level failures.
#[derive(Debug, Clone)]
pub enum HttpError {
    /// Could not reach the server
    ConnectionFailed(String),
    /// Request or read timed out
    Timeout(String),
    /// Server returned a non-success status
    ServerError { status: u16, message: String },
    /// Body read failed mid-stream
    Io(String),
    /// Anything else
    Other(String),
}

impl std::fmt::Display for HttpError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HttpError::ConnectionFailed(msg) => write!(f, "Connection failed: {}", msg),
            HttpError::Timeout(msg) => write!(f, "Request timeout: {}", msg),
            HttpError::ServerError { status, message } => {
                write!(f, "Server error ({}): {}", status, message)
            }
            HttpError::Io(msg) => write!(f, "IO error: {}", msg),
            HttpError::Other(msg) => write!(f, "HTTP error: {}", msg),
        }
    }
}

impl std::error::Error for HttpError {}

/// HTTP operations the chat client needs.
///
/// `post_stream` keeps the connection open and yields body bytes as the
/// server flushes them, which is how SSE exchanges are consumed.
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Perform a GET request.
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError>;

    /// Perform a POST request with a JSON body.
    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError>;

    /// Perform a POST request and stream the response body.
    async fn post_stream(
        &self,
        url: &str,
        body: &str,
        headers: &Headers,
    ) -> Result<ByteStream, HttpError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_is_success() {
        assert!(Response::new(200, Bytes::new()).is_success());
        assert!(Response::new(299, Bytes::new()).is_success());
        assert!(!Response::new(300, Bytes::new()).is_success());
        assert!(!Response::new(404, Bytes::new()).is_success());
        assert!(!Response::new(500, Bytes::new()).is_success());
    }

    #[test]
    fn test_response_text_and_json() {
        let response = Response::new(200, Bytes::from(r#"{"result": {"id": "c1"}}"#));
        assert!(response.text().contains("c1"));
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["result"]["id"], "c1");
    }

    #[test]
    fn test_http_error_display() {
        assert_eq!(
            HttpError::ConnectionFailed("refused".to_string()).to_string(),
            "Connection failed: refused"
        );
        assert_eq!(
            HttpError::ServerError {
                status: 500,
                message: "boom".to_string()
            }
            .to_string(),
            "Server error (500): boom"
        );
        assert_eq!(
            HttpError::Io("reset".to_string()).to_string(),
            "IO error: reset"
        );
    }
}
