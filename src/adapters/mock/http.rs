//! Mock HTTP transport for tests.
//!
//! Responses are queued per URL and consumed in order, so a test can script
//! an ask, a pause, and a resume against the same endpoint. Requests are
//! recorded for verification.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use crate::traits::http::{ByteStream, Headers, HttpClient, HttpError, Response};

/// A recorded HTTP request.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    /// HTTP method (GET or POST)
    pub method: String,
    /// Request URL
    pub url: String,
    /// Request headers
    pub headers: Headers,
    /// Request body, for POST requests
    pub body: Option<String>,
}

/// One scripted response.
#[derive(Debug, Clone)]
pub enum MockResponse {
    /// Buffered response
    Success(Response),
    /// Request-level failure
    Error(HttpError),
    /// Streamed body chunks, each item a read result
    Stream(Vec<Result<Bytes, HttpError>>),
}

impl MockResponse {
    /// A streamed SSE body assembled from whole lines.
    pub fn sse_lines(lines: &[&str]) -> Self {
        let chunks = lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect();
        MockResponse::Stream(chunks)
    }
}

/// In-memory [`HttpClient`] with scripted responses.
///
/// URLs match by exact string first, then by prefix, so query parameters do
/// not need their own script entries.
#[derive(Debug, Clone, Default)]
pub struct MockHttpClient {
    responses: Arc<Mutex<HashMap<String, VecDeque<MockResponse>>>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockHttpClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response for a URL; later pushes answer later requests.
    pub fn push_response(&self, url: &str, response: MockResponse) {
        self.responses
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(response);
    }

    /// All requests made so far, in order.
    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    /// Requests made to URLs starting with the given prefix.
    pub fn requests_to(&self, url_prefix: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.url.starts_with(url_prefix))
            .collect()
    }

    fn record(&self, method: &str, url: &str, headers: &Headers, body: Option<String>) {
        self.requests.lock().unwrap().push(RecordedRequest {
            method: method.to_string(),
            url: url.to_string(),
            headers: headers.clone(),
            body,
        });
    }

    fn take_response(&self, url: &str) -> Option<MockResponse> {
        let mut responses = self.responses.lock().unwrap();
        if let Some(queue) = responses.get_mut(url) {
            if let Some(response) = queue.pop_front() {
                return Some(response);
            }
        }
        let prefix_key = responses
            .iter()
            .find(|(pattern, queue)| url.starts_with(pattern.as_str()) && !queue.is_empty())
            .map(|(pattern, _)| pattern.clone())?;
        responses.get_mut(&prefix_key).and_then(VecDeque::pop_front)
    }

    fn buffered(&self, url: &str) -> Result<Response, HttpError> {
        match self.take_response(url) {
            Some(MockResponse::Success(response)) => Ok(response),
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Stream(_)) => Err(HttpError::Other(
                "stream response scripted for buffered request".to_string(),
            )),
            None => Err(HttpError::Other(format!("no mock response for URL: {url}"))),
        }
    }
}

#[async_trait]
impl HttpClient for MockHttpClient {
    async fn get(&self, url: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record("GET", url, headers, None);
        self.buffered(url)
    }

    async fn post(&self, url: &str, body: &str, headers: &Headers) -> Result<Response, HttpError> {
        self.record("POST", url, headers, Some(body.to_string()));
        self.buffered(url)
    }

    async fn post_stream(
        &self,
        url: &str,
        body: &str,
        headers: &Headers,
    ) -> Result<ByteStream, HttpError> {
        self.record("POST", url, headers, Some(body.to_string()));
        match self.take_response(url) {
            Some(MockResponse::Stream(chunks)) => {
                Ok(Box::pin(futures::stream::iter(chunks)) as ByteStream)
            }
            Some(MockResponse::Error(err)) => Err(err),
            Some(MockResponse::Success(_)) => Err(HttpError::Other(
                "buffered response scripted for stream request".to_string(),
            )),
            None => Err(HttpError::Other(format!("no mock response for URL: {url}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_responses_consumed_in_order() {
        let client = MockHttpClient::new();
        client.push_response(
            "http://t/api",
            MockResponse::Success(Response::new(200, Bytes::from("first"))),
        );
        client.push_response(
            "http://t/api",
            MockResponse::Success(Response::new(200, Bytes::from("second"))),
        );

        let first = client.get("http://t/api", &Headers::new()).await.unwrap();
        let second = client.get("http://t/api", &Headers::new()).await.unwrap();
        assert_eq!(first.text(), "first");
        assert_eq!(second.text(), "second");
        assert!(client.get("http://t/api", &Headers::new()).await.is_err());
    }

    #[tokio::test]
    async fn test_prefix_match_covers_query_params() {
        let client = MockHttpClient::new();
        client.push_response(
            "http://t/api/stop",
            MockResponse::Success(Response::new(200, Bytes::from("{}"))),
        );

        let response = client
            .post("http://t/api/stop?taskId=t1", "", &Headers::new())
            .await
            .unwrap();
        assert_eq!(response.status, 200);
    }

    #[tokio::test]
    async fn test_sse_lines_stream() {
        let client = MockHttpClient::new();
        client.push_response(
            "http://t/api/chat",
            MockResponse::sse_lines(&[r#"data: {"event":"text.add"}"#, "data: [DONE]"]),
        );

        let mut stream = client
            .post_stream("http://t/api/chat", "{}", &Headers::new())
            .await
            .unwrap();
        let mut bytes = Vec::new();
        while let Some(chunk) = stream.next().await {
            bytes.extend_from_slice(&chunk.unwrap());
        }
        let body = String::from_utf8(bytes).unwrap();
        assert!(body.ends_with("data: [DONE]\n"));
    }

    #[tokio::test]
    async fn test_requests_recorded_with_bodies() {
        let client = MockHttpClient::new();
        client.push_response(
            "http://t/api/chat",
            MockResponse::Success(Response::new(200, Bytes::new())),
        );

        let mut headers = Headers::new();
        headers.insert("Authorization".to_string(), "Bearer tok".to_string());
        client
            .post("http://t/api/chat", r#"{"question":"hi"}"#, &headers)
            .await
            .unwrap();

        let requests = client.requests_to("http://t/api/chat");
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, "POST");
        assert_eq!(requests[0].body.as_deref(), Some(r#"{"question":"hi"}"#));
        assert_eq!(
            requests[0].headers.get("Authorization"),
            Some(&"Bearer tok".to_string())
        );
    }

    #[tokio::test]
    async fn test_stream_error_mid_body() {
        let client = MockHttpClient::new();
        client.push_response(
            "http://t/api/chat",
            MockResponse::Stream(vec![
                Ok(Bytes::from("data: {\"event\":\"text.add\"}\n")),
                Err(HttpError::Io("connection reset".to_string())),
            ]),
        );

        let mut stream = client
            .post_stream("http://t/api/chat", "{}", &Headers::new())
            .await
            .unwrap();
        assert!(stream.next().await.unwrap().is_ok());
        assert!(stream.next().await.unwrap().is_err());
    }
}
