//! Hermes chat client.
//!
//! [`ChatClient`] owns the session identities and issues exchanges: `ask`
//! opens a streaming question, `resume` answers a paused tool step, `stop`
//! aborts the current task. Conversation lifecycle side requests live in
//! [`conversation`]; the per-exchange stream driver lives in [`exchange`].

pub mod conversation;
pub mod exchange;

use std::sync::{Arc, Mutex};

use once_cell::sync::Lazy;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use regex::Regex;

use crate::adapters::reqwest_http::ReqwestHttpClient;
use crate::error::{ClientError, Result};
use crate::models::{ChatRequest, Decision, Features, ResumeRequest};
use crate::session::SessionState;
use crate::traits::http::{Headers, HttpClient, HttpError};

pub use exchange::{ChatChunk, Exchange};

static BASE_URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^https?://").unwrap());

// Characters that cannot pass through a query value unescaped.
const QUERY_ESCAPE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'&')
    .add(b'+')
    .add(b'<')
    .add(b'>')
    .add(b'=')
    .add(b'?');

/// Static configuration for a chat session.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    /// Backend application id sent with every question
    pub app_id: String,
    /// Flow the questions run against
    pub flow_id: String,
    /// Response language hint
    pub language: String,
    /// Generation limits
    pub features: Features,
}

impl ChatConfig {
    pub fn new(app_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            flow_id: flow_id.into(),
            language: "en".to_string(),
            features: Features::default(),
        }
    }

    pub fn with_language(mut self, language: impl Into<String>) -> Self {
        self.language = language.into();
        self
    }
}

/// Streaming chat client for the Hermes agent API.
///
/// One client holds one session: at most one conversation and at most one
/// active or paused task. Exchanges are single-pass and must be consumed one
/// at a time.
pub struct ChatClient<H: HttpClient = ReqwestHttpClient> {
    http: Arc<H>,
    base_url: String,
    auth_token: Option<String>,
    config: ChatConfig,
    session: Arc<Mutex<SessionState>>,
}

impl ChatClient<ReqwestHttpClient> {
    /// Create a client over the production transport.
    pub fn new(base_url: &str, config: ChatConfig) -> Result<Self> {
        Self::with_http(base_url, config, Arc::new(ReqwestHttpClient::new()))
    }
}

impl<H: HttpClient> ChatClient<H> {
    /// Create a client over a custom transport.
    pub fn with_http(base_url: &str, config: ChatConfig, http: Arc<H>) -> Result<Self> {
        if !BASE_URL_RE.is_match(base_url) {
            return Err(ClientError::InvalidBaseUrl(base_url.to_string()));
        }
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            auth_token: None,
            config,
            session: Arc::new(Mutex::new(SessionState::new())),
        })
    }

    /// Attach a bearer token to every request.
    pub fn with_auth_token(mut self, token: impl Into<String>) -> Self {
        self.auth_token = Some(token.into());
        self
    }

    /// Currently held conversation id.
    pub fn conversation_id(&self) -> Option<String> {
        self.session().conversation_id().map(str::to_string)
    }

    /// Currently held task id, if an exchange is active or paused.
    pub fn task_id(&self) -> Option<String> {
        self.session().task_id().map(str::to_string)
    }

    /// Whether a paused exchange is awaiting [`resume`](Self::resume).
    pub fn has_pending_task(&self) -> bool {
        self.session().has_task()
    }

    /// Forget the conversation; the next exchange starts a new one.
    pub fn reset_conversation(&self) {
        self.session().reset_conversation();
    }

    /// Ask a question, opening a new streaming exchange.
    pub async fn ask(&self, question: &str) -> Result<Exchange> {
        let conversation_id = self.conversation_id().unwrap_or_default();
        let request = ChatRequest {
            app: self.config_app(),
            conversation_id,
            features: self.config.features.clone(),
            language: self.config.language.clone(),
            question: question.to_string(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        tracing::info!(flow_id = %self.config.flow_id, "opening chat exchange");
        self.open_exchange(&body).await
    }

    /// Answer a paused tool step, opening the follow-up exchange.
    ///
    /// Fails with [`ClientError::NoPendingTask`] when no exchange is paused.
    pub async fn resume(&self, decision: Decision) -> Result<Exchange> {
        let task_id = self.task_id().ok_or(ClientError::NoPendingTask)?;
        let request = ResumeRequest {
            task_id,
            params: decision.into_params(),
        };
        let body = serde_json::to_string(&request)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;
        tracing::info!("resuming paused exchange");
        self.open_exchange(&body).await
    }

    /// Abort the current task on the server.
    ///
    /// The held task id is dropped whether or not the request succeeds; a
    /// no-op when no task is held.
    pub async fn stop(&self) -> Result<()> {
        let Some(task_id) = self.task_id() else {
            return Ok(());
        };
        let url = format!(
            "{}/api/stop?taskId={}",
            self.base_url,
            utf8_percent_encode(&task_id, QUERY_ESCAPE)
        );
        let outcome = self.http.post(&url, "", &self.headers()).await;
        self.session().clear_task();
        match outcome {
            Ok(response) if response.is_success() => Ok(()),
            Ok(response) => {
                tracing::warn!(status = response.status, "stop request rejected");
                Err(ClientError::Api {
                    status: response.status,
                    message: response.text(),
                })
            }
            Err(err) => {
                tracing::warn!(error = %err, "stop request failed");
                Err(err.into())
            }
        }
    }

    async fn open_exchange(&self, body: &str) -> Result<Exchange> {
        let url = format!("{}/api/chat", self.base_url);
        let mut headers = self.headers();
        headers.insert("Accept".to_string(), "text/event-stream".to_string());
        let bytes = self
            .http
            .post_stream(&url, body, &headers)
            .await
            .map_err(|err| match err {
                HttpError::ServerError { status, message } => {
                    ClientError::Api { status, message }
                }
                other => ClientError::Transport(other),
            })?;
        Ok(exchange::drive(bytes, Arc::clone(&self.session)))
    }

    fn config_app(&self) -> crate::models::AppInfo {
        crate::models::AppInfo::new(&self.config.app_id, &self.config.flow_id)
    }

    pub(crate) fn headers(&self) -> Headers {
        let mut headers = Headers::new();
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        if let Some(token) = &self.auth_token {
            headers.insert("Authorization".to_string(), format!("Bearer {token}"));
        }
        headers
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_url
    }

    pub(crate) fn http(&self) -> &H {
        &self.http
    }

    pub(crate) fn session(&self) -> std::sync::MutexGuard<'_, SessionState> {
        self.session.lock().expect("session lock poisoned")
    }
}
