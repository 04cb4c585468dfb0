//! Wire formats and public data types.
//!
//! Request bodies mirror the backend's camelCase JSON; response envelopes are
//! picked apart with `serde_json::Value` accessors in `client::conversation`
//! because the backend omits fields freely.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::sse::events::StreamEvent;

/// Application identity carried on every chat request.
#[derive(Debug, Clone, Serialize)]
pub struct AppInfo {
    #[serde(rename = "appId")]
    pub app_id: String,
    pub auth: Map<String, Value>,
    #[serde(rename = "flowId")]
    pub flow_id: String,
    pub params: Map<String, Value>,
}

impl AppInfo {
    pub fn new(app_id: impl Into<String>, flow_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            auth: Map::new(),
            flow_id: flow_id.into(),
            params: Map::new(),
        }
    }
}

/// Generation limits sent with every question.
#[derive(Debug, Clone, Serialize)]
pub struct Features {
    pub max_tokens: u32,
    pub context_num: u32,
}

impl Default for Features {
    fn default() -> Self {
        Self {
            max_tokens: 2048,
            context_num: 2,
        }
    }
}

/// Body of `POST /api/chat` for a fresh question.
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub app: AppInfo,
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
    pub features: Features,
    pub language: String,
    pub question: String,
}

/// Body of `POST /api/chat` when resuming a paused tool step.
///
/// `params` is `true`/`false` for a confirmation decision or an object of
/// parameter values for a parameter request.
#[derive(Debug, Clone, Serialize)]
pub struct ResumeRequest {
    #[serde(rename = "taskId")]
    pub task_id: String,
    pub params: Value,
}

/// Caller's answer to a pending interaction.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Approve or reject a confirmation request
    Confirm(bool),
    /// Supply the values a parameter request asked for
    Params(Map<String, Value>),
}

impl Decision {
    /// Wire value for the resume request's `params` field.
    pub fn into_params(self) -> Value {
        match self {
            Decision::Confirm(approved) => Value::Bool(approved),
            Decision::Params(values) => Value::Object(values),
        }
    }
}

/// Risk classification of a tool awaiting confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl RiskLevel {
    /// Parse the wire `risk` string, case-insensitively.
    pub fn parse(risk: &str) -> Self {
        match risk.to_ascii_lowercase().as_str() {
            "low" => RiskLevel::Low,
            "medium" => RiskLevel::Medium,
            "high" => RiskLevel::High,
            _ => RiskLevel::Unknown,
        }
    }

    /// Emoji-prefixed label for status lines.
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "🟢 low risk",
            RiskLevel::Medium => "🟡 medium risk",
            RiskLevel::High => "🔴 high risk",
            RiskLevel::Unknown => "⚪ unknown risk",
        }
    }
}

/// What a paused exchange is waiting for.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionRequest {
    /// The tool needs the user's go-ahead before it runs
    Confirm {
        tool_name: String,
        risk: RiskLevel,
        reason: Option<String>,
    },
    /// The tool needs parameter values from the user
    Params {
        tool_name: String,
        message: Option<String>,
        required: Map<String, Value>,
    },
}

impl InteractionRequest {
    /// Build the request described by a waiting event.
    pub fn confirm_from(event: &StreamEvent) -> Self {
        InteractionRequest::Confirm {
            tool_name: event.step_name().to_string(),
            risk: RiskLevel::parse(event.risk().unwrap_or("")),
            reason: event.reason().map(str::to_string),
        }
    }

    /// Build the parameter request described by a waiting event.
    pub fn params_from(event: &StreamEvent) -> Self {
        InteractionRequest::Params {
            tool_name: event.step_name().to_string(),
            message: event.message().map(str::to_string),
            required: event.params().cloned().unwrap_or_default(),
        }
    }

    /// Name of the tool waiting on the user.
    pub fn tool_name(&self) -> &str {
        match self {
            InteractionRequest::Confirm { tool_name, .. }
            | InteractionRequest::Params { tool_name, .. } => tool_name,
        }
    }
}

/// A paused exchange awaiting the caller's decision.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingInteraction {
    /// Task id the resume request must target
    pub task_id: String,
    /// What the backend asked for
    pub request: InteractionRequest,
}

/// One conversation from `GET /api/conversation`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSummary {
    pub conversation_id: String,
    pub created_time: Value,
}
