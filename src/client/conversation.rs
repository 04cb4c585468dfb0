//! Conversation lifecycle side requests.
//!
//! Side requests use the backend's `result` envelope: non-200 statuses are
//! API errors, envelope shape violations are protocol errors. A failure
//! while probing for a reusable conversation falls back to plain creation
//! rather than surfacing.

use serde_json::Value;

use crate::error::{ClientError, Result};
use crate::models::ConversationSummary;
use crate::traits::http::{HttpClient, Response};

use super::ChatClient;

impl<H: HttpClient> ChatClient<H> {
    /// Bind the session to a usable conversation, returning its id.
    ///
    /// Reuses the newest existing conversation when it has no records yet,
    /// otherwise creates a fresh one. The session adopts the id.
    pub async fn ensure_conversation(&self) -> Result<String> {
        if let Some(id) = self.conversation_id() {
            return Ok(id);
        }

        let id = match self.find_reusable_conversation().await {
            Ok(Some(id)) => {
                tracing::info!(conversation_id = %id, "reusing empty conversation");
                id
            }
            Ok(None) => self.create_conversation().await?,
            Err(err) => {
                tracing::warn!(error = %err, "conversation probe failed, creating new");
                self.create_conversation().await?
            }
        };
        self.session().observe_conversation(&id);
        Ok(id)
    }

    /// List existing conversations, newest first.
    pub async fn list_conversations(&self) -> Result<Vec<ConversationSummary>> {
        let url = format!("{}/api/conversation", self.base_url());
        let response = self.http().get(&url, &self.headers()).await?;
        let result = envelope_result(&response)?;

        let entries = result
            .get("conversations")
            .and_then(Value::as_array)
            .ok_or_else(|| ClientError::Protocol("missing result.conversations".to_string()))?;

        let mut conversations: Vec<ConversationSummary> = entries
            .iter()
            .filter_map(|entry| {
                let id = entry.get("conversationId").and_then(Value::as_str)?;
                Some(ConversationSummary {
                    conversation_id: id.to_string(),
                    created_time: entry.get("createdTime").cloned().unwrap_or(Value::Null),
                })
            })
            .collect();
        conversations.sort_by(|a, b| compare_created(&b.created_time, &a.created_time));
        Ok(conversations)
    }

    /// Whether a conversation has no chat records yet.
    pub async fn conversation_is_empty(&self, conversation_id: &str) -> Result<bool> {
        let url = format!("{}/api/record/{}", self.base_url(), conversation_id);
        let response = self.http().get(&url, &self.headers()).await?;
        let result = envelope_result(&response)?;

        let records = result.get("records").and_then(Value::as_array);
        Ok(records.map_or(true, Vec::is_empty))
    }

    async fn find_reusable_conversation(&self) -> Result<Option<String>> {
        let conversations = self.list_conversations().await?;
        let Some(newest) = conversations.first() else {
            return Ok(None);
        };
        if self.conversation_is_empty(&newest.conversation_id).await? {
            Ok(Some(newest.conversation_id.clone()))
        } else {
            Ok(None)
        }
    }

    async fn create_conversation(&self) -> Result<String> {
        let url = format!("{}/api/conversation", self.base_url());
        let response = self.http().post(&url, "{}", &self.headers()).await?;
        let result = envelope_result(&response)?;

        let id = result
            .get("conversationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ClientError::Protocol("missing result.conversationId".to_string()))?;
        tracing::info!(conversation_id = %id, "created conversation");
        Ok(id.to_string())
    }
}

/// Validate a side-request response and unwrap its `result` envelope.
fn envelope_result(response: &Response) -> Result<Value> {
    if !response.is_success() {
        return Err(ClientError::Api {
            status: response.status,
            message: response.text(),
        });
    }
    let body: Value = response
        .json()
        .map_err(|e| ClientError::Protocol(format!("invalid JSON body: {e}")))?;
    body.get("result")
        .cloned()
        .ok_or_else(|| ClientError::Protocol("missing result envelope".to_string()))
}

/// Order `createdTime` values that may be numbers or strings.
fn compare_created(a: &Value, b: &Value) -> std::cmp::Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
        _ => a
            .as_str()
            .unwrap_or("")
            .cmp(b.as_str().unwrap_or("")),
    }
}
