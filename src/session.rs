//! Conversation and task identity tracking.
//!
//! A session holds at most one conversation id and one task id. The
//! conversation id is adopted from the first event that carries one and kept
//! until the caller explicitly resets it. The task id identifies the current
//! or paused exchange: first non-empty id wins within an exchange, and it is
//! cleared only at exchange boundaries, on stop, or on failure. A paused
//! exchange keeps its task id so the confirm/parameter handshake can resume.

/// Identity state for one chat session.
#[derive(Debug, Default, Clone)]
pub struct SessionState {
    conversation_id: Option<String>,
    task_id: Option<String>,
}

impl SessionState {
    /// Create a session with no identities.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session bound to a known conversation.
    pub fn with_conversation(conversation_id: impl Into<String>) -> Self {
        Self {
            conversation_id: Some(conversation_id.into()),
            task_id: None,
        }
    }

    /// Currently held conversation id.
    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    /// Currently held task id.
    pub fn task_id(&self) -> Option<&str> {
        self.task_id.as_deref()
    }

    /// Whether a task id is held (an exchange is active or paused).
    pub fn has_task(&self) -> bool {
        self.task_id.is_some()
    }

    /// Adopt a conversation id from the stream.
    ///
    /// Only the first non-empty id takes effect; later ids are ignored until
    /// [`reset_conversation`](Self::reset_conversation).
    pub fn observe_conversation(&mut self, id: &str) {
        if id.is_empty() || self.conversation_id.is_some() {
            return;
        }
        tracing::debug!(conversation_id = %id, "adopted conversation id");
        self.conversation_id = Some(id.to_string());
    }

    /// Adopt a task id from the stream, first non-empty id wins.
    pub fn observe_task(&mut self, id: &str) {
        if id.is_empty() || self.task_id.is_some() {
            return;
        }
        tracing::debug!(task_id = %id, "adopted task id");
        self.task_id = Some(id.to_string());
    }

    /// Drop the held task id at an exchange boundary.
    pub fn clear_task(&mut self) -> Option<String> {
        let cleared = self.task_id.take();
        if let Some(id) = &cleared {
            tracing::debug!(task_id = %id, "cleared task id");
        }
        cleared
    }

    /// Forget the conversation so the next exchange starts a fresh one.
    pub fn reset_conversation(&mut self) {
        self.conversation_id = None;
        self.task_id = None;
    }
}
