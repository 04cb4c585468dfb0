//! SSE event types and accessor views.
//!
//! Each parsed `data:` payload becomes one immutable [`StreamEvent`]: a typed
//! [`EventKind`] plus the raw JSON object it was decoded from. Payload fields
//! the protocol cares about are exposed through accessor methods rather than
//! eagerly-deserialized structs, because the backend freely omits or extends
//! sub-objects between releases.

use serde_json::{Map, Value};

/// Event taxonomy of the Hermes streaming chat protocol.
///
/// The wire `event` field is an open string enum; unrecognized values are
/// preserved in [`EventKind::Unknown`] so forward-compatible callers can
/// still inspect them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Free-text answer chunk (`text.add`)
    TextAdd,
    /// Tool step is being initialized (`step.init`)
    StepInit,
    /// Tool step received its input and is running (`step.input`)
    StepInput,
    /// Tool step produced output (`step.output`)
    StepOutput,
    /// Tool step was cancelled (`step.cancel`)
    StepCancel,
    /// Tool step failed (`step.error`)
    StepError,
    /// Tool step needs the user to confirm execution (`step.waiting_for_start`)
    StepWaitingForStart,
    /// Tool step needs the user to supply parameters (`step.waiting_for_param`)
    StepWaitingForParam,
    /// Flow started (`flow.start`)
    FlowStart,
    /// Flow stopped (`flow.stop`)
    FlowStop,
    /// Flow finished successfully (`flow.success`)
    FlowSuccess,
    /// Flow failed (`flow.failed`)
    FlowFailed,
    /// Flow cancelled (`flow.cancel`)
    FlowCancel,
    /// Stream-end sentinel (`[DONE]`)
    Done,
    /// Backend error sentinel (`[ERROR]`)
    Error,
    /// Sensitive-content sentinel (`[SENSITIVE]`)
    Sensitive,
    /// Keepalive
    Heartbeat,
    /// Anything else, with the original `event` string retained
    Unknown(String),
}

impl EventKind {
    /// Map a wire `event` string to its kind.
    pub fn parse(event: &str) -> Self {
        match event {
            "text.add" => EventKind::TextAdd,
            "step.init" => EventKind::StepInit,
            "step.input" => EventKind::StepInput,
            "step.output" => EventKind::StepOutput,
            "step.cancel" => EventKind::StepCancel,
            "step.error" => EventKind::StepError,
            "step.waiting_for_start" => EventKind::StepWaitingForStart,
            "step.waiting_for_param" => EventKind::StepWaitingForParam,
            "flow.start" => EventKind::FlowStart,
            "flow.stop" => EventKind::FlowStop,
            "flow.success" => EventKind::FlowSuccess,
            "flow.failed" => EventKind::FlowFailed,
            "flow.cancel" => EventKind::FlowCancel,
            "done" => EventKind::Done,
            "error" => EventKind::Error,
            "sensitive" => EventKind::Sensitive,
            "heartbeat" => EventKind::Heartbeat,
            other => EventKind::Unknown(other.to_string()),
        }
    }

    /// Wire name of this kind, for logging.
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::TextAdd => "text.add",
            EventKind::StepInit => "step.init",
            EventKind::StepInput => "step.input",
            EventKind::StepOutput => "step.output",
            EventKind::StepCancel => "step.cancel",
            EventKind::StepError => "step.error",
            EventKind::StepWaitingForStart => "step.waiting_for_start",
            EventKind::StepWaitingForParam => "step.waiting_for_param",
            EventKind::FlowStart => "flow.start",
            EventKind::FlowStop => "flow.stop",
            EventKind::FlowSuccess => "flow.success",
            EventKind::FlowFailed => "flow.failed",
            EventKind::FlowCancel => "flow.cancel",
            EventKind::Done => "done",
            EventKind::Error => "error",
            EventKind::Sensitive => "sensitive",
            EventKind::Heartbeat => "heartbeat",
            EventKind::Unknown(other) => other,
        }
    }

    /// Whether this is a `step.*` tool lifecycle event.
    pub fn is_step(&self) -> bool {
        matches!(
            self,
            EventKind::StepInit
                | EventKind::StepInput
                | EventKind::StepOutput
                | EventKind::StepCancel
                | EventKind::StepError
                | EventKind::StepWaitingForStart
                | EventKind::StepWaitingForParam
        )
    }

    /// Whether this is a `flow.*` lifecycle event.
    pub fn is_flow(&self) -> bool {
        matches!(
            self,
            EventKind::FlowStart
                | EventKind::FlowStop
                | EventKind::FlowSuccess
                | EventKind::FlowFailed
                | EventKind::FlowCancel
        )
    }

    /// Whether this step event closes the step (`output`/`cancel`/`error`).
    pub fn is_final_step(&self) -> bool {
        matches!(
            self,
            EventKind::StepOutput | EventKind::StepCancel | EventKind::StepError
        )
    }
}

/// One parsed event from the SSE stream.
///
/// Created once per `data:` line and never mutated afterwards.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamEvent {
    /// The typed event kind
    pub kind: EventKind,
    raw: Map<String, Value>,
}

impl StreamEvent {
    /// Create an event from its kind and raw payload object.
    pub fn new(kind: EventKind, raw: Map<String, Value>) -> Self {
        Self { kind, raw }
    }

    /// Create a payload-less sentinel event (`done`, `error`, ...).
    pub fn sentinel(kind: EventKind) -> Self {
        Self {
            kind,
            raw: Map::new(),
        }
    }

    /// The raw payload object this event was decoded from.
    pub fn raw(&self) -> &Map<String, Value> {
        &self.raw
    }

    fn content(&self) -> Option<&Map<String, Value>> {
        self.raw.get("content").and_then(Value::as_object)
    }

    fn content_str(&self, key: &str) -> Option<&str> {
        self.content()?.get(key).and_then(Value::as_str)
    }

    fn flow(&self) -> Option<&Map<String, Value>> {
        self.raw.get("flow").and_then(Value::as_object)
    }

    /// `content.text` of the payload, if present.
    pub fn text_content(&self) -> Option<&str> {
        self.content_str("text")
    }

    /// `content.risk` of a confirmation request.
    pub fn risk(&self) -> Option<&str> {
        self.content_str("risk")
    }

    /// `content.reason` of a confirmation request.
    pub fn reason(&self) -> Option<&str> {
        self.content_str("reason")
    }

    /// `content.message` of a parameter request.
    pub fn message(&self) -> Option<&str> {
        self.content_str("message")
    }

    /// `content.params` of a parameter request.
    pub fn params(&self) -> Option<&Map<String, Value>> {
        self.content()?.get("params").and_then(Value::as_object)
    }

    /// `flow.stepName`, defaulting to an empty string.
    pub fn step_name(&self) -> &str {
        self.flow()
            .and_then(|f| f.get("stepName"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// `flow.stepId`, defaulting to an empty string.
    pub fn step_id(&self) -> &str {
        self.flow()
            .and_then(|f| f.get("stepId"))
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Non-empty `conversationId` carried by the event, if any.
    pub fn conversation_id(&self) -> Option<&str> {
        self.raw
            .get("conversationId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// Non-empty `taskId` carried by the event, if any.
    pub fn task_id(&self) -> Option<&str> {
        self.raw
            .get("taskId")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }
}
