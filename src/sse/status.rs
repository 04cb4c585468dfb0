//! Status formatting and stream termination rules.
//!
//! Step and flow lifecycle events are rendered into fixed human-readable
//! status lines; everything else surfaces its raw text through the exchange
//! instead. Step statuses for a tool that already has an open progress line
//! are prefixed with a replace tag so the presentation layer can update the
//! line in place rather than append a new one.

use std::collections::HashMap;

use crate::models::RiskLevel;
use crate::sse::events::{EventKind, StreamEvent};
use crate::sse::tags::make_tag;

/// Fixed notice for the `[ERROR]` sentinel.
pub const SERVICE_ERROR_NOTICE: &str =
    "The service encountered an error, please try again later.";

/// Fixed notice for the `[SENSITIVE]` sentinel.
pub const SENSITIVE_NOTICE: &str =
    "The response was withheld because it contained sensitive content.";

/// Fixed notice for an exchange that produced no text at all.
pub const EMPTY_RESPONSE_NOTICE: &str =
    "The service is temporarily unavailable, please try again later.";

const DEFAULT_CONFIRM_REASON: &str = "the tool needs your confirmation before it runs";
const DEFAULT_PARAM_MESSAGE: &str = "additional parameters are required";

/// How an exchange was told to stop consuming the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// `done` sentinel: normal completion, nothing to show
    Completed,
    /// `error` sentinel: backend failed, show the fixed error notice
    ServiceError,
    /// `sensitive` sentinel: content withheld, show the fixed notice
    Sensitive,
}

impl Termination {
    /// The user-facing notice to emit before stopping, if any.
    pub fn notice(&self) -> Option<&'static str> {
        match self {
            Termination::Completed => None,
            Termination::ServiceError => Some(SERVICE_ERROR_NOTICE),
            Termination::Sensitive => Some(SENSITIVE_NOTICE),
        }
    }
}

/// Check whether an event terminates the exchange.
///
/// This runs before any content extraction; once it returns `Some` the
/// exchange must stop consuming further lines.
pub fn check_termination(event: &StreamEvent) -> Option<Termination> {
    match event.kind {
        EventKind::Done => Some(Termination::Completed),
        EventKind::Error => Some(Termination::ServiceError),
        EventKind::Sensitive => Some(Termination::Sensitive),
        _ => None,
    }
}

/// Bookkeeping for tool steps that are still running.
///
/// Keyed by tool name, not step id: a backend retry reuses the tool name
/// with a fresh step id, and the later status should still replace the
/// earlier line. Entries are dropped when the step reaches a final status;
/// the rendered line itself is the caller's to keep.
#[derive(Debug, Default)]
pub struct ProgressTracker {
    open: HashMap<String, String>,
}

impl ProgressTracker {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a progress line is currently open for this tool.
    pub fn is_open(&self, tool: &str) -> bool {
        self.open.contains_key(tool)
    }

    /// Record the latest status text for a still-running tool.
    pub fn record(&mut self, tool: &str, text: &str) {
        self.open.insert(tool.to_string(), text.to_string());
    }

    /// Close the tool's progress line, returning its last recorded text.
    pub fn close(&mut self, tool: &str) -> Option<String> {
        self.open.remove(tool)
    }

    /// Last recorded status text for a tool, if still open.
    pub fn last_text(&self, tool: &str) -> Option<&str> {
        self.open.get(tool).map(String::as_str)
    }

    /// Number of tools with an open progress line.
    pub fn open_count(&self) -> usize {
        self.open.len()
    }

    /// Drop all bookkeeping, for the start of a new exchange.
    pub fn clear(&mut self) {
        self.open.clear();
    }
}

/// Render a lifecycle event into a status line.
///
/// Returns `None` for events that are not step or flow events; the exchange
/// surfaces their raw text instead, which keeps step output from being
/// rendered twice.
pub fn format_status(event: &StreamEvent, progress: &mut ProgressTracker) -> Option<String> {
    if event.kind.is_flow() {
        return Some(flow_status(&event.kind).to_string());
    }
    if !event.kind.is_step() {
        return None;
    }

    let name = event.step_name();
    let base = match event.kind {
        EventKind::StepInit => format!("\n🔧 initializing tool: `{name}`\n"),
        EventKind::StepInput => format!("\n📥 tool `{name}` running...\n"),
        EventKind::StepOutput => format!("\n✅ tool `{name}` finished\n"),
        EventKind::StepCancel => format!("\n❌ tool `{name}` cancelled\n"),
        EventKind::StepError => format!("\n⚠️ tool `{name}` failed\n"),
        EventKind::StepWaitingForStart => {
            let risk = RiskLevel::parse(event.risk().unwrap_or(""));
            let reason = event.reason().unwrap_or(DEFAULT_CONFIRM_REASON);
            format!(
                "\n⏸️ **waiting for confirmation**\n\n🔧 tool: `{name}` {}\n\n💭 reason: {reason}\n",
                risk.label()
            )
        }
        EventKind::StepWaitingForParam => {
            let message = event.message().unwrap_or(DEFAULT_PARAM_MESSAGE);
            format!("\n📝 **waiting for parameters**\n\n🔧 tool: `{name}`\n\n💭 {message}\n")
        }
        _ => unreachable!("is_step covers all step kinds"),
    };

    // Without a tool name there is no line to key the replacement on.
    if name.is_empty() {
        return Some(base);
    }

    let had_previous = progress.is_open(name);
    if event.kind.is_final_step() {
        progress.close(name);
    } else {
        progress.record(name, &base);
    }

    Some(format!("{}{base}", make_tag(name, had_previous)))
}

fn flow_status(kind: &EventKind) -> &'static str {
    match kind {
        EventKind::FlowStart => "\n▶️ flow started\n",
        EventKind::FlowStop => "\n⏹️ flow stopped\n",
        EventKind::FlowSuccess => "\n✅ flow finished\n",
        EventKind::FlowFailed => "\n❌ flow failed\n",
        EventKind::FlowCancel => "\n❌ flow cancelled\n",
        _ => unreachable!("is_flow covers all flow kinds"),
    }
}
