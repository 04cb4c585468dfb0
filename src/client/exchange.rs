//! Exchange stream driver.
//!
//! An exchange is one question-or-resume round: a single pass over the SSE
//! byte stream, yielding [`ChatChunk`]s until a sentinel, a waiting event, or
//! end of stream. The driver owns the termination and dedup rules: sentinels
//! are checked before content, step and flow events surface only their
//! formatted statuses, heartbeats surface nothing, and an exchange that
//! produced nothing yields exactly one fallback notice.
//!
//! The held task id is cleared when the exchange ends for any reason other
//! than a pause, including being dropped mid-stream.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::sync::{Arc, Mutex};

use bytes::BytesMut;
use futures::{stream, Stream, StreamExt};

use crate::error::ClientError;
use crate::models::{InteractionRequest, PendingInteraction};
use crate::session::SessionState;
use crate::sse::events::{EventKind, StreamEvent};
use crate::sse::parser::parse_data_line;
use crate::sse::status::{check_termination, format_status, ProgressTracker, EMPTY_RESPONSE_NOTICE};
use crate::sse::tags::extract_tag;
use crate::traits::http::ByteStream;

/// One item of an exchange stream.
#[derive(Debug, Clone, PartialEq)]
pub enum ChatChunk {
    /// Plain answer text, append to the response
    Text(String),
    /// Tool progress line; `replace` means overwrite the tool's previous line
    Progress {
        tool: String,
        text: String,
        replace: bool,
    },
    /// The exchange paused for a confirmation or parameter decision
    Pending(PendingInteraction),
}

/// A single exchange: stream of chunks ending at a sentinel, pause, or EOF.
pub type Exchange = Pin<Box<dyn Stream<Item = Result<ChatChunk, ClientError>> + Send>>;

/// Clears the session's task id unless the exchange ended paused.
struct TaskGuard {
    session: Arc<Mutex<SessionState>>,
    armed: bool,
}

impl TaskGuard {
    fn new(session: Arc<Mutex<SessionState>>) -> Self {
        Self {
            session,
            armed: true,
        }
    }

    /// Keep the task id alive across the pause for resume.
    fn disarm(&mut self) {
        self.armed = false;
    }

    fn clear_now(&mut self) {
        if self.armed {
            self.armed = false;
            if let Ok(mut session) = self.session.lock() {
                session.clear_task();
            }
        }
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.clear_now();
    }
}

struct Driver {
    bytes: ByteStream,
    // Raw bytes, split on b'\n' only; a network chunk can end mid-character.
    buffer: BytesMut,
    session: Arc<Mutex<SessionState>>,
    progress: ProgressTracker,
    // Tools with a rendered progress line; outlives the tracker entry so a
    // late replace tag still finds its line.
    lines: HashMap<String, String>,
    queued: VecDeque<Result<ChatChunk, ClientError>>,
    emitted: usize,
    finished: bool,
    guard: TaskGuard,
}

impl Driver {
    fn new(bytes: ByteStream, session: Arc<Mutex<SessionState>>) -> Self {
        let guard = TaskGuard::new(Arc::clone(&session));
        Self {
            bytes,
            buffer: BytesMut::new(),
            session,
            progress: ProgressTracker::new(),
            lines: HashMap::new(),
            queued: VecDeque::new(),
            emitted: 0,
            finished: false,
            guard,
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let index = self.buffer.iter().position(|&b| b == b'\n')?;
        let line = self.buffer.split_to(index + 1);
        Some(String::from_utf8_lossy(&line[..index]).into_owned())
    }

    fn emit(&mut self, chunk: ChatChunk) {
        self.emitted += 1;
        self.queued.push_back(Ok(chunk));
    }

    fn finish(&mut self) {
        self.guard.clear_now();
        if self.emitted == 0 {
            self.emit(ChatChunk::Text(EMPTY_RESPONSE_NOTICE.to_string()));
        }
        self.finished = true;
    }

    /// Route a piece of outward text to the answer or a progress line.
    fn emit_text(&mut self, content: &str) {
        let chunk = extract_tag(content);
        match chunk.tool_name {
            Some(tool) => {
                let replace = chunk.is_replace && self.lines.contains_key(&tool);
                self.lines.insert(tool.clone(), chunk.text.clone());
                self.emit(ChatChunk::Progress {
                    tool,
                    text: chunk.text,
                    replace,
                });
            }
            None => self.emit(ChatChunk::Text(chunk.text)),
        }
    }

    fn handle_event(&mut self, event: StreamEvent) {
        if let Some(termination) = check_termination(&event) {
            tracing::debug!(kind = event.kind.as_str(), "exchange terminated");
            if let Some(notice) = termination.notice() {
                self.emit(ChatChunk::Text(notice.to_string()));
            }
            self.finish();
            return;
        }

        if let Ok(mut session) = self.session.lock() {
            if let Some(id) = event.conversation_id() {
                session.observe_conversation(id);
            }
            if let Some(id) = event.task_id() {
                session.observe_task(id);
            }
        }

        match &event.kind {
            EventKind::Heartbeat => {}
            EventKind::StepWaitingForStart | EventKind::StepWaitingForParam => {
                let task_id = self
                    .session
                    .lock()
                    .map(|session| session.task_id().unwrap_or_default().to_string())
                    .unwrap_or_default();
                let request = if event.kind == EventKind::StepWaitingForStart {
                    InteractionRequest::confirm_from(&event)
                } else {
                    InteractionRequest::params_from(&event)
                };
                tracing::info!(tool = request.tool_name(), %task_id, "exchange paused");
                self.guard.disarm();
                self.emit(ChatChunk::Pending(PendingInteraction { task_id, request }));
                self.finished = true;
            }
            kind if kind.is_step() || kind.is_flow() => {
                if let Some(status) = format_status(&event, &mut self.progress) {
                    self.emit_text(&status);
                }
            }
            _ => {
                if let Some(text) = event.text_content() {
                    if !text.is_empty() {
                        self.emit_text(text);
                    }
                }
            }
        }
    }

    fn handle_line(&mut self, line: &str) {
        if let Some(event) = parse_data_line(line) {
            self.handle_event(event);
        }
    }
}

/// Drive an SSE byte stream into an exchange.
pub(crate) fn drive(bytes: ByteStream, session: Arc<Mutex<SessionState>>) -> Exchange {
    let driver = Driver::new(bytes, session);
    Box::pin(stream::unfold(driver, |mut driver| async move {
        loop {
            if let Some(item) = driver.queued.pop_front() {
                return Some((item, driver));
            }
            if driver.finished {
                return None;
            }
            if let Some(line) = driver.next_line() {
                driver.handle_line(&line);
                continue;
            }
            match driver.bytes.next().await {
                Some(Ok(chunk)) => {
                    driver.buffer.extend_from_slice(&chunk);
                }
                Some(Err(err)) => {
                    tracing::warn!(error = %err, "exchange stream failed");
                    driver.guard.clear_now();
                    driver.finished = true;
                    driver.queued.push_back(Err(err.into()));
                }
                None => {
                    if !driver.buffer.is_empty() {
                        let trailing = driver.buffer.split();
                        let trailing = String::from_utf8_lossy(&trailing).into_owned();
                        driver.handle_line(&trailing);
                    }
                    if !driver.finished {
                        driver.finish();
                    }
                }
            }
        }
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use crate::sse::status::{SENSITIVE_NOTICE, SERVICE_ERROR_NOTICE};

    fn byte_stream(lines: &[&str]) -> ByteStream {
        let chunks: Vec<Result<Bytes, crate::traits::http::HttpError>> = lines
            .iter()
            .map(|line| Ok(Bytes::from(format!("{line}\n"))))
            .collect();
        Box::pin(stream::iter(chunks))
    }

    async fn collect(exchange: Exchange) -> Vec<Result<ChatChunk, ClientError>> {
        exchange.collect().await
    }

    #[tokio::test]
    async fn test_text_chunks_and_done() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"hello "}}"#,
                r#"data: {"event":"text.add","content":{"text":"world"}}"#,
                "data: [DONE]",
            ]),
            Arc::clone(&session),
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text("hello ".to_string())
        );
        assert_eq!(
            chunks[1].as_ref().unwrap(),
            &ChatChunk::Text("world".to_string())
        );
    }

    #[tokio::test]
    async fn test_error_sentinel_yields_single_notice() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"partial"},"taskId":"t1"}"#,
                "data: [ERROR]",
                r#"data: {"event":"text.add","content":{"text":"after"}}"#,
            ]),
            Arc::clone(&session),
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[1].as_ref().unwrap(),
            &ChatChunk::Text(SERVICE_ERROR_NOTICE.to_string())
        );
        // Task id is cleared by the terminal sentinel.
        assert!(!session.lock().unwrap().has_task());
    }

    #[tokio::test]
    async fn test_sensitive_sentinel_notice() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(byte_stream(&["data: [SENSITIVE]"]), session);
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text(SENSITIVE_NOTICE.to_string())
        );
    }

    #[tokio::test]
    async fn test_empty_exchange_fallback() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[r#"data: {"event": "heartbeat"}"#, "data: [DONE]"]),
            session,
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text(EMPTY_RESPONSE_NOTICE.to_string())
        );
    }

    #[tokio::test]
    async fn test_eof_without_done_still_falls_back() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(byte_stream(&[]), session);
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text(EMPTY_RESPONSE_NOTICE.to_string())
        );
    }

    #[tokio::test]
    async fn test_identity_adoption_first_wins() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"a"},"conversationId":"c1","taskId":"t1"}"#,
                r#"data: {"event":"text.add","content":{"text":"b"},"conversationId":"c2","taskId":"t2"}"#,
                "data: [DONE]",
            ]),
            Arc::clone(&session),
        );
        let _ = collect(exchange).await;
        let session = session.lock().unwrap();
        assert_eq!(session.conversation_id(), Some("c1"));
        // Task id cleared at the terminal sentinel; conversation id survives.
        assert!(!session.has_task());
    }

    #[tokio::test]
    async fn test_step_events_surface_statuses_not_raw_text() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"step.init","flow":{"stepName":"search"},"content":{"text":"raw step text"}}"#,
                r#"data: {"event":"step.output","flow":{"stepName":"search"}}"#,
                "data: [DONE]",
            ]),
            session,
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 2);
        match chunks[0].as_ref().unwrap() {
            ChatChunk::Progress {
                tool,
                text,
                replace,
            } => {
                assert_eq!(tool, "search");
                assert!(text.contains("initializing tool: `search`"));
                assert!(!text.contains("raw step text"));
                assert!(!replace);
            }
            other => panic!("expected progress chunk, got {other:?}"),
        }
        match chunks[1].as_ref().unwrap() {
            ChatChunk::Progress { replace, .. } => assert!(replace),
            other => panic!("expected progress chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_replace_without_rendered_line_downgrades() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"[REPLACE:probe] status"}}"#,
                "data: [DONE]",
            ]),
            session,
        );
        let chunks = collect(exchange).await;
        match chunks[0].as_ref().unwrap() {
            ChatChunk::Progress {
                tool,
                text,
                replace,
            } => {
                assert_eq!(tool, "probe");
                assert_eq!(text, "status");
                // No line was rendered for this tool yet, so nothing to replace.
                assert!(!replace);
            }
            other => panic!("expected progress chunk, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_waiting_event_pauses_and_keeps_task() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"thinking"},"taskId":"t1"}"#,
                r#"data: {"event":"step.waiting_for_start","flow":{"stepName":"deploy"},"content":{"risk":"high","reason":"prod"},"taskId":"t1"}"#,
                r#"data: {"event":"text.add","content":{"text":"never seen"}}"#,
            ]),
            Arc::clone(&session),
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 2);
        match chunks[1].as_ref().unwrap() {
            ChatChunk::Pending(pending) => {
                assert_eq!(pending.task_id, "t1");
                assert_eq!(pending.request.tool_name(), "deploy");
            }
            other => panic!("expected pending chunk, got {other:?}"),
        }
        // Pause keeps the task id alive for resume.
        assert_eq!(session.lock().unwrap().task_id(), Some("t1"));
    }

    #[tokio::test]
    async fn test_transport_error_clears_task_and_surfaces() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let bytes: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from(
                "data: {\"event\":\"text.add\",\"content\":{\"text\":\"x\"},\"taskId\":\"t1\"}\n",
            )),
            Err(crate::traits::http::HttpError::Io("reset".to_string())),
        ]));
        let exchange = drive(bytes, Arc::clone(&session));
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 2);
        assert!(chunks[1].is_err());
        assert!(!session.lock().unwrap().has_task());
    }

    #[tokio::test]
    async fn test_dropping_exchange_clears_task() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let mut exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"a"},"taskId":"t1"}"#,
                r#"data: {"event":"text.add","content":{"text":"b"}}"#,
                "data: [DONE]",
            ]),
            Arc::clone(&session),
        );
        let first = exchange.next().await;
        assert!(first.is_some());
        assert_eq!(session.lock().unwrap().task_id(), Some("t1"));
        drop(exchange);
        assert!(!session.lock().unwrap().has_task());
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                "garbage",
                "data: {broken json",
                r#"data: {"event":"text.add","content":{"text":"ok"}}"#,
                "data: [DONE]",
            ]),
            session,
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text("ok".to_string())
        );
    }

    #[tokio::test]
    async fn test_lines_split_across_byte_chunks() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let bytes: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::from("data: {\"event\":\"text.add\",")),
            Ok(Bytes::from("\"content\":{\"text\":\"joined\"}}\ndata: [DONE]\n")),
        ]));
        let exchange = drive(bytes, session);
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text("joined".to_string())
        );
    }

    #[tokio::test]
    async fn test_multibyte_text_split_across_byte_chunks() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let line = "data: {\"event\":\"text.add\",\"content\":{\"text\":\"你好\"}}\n".as_bytes();
        // Split inside the first character's UTF-8 sequence.
        let split = line.iter().position(|&b| b >= 0x80).unwrap() + 1;
        let bytes: ByteStream = Box::pin(stream::iter(vec![
            Ok(Bytes::copy_from_slice(&line[..split])),
            Ok(Bytes::copy_from_slice(&line[split..])),
            Ok(Bytes::from("data: [DONE]\n")),
        ]));
        let exchange = drive(bytes, session);
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text("你好".to_string())
        );
    }

    #[tokio::test]
    async fn test_poisoned_session_lock_does_not_panic_driver() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let poisoner = Arc::clone(&session);
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison the lock");
        })
        .join();
        assert!(session.lock().is_err());

        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"text.add","content":{"text":"ok"},"taskId":"t1"}"#,
                "data: [DONE]",
            ]),
            session,
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 1);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text("ok".to_string())
        );
    }

    #[tokio::test]
    async fn test_flow_events_surface_fixed_lines() {
        let session = Arc::new(Mutex::new(SessionState::new()));
        let exchange = drive(
            byte_stream(&[
                r#"data: {"event":"flow.start"}"#,
                r#"data: {"event":"flow.success"}"#,
                "data: [DONE]",
            ]),
            session,
        );
        let chunks = collect(exchange).await;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].as_ref().unwrap(),
            &ChatChunk::Text("\n▶️ flow started\n".to_string())
        );
        assert_eq!(
            chunks[1].as_ref().unwrap(),
            &ChatChunk::Text("\n✅ flow finished\n".to_string())
        );
    }
}
