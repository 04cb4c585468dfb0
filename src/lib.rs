//! Hermes chat client - streaming chat with tool-execution lifecycle events
//!
//! A client library for the Hermes agent chat API. Questions open streaming
//! SSE exchanges; server-side tool steps surface as progress chunks and can
//! pause the exchange for a confirm or parameter decision, answered through
//! [`ChatClient::resume`].

pub mod adapters;
pub mod client;
pub mod error;
pub mod models;
pub mod session;
pub mod sse;
pub mod traits;

pub use client::{ChatChunk, ChatClient, ChatConfig, Exchange};
pub use error::ClientError;
pub use models::{
    ConversationSummary, Decision, Features, InteractionRequest, PendingInteraction, RiskLevel,
};
pub use session::SessionState;
pub use sse::{EventKind, StreamEvent};
