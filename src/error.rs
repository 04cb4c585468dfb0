//! Client error taxonomy.
//!
//! Errors distinguish who is at fault: the transport, the server, the wire
//! format, or the caller. The crate never retries; callers use
//! [`ClientError::is_retryable`] to decide.

use thiserror::Error;

use crate::traits::http::HttpError;

/// Errors surfaced by the chat client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Base URL did not pass validation at construction
    #[error("invalid base URL: {0}")]
    InvalidBaseUrl(String),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(#[from] HttpError),

    /// Server answered a side request with a non-success status
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response body violated the wire format
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Resume was requested while no exchange is paused
    #[error("no pending task to resume")]
    NoPendingTask,
}

impl ClientError {
    /// Whether retrying the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(err) => matches!(
                err,
                HttpError::Timeout(_) | HttpError::ConnectionFailed(_) | HttpError::Io(_)
            ),
            ClientError::Api { status, .. } => *status >= 500,
            ClientError::InvalidBaseUrl(_)
            | ClientError::Protocol(_)
            | ClientError::NoPendingTask => false,
        }
    }
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ClientError>;
