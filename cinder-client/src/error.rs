//! Client-side errors.

use std::fmt;

use cinder_core::ChatError;

/// Errors surfaced by the client library.
#[derive(Debug)]
pub enum ClientError {
    /// Could not reach the relay.
    ConnectionFailed(String),
    /// Room code failed format validation.
    InvalidRoomCode,
    /// Protocol-level error from the core.
    Chat(ChatError),
    /// WebSocket transport failure.
    WebSocket(String),
    /// The session driver has already shut down.
    SessionClosed,
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConnectionFailed(msg) => write!(f, "connection failed: {}", msg),
            Self::InvalidRoomCode => write!(f, "invalid room code"),
            Self::Chat(e) => write!(f, "protocol error: {}", e),
            Self::WebSocket(msg) => write!(f, "websocket error: {}", msg),
            Self::SessionClosed => write!(f, "session closed"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<ChatError> for ClientError {
    fn from(e: ChatError) -> Self {
        Self::Chat(e)
    }
}
