use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

/// Requests sent from the client to the chat backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    /// Start a user turn
    SendMessage {
        session_id: String,
        message: String,
        stream: bool,
    },
    /// Stop the in-flight assistant response
    CancelStream {
        session_id: String,
        message_id: String,
    },
    /// Ask for the streaming status of a session
    GetStatus { session_id: String },
    /// Keepalive
    Ping,
}

/// Events pushed from the chat backend to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// One incremental fragment of an assistant response
    Token {
        message_id: String,
        token: String,
        #[serde(default)]
        content: String,
        #[serde(default)]
        token_count: u64,
    },
    /// The assistant response finished (or was cancelled)
    Complete {
        message_id: String,
        #[serde(default, alias = "accumulated_content")]
        content: String,
        #[serde(default)]
        token_count: u64,
        #[serde(default)]
        cancelled: bool,
    },
    /// A turn failed on the server side
    Error {
        #[serde(default)]
        message_id: Option<String>,
        error: String,
        #[serde(default)]
        message: String,
    },
    /// Informational progress update
    Status {
        #[serde(default)]
        status: String,
        #[serde(default)]
        message_id: Option<String>,
        #[serde(default)]
        token_count: u64,
    },
    /// Keepalive reply
    Pong,
}

impl ClientFrame {
    /// Serialize to the JSON text sent on the socket.
    pub fn to_json(&self) -> Result<String, ProtocolError> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Session this request is scoped to, if any.
    pub fn session_id(&self) -> Option<&str> {
        match self {
            Self::SendMessage { session_id, .. }
            | Self::CancelStream { session_id, .. }
            | Self::GetStatus { session_id } => Some(session_id),
            Self::Ping => None,
        }
    }
}

impl ServerFrame {
    /// Parse a text frame.
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Parse a binary frame carrying UTF-8 JSON.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ProtocolError> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Short name of the frame kind, used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Token { .. } => "token",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
            Self::Status { .. } => "status",
            Self::Pong => "pong",
        }
    }
}
