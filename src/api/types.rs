//! Wire types for the HTTP and WebSocket surfaces

use serde::Serialize;
use serde_json::Value;

/// Outbound WebSocket events
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.init")]
    SessionInit {
        #[serde(rename = "sessionId")]
        session_id: String,
        #[serde(rename = "isNew")]
        is_new: bool,
    },
    #[serde(rename = "ai_message_chunk")]
    Chunk {
        #[serde(rename = "messageId")]
        message_id: String,
        delta: String,
    },
    #[serde(rename = "ai_message_end")]
    End {
        #[serde(rename = "messageId")]
        message_id: String,
    },
    #[serde(rename = "pong")]
    Pong,
    #[serde(rename = "error")]
    Error {
        error: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        detail: Option<Value>,
    },
}

impl ServerEvent {
    pub fn invalid_payload() -> Self {
        ServerEvent::Error {
            error: "Invalid message payload".to_string(),
            detail: None,
        }
    }

    pub fn unsupported(event_type: Value) -> Self {
        ServerEvent::Error {
            error: "Unsupported event type".to_string(),
            detail: Some(event_type),
        }
    }
}

/// A decoded inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `ping` or `heartbeat`
    Heartbeat,
    UserMessage { id: Option<String>, content: String },
    /// A user message with the wrong role or no content
    InvalidMessage,
    /// Any other `type`, carried as sent
    Unsupported(Value),
}

impl ClientEvent {
    /// Decode one text frame. Anything that is not a JSON object is taken as
    /// the text of a user message.
    pub fn parse(text: &str) -> Self {
        let payload = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(map)) => map,
            _ => return Self::user_message(None, Some(&Value::String(text.to_string()))),
        };

        let event_type = payload.get("type").cloned().unwrap_or(Value::Null);
        match event_type.as_str() {
            Some("ping" | "heartbeat") => ClientEvent::Heartbeat,
            Some("user_message_event") => {
                let message = payload.get("message");
                let role = message.and_then(|m| m.get("role")).and_then(Value::as_str);
                if role != Some("user") {
                    return ClientEvent::InvalidMessage;
                }
                let id = message
                    .and_then(|m| m.get("id"))
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(ToString::to_string);
                Self::user_message(id, message.and_then(|m| m.get("content")))
            }
            _ => ClientEvent::Unsupported(event_type),
        }
    }

    fn user_message(id: Option<String>, content: Option<&Value>) -> Self {
        match content.and_then(Value::as_str) {
            Some(content) if !content.trim().is_empty() => ClientEvent::UserMessage {
                id,
                content: content.to_string(),
            },
            _ => ClientEvent::InvalidMessage,
        }
    }
}

/// Health check body
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}
