//! Gateway wire protocol: one JSON object per frame, same shape both ways

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Frame discriminator. Unrecognized values are kept in `Other` so the
/// server can answer them with an error frame instead of failing to decode.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MessageType {
    // Requests
    Chat,
    Ping,
    Auth,
    Subscribe,
    // Replies
    Response,
    Pong,
    Error,
    // Out-of-band pushes
    Event,
    Other(String),
}

impl MessageType {
    pub fn as_str(&self) -> &str {
        match self {
            MessageType::Chat => "chat",
            MessageType::Ping => "ping",
            MessageType::Auth => "auth",
            MessageType::Subscribe => "subscribe",
            MessageType::Response => "response",
            MessageType::Pong => "pong",
            MessageType::Error => "error",
            MessageType::Event => "event",
            MessageType::Other(s) => s,
        }
    }
}

impl From<String> for MessageType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "chat" => MessageType::Chat,
            "ping" => MessageType::Ping,
            "auth" => MessageType::Auth,
            "subscribe" => MessageType::Subscribe,
            "response" => MessageType::Response,
            "pong" => MessageType::Pong,
            "error" => MessageType::Error,
            "event" => MessageType::Event,
            _ => MessageType::Other(s),
        }
    }
}

impl From<MessageType> for String {
    fn from(t: MessageType) -> Self {
        match t {
            MessageType::Other(s) => s,
            other => other.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One protocol frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Correlation id; replies echo the request's id
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub message_type: MessageType,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub content: String,
    /// Topic
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub channel: String,
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub error: String,
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(id: impl Into<String>, message_type: MessageType) -> Self {
        Self {
            id: id.into(),
            message_type,
            content: String::new(),
            channel: String::new(),
            data: Map::new(),
            error: String::new(),
            timestamp: Utc::now(),
        }
    }

    /// Reply to a request carrying text
    pub fn response(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::new(id, MessageType::Response)
        }
    }

    /// Reply to a request carrying structured data
    pub fn response_data(id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            data,
            ..Self::new(id, MessageType::Response)
        }
    }

    pub fn pong(id: impl Into<String>) -> Self {
        Self::new(id, MessageType::Pong)
    }

    pub fn error(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            ..Self::new(id, MessageType::Error)
        }
    }

    /// Uncorrelated push; the event name travels in `content`
    pub fn event(event: impl Into<String>, channel: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            content: event.into(),
            channel: channel.into(),
            data,
            ..Self::new(String::new(), MessageType::Event)
        }
    }
}
