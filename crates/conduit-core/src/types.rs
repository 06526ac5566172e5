//! Shared message types for the channel layer

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Free-form per-channel metadata
pub type Metadata = HashMap<String, serde_json::Value>;

/// Kind of conversation a message belongs to
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    /// One-to-one direct message
    #[default]
    Dm,
    Group,
    /// Broadcast-style channel (e.g. a Telegram channel or Discord text channel)
    Channel,
    Thread,
}

impl std::fmt::Display for ChatType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Dm => write!(f, "dm"),
            Self::Group => write!(f, "group"),
            Self::Channel => write!(f, "channel"),
            Self::Thread => write!(f, "thread"),
        }
    }
}

/// Kind of attached media
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Voice,
}

/// Attached media. Either `url` (remote) or `data` (raw bytes) is set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Media {
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Vec<u8>>,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub caption: String,
}

impl Media {
    /// Media hosted at a remote URL
    pub fn remote(media_type: MediaType, url: impl Into<String>) -> Self {
        Self {
            media_type,
            url: Some(url.into()),
            data: None,
            mime_type: String::new(),
            filename: String::new(),
            caption: String::new(),
        }
    }

    /// Media carried inline as raw bytes
    pub fn inline(media_type: MediaType, data: Vec<u8>) -> Self {
        Self {
            media_type,
            url: None,
            data: Some(data),
            mime_type: String::new(),
            filename: String::new(),
            caption: String::new(),
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = caption.into();
        self
    }
}

/// Message received from a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: String,
    /// Name of the adapter the message came from (e.g. "telegram")
    pub channel_name: String,
    pub chat_id: String,
    pub chat_type: ChatType,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl IncomingMessage {
    /// Build a plain-text message with a fresh id and the current timestamp
    pub fn text(
        channel_name: impl Into<String>,
        chat_id: impl Into<String>,
        chat_type: ChatType,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            channel_name: channel_name.into(),
            chat_id: chat_id.into(),
            chat_type,
            sender_id: String::new(),
            sender_name: String::new(),
            content: content.into(),
            media: Vec::new(),
            reply_to: None,
            timestamp: Utc::now(),
            metadata: Metadata::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_sender(mut self, id: impl Into<String>, name: impl Into<String>) -> Self {
        self.sender_id = id.into();
        self.sender_name = name.into();
        self
    }

    /// Conversation key used for backend sessions: `<channel>:<chat>`
    pub fn session_id(&self) -> String {
        format!("{}:{}", self.channel_name, self.chat_id)
    }
}

/// Markup of outgoing text
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageFormat {
    #[default]
    Plain,
    Markdown,
    Html,
}

/// Message to be delivered through a channel adapter
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OutgoingMessage {
    pub content: String,
    #[serde(default)]
    pub media: Vec<Media>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(default)]
    pub format: MessageFormat,
    #[serde(default)]
    pub metadata: Metadata,
}

impl OutgoingMessage {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn reply_to(mut self, message_id: impl Into<String>) -> Self {
        self.reply_to = Some(message_id.into());
        self
    }

    pub fn with_format(mut self, format: MessageFormat) -> Self {
        self.format = format;
        self
    }

    pub fn with_media(mut self, media: Media) -> Self {
        self.media.push(media);
        self
    }
}

/// Non-message occurrence raised by an adapter
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    MessageEdited,
    MessageDeleted,
    Reaction,
    Typing,
    Presence,
    MemberJoined,
    MemberLeft,
    ChannelCreated,
    ChannelDeleted,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::MessageEdited => "message_edited",
            Self::MessageDeleted => "message_deleted",
            Self::Reaction => "reaction",
            Self::Typing => "typing",
            Self::Presence => "presence",
            Self::MemberJoined => "member_joined",
            Self::MemberLeft => "member_left",
            Self::ChannelCreated => "channel_created",
            Self::ChannelDeleted => "channel_deleted",
        };
        f.write_str(s)
    }
}

/// Channel event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    #[serde(rename = "type")]
    pub event_type: EventType,
    pub channel_name: String,
    pub chat_id: String,
    #[serde(default)]
    pub data: Metadata,
    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(
        event_type: EventType,
        channel_name: impl Into<String>,
        chat_id: impl Into<String>,
    ) -> Self {
        Self {
            event_type,
            channel_name: channel_name.into(),
            chat_id: chat_id.into(),
            data: Metadata::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chat_type_wire_names() {
        assert_eq!(serde_json::to_string(&ChatType::Dm).unwrap(), "\"dm\"");
        assert_eq!(serde_json::to_string(&ChatType::Thread).unwrap(), "\"thread\"");
        let parsed: ChatType = serde_json::from_str("\"group\"").unwrap();
        assert_eq!(parsed, ChatType::Group);
        assert_eq!(ChatType::Channel.to_string(), "channel");
    }

    #[test]
    fn test_event_type_wire_names_match_display() {
        let all = [
            EventType::MessageEdited,
            EventType::MessageDeleted,
            EventType::Reaction,
            EventType::Typing,
            EventType::Presence,
            EventType::MemberJoined,
            EventType::MemberLeft,
            EventType::ChannelCreated,
            EventType::ChannelDeleted,
        ];
        for et in all {
            let json = serde_json::to_string(&et).unwrap();
            assert_eq!(json, format!("\"{}\"", et));
        }
    }

    #[test]
    fn test_incoming_session_id() {
        let msg = IncomingMessage::text("telegram", "42", ChatType::Dm, "hi");
        assert_eq!(msg.session_id(), "telegram:42");
        assert!(!msg.id.is_empty());
    }

    #[test]
    fn test_outgoing_builder() {
        let msg = OutgoingMessage::text("hello")
            .reply_to("m-1")
            .with_format(MessageFormat::Markdown)
            .with_media(Media::remote(MediaType::Image, "https://example.com/a.png"));
        assert_eq!(msg.reply_to.as_deref(), Some("m-1"));
        assert_eq!(msg.format, MessageFormat::Markdown);
        assert_eq!(msg.media.len(), 1);
        assert!(msg.media[0].data.is_none());
    }

    #[test]
    fn test_outgoing_defaults_to_plain() {
        let msg: OutgoingMessage = serde_json::from_str(r#"{"content":"x"}"#).unwrap();
        assert_eq!(msg.format, MessageFormat::Plain);
        assert!(msg.reply_to.is_none());
    }

    #[test]
    fn test_media_serializes_type_field() {
        let media = Media::inline(MediaType::Voice, vec![1, 2, 3]).with_mime_type("audio/ogg");
        let json = serde_json::to_value(&media).unwrap();
        assert_eq!(json["type"], "voice");
        assert!(json.get("url").is_none());
    }

    #[test]
    fn test_event_with_data() {
        let event = Event::new(EventType::Reaction, "discord", "c1")
            .with_data("emoji", serde_json::json!("👍"));
        assert_eq!(event.data["emoji"], "👍");
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "reaction");
    }
}
