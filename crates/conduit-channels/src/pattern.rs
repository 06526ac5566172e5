//! Route patterns gating which handlers see which messages

use conduit_core::{ChatType, IncomingMessage};
use serde::{Deserialize, Serialize};

/// Filter criteria for a route handler. Empty components match anything;
/// non-empty components must all match.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutePattern {
    /// Allowed channel names (empty = any)
    #[serde(default)]
    pub channels: Vec<String>,
    /// Allowed chat types (empty = any)
    #[serde(default)]
    pub chat_types: Vec<ChatType>,
    /// Required literal content prefix (empty = any)
    #[serde(default)]
    pub prefix: String,
}

impl RoutePattern {
    /// Match every message
    pub fn all() -> Self {
        Self::default()
    }

    /// Match messages from any of the named channels
    pub fn from_channels<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            channels: names.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn dm_only() -> Self {
        Self {
            chat_types: vec![ChatType::Dm],
            ..Self::default()
        }
    }

    pub fn group_only() -> Self {
        Self {
            chat_types: vec![ChatType::Group],
            ..Self::default()
        }
    }

    /// Additionally require the content to start with `prefix`
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Whether `msg` satisfies every non-empty filter component
    pub fn matches(&self, msg: &IncomingMessage) -> bool {
        if !self.channels.is_empty() && !self.channels.iter().any(|c| *c == msg.channel_name) {
            return false;
        }

        if !self.chat_types.is_empty() && !self.chat_types.contains(&msg.chat_type) {
            return false;
        }

        // Byte-wise comparison over the prefix length
        if !self.prefix.is_empty() && !msg.content.as_bytes().starts_with(self.prefix.as_bytes()) {
            return false;
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(channel: &str, chat_type: ChatType, content: &str) -> IncomingMessage {
        IncomingMessage::text(channel, "chat-1", chat_type, content)
    }

    #[test]
    fn test_all_matches_everything() {
        let p = RoutePattern::all();
        assert!(p.matches(&msg("telegram", ChatType::Dm, "hi")));
        assert!(p.matches(&msg("discord", ChatType::Thread, "")));
    }

    #[test]
    fn test_from_channels() {
        let p = RoutePattern::from_channels(["telegram", "slack"]);
        assert!(p.matches(&msg("telegram", ChatType::Group, "x")));
        assert!(p.matches(&msg("slack", ChatType::Dm, "x")));
        assert!(!p.matches(&msg("discord", ChatType::Dm, "x")));
    }

    #[test]
    fn test_dm_and_group_only() {
        assert!(RoutePattern::dm_only().matches(&msg("t", ChatType::Dm, "x")));
        assert!(!RoutePattern::dm_only().matches(&msg("t", ChatType::Group, "x")));
        assert!(RoutePattern::group_only().matches(&msg("t", ChatType::Group, "x")));
        assert!(!RoutePattern::group_only().matches(&msg("t", ChatType::Channel, "x")));
    }

    #[test]
    fn test_prefix() {
        let p = RoutePattern::all().with_prefix("/help");
        assert!(p.matches(&msg("t", ChatType::Dm, "/help")));
        assert!(p.matches(&msg("t", ChatType::Dm, "/help me")));
        assert!(!p.matches(&msg("t", ChatType::Dm, "help /help")));
    }

    #[test]
    fn test_prefix_longer_than_content_never_matches() {
        let p = RoutePattern::all().with_prefix("/status");
        assert!(!p.matches(&msg("t", ChatType::Dm, "/stat")));
        assert!(!p.matches(&msg("t", ChatType::Dm, "")));
    }

    #[test]
    fn test_prefix_is_byte_exact() {
        // "é" is two bytes; a prefix of the first byte alone can't be built as
        // a &str, but a multi-byte prefix must match byte for byte.
        let p = RoutePattern::all().with_prefix("é");
        assert!(p.matches(&msg("t", ChatType::Dm, "école")));
        assert!(!p.matches(&msg("t", ChatType::Dm, "ecole")));
    }

    #[test]
    fn test_conjunctive() {
        let p = RoutePattern {
            channels: vec!["telegram".into()],
            chat_types: vec![ChatType::Group],
            prefix: "!".into(),
        };
        assert!(p.matches(&msg("telegram", ChatType::Group, "!ping")));
        assert!(!p.matches(&msg("discord", ChatType::Group, "!ping")));
        assert!(!p.matches(&msg("telegram", ChatType::Dm, "!ping")));
        assert!(!p.matches(&msg("telegram", ChatType::Group, "ping")));
    }
}
