//! Router error taxonomy

use thiserror::Error;

/// A single adapter's failure inside an aggregated operation
#[derive(Debug)]
pub struct ChannelFailure {
    pub channel: String,
    pub error: anyhow::Error,
}

impl std::fmt::Display for ChannelFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.channel, self.error)
    }
}

fn summarize(failures: &[ChannelFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("channel not found: {0}")]
    ChannelNotFound(String),

    #[error("connect {channel}: {source}")]
    Connect {
        channel: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("disconnect errors: [{}]", summarize(.0))]
    Disconnect(Vec<ChannelFailure>),

    #[error("broadcast errors: [{}]", summarize(.0))]
    Broadcast(Vec<ChannelFailure>),

    #[error("channel {channel} does not support {capability}")]
    Unsupported {
        channel: String,
        capability: &'static str,
    },

    /// Error returned by the adapter itself, passed through unchanged
    #[error(transparent)]
    Adapter(anyhow::Error),
}

impl RouterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, RouterError::ChannelNotFound(_))
    }

    /// Per-channel failures for aggregated errors
    pub fn failures(&self) -> &[ChannelFailure] {
        match self {
            RouterError::Disconnect(f) | RouterError::Broadcast(f) => f,
            _ => &[],
        }
    }
}

pub type Result<T> = std::result::Result<T, RouterError>;
