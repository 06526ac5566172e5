//! conduit-channels - channel adapter contract and message router
//!
//! Adapters implement [`Channel`] and register with a [`Router`], which
//! dispatches inbound messages to pattern-gated handlers and routes replies
//! back out through the originating adapter.

pub mod channel;
pub mod error;
pub mod pattern;
pub mod router;

pub use channel::{
    Channel, EventHandler, MessageHandler, StreamingChannel, event_handler, message_handler,
};
pub use error::{ChannelFailure, RouterError};
pub use pattern::RoutePattern;
pub use router::{RouteHandler, Router, RouterConfig};
