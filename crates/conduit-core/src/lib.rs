//! conduit-core - shared model for the conduit hub
//!
//! This crate provides:
//! - The channel-layer message model (incoming/outgoing messages, media, events)
//! - The backend processor contract used by both the router and the gateway

pub mod processor;
pub mod types;

pub use processor::{AgentProcessor, ProcessorError, process_with_cancel};
pub use types::{
    ChatType, Event, EventType, IncomingMessage, Media, MediaType, MessageFormat, Metadata,
    OutgoingMessage,
};
