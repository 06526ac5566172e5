//! Channel capability set implemented by every messaging-platform adapter

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use conduit_core::{Event, IncomingMessage, OutgoingMessage};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tokio::sync::mpsc;

/// Callback invoked for each inbound message
pub type MessageHandler =
    Arc<dyn Fn(IncomingMessage) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Callback invoked for each channel event
pub type EventHandler = Arc<dyn Fn(Event) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// Wrap an async closure as a [`MessageHandler`]
pub fn message_handler<F, Fut>(f: F) -> MessageHandler
where
    F: Fn(IncomingMessage) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |msg| f(msg).boxed())
}

/// Wrap an async closure as an [`EventHandler`]
pub fn event_handler<F, Fut>(f: F) -> EventHandler
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    Arc::new(move |event| f(event).boxed())
}

/// Trait that all channel adapters implement
#[async_trait]
pub trait Channel: Send + Sync {
    /// Unique adapter name, used as the registry key (e.g. "telegram")
    fn name(&self) -> &str;

    /// Establish the platform connection
    async fn connect(&self) -> Result<()>;

    /// Close the platform connection
    async fn disconnect(&self) -> Result<()>;

    /// Deliver a message to a chat on this platform
    async fn send(&self, chat_id: &str, msg: OutgoingMessage) -> Result<()>;

    /// Install the inbound-message hook, replacing any previous one
    fn on_message(&self, handler: MessageHandler);

    /// Install the event hook, replacing any previous one
    fn on_event(&self, handler: EventHandler);

    /// Extended capabilities, for platforms with incremental delivery
    fn as_streaming(&self) -> Option<&dyn StreamingChannel> {
        None
    }
}

/// Optional capabilities for platforms that support typing indicators and
/// incremental message delivery
#[async_trait]
pub trait StreamingChannel: Channel {
    async fn send_typing(&self, chat_id: &str) -> Result<()>;

    /// Deliver a message assembled from `chunks` as they arrive
    async fn send_stream(&self, chat_id: &str, chunks: mpsc::Receiver<String>) -> Result<()>;
}
