//! Central router between channel adapters, pattern-gated handlers and the
//! backend processor

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use conduit_core::{AgentProcessor, Event, IncomingMessage, OutgoingMessage, process_with_cancel};
use futures_util::future::join_all;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::channel::{Channel, EventHandler, MessageHandler, event_handler, message_handler};
use crate::error::{ChannelFailure, Result, RouterError};
use crate::pattern::RoutePattern;

/// Router tuning
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Upper bound on a single backend processor call (None = unbounded)
    pub processor_timeout: Option<Duration>,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            processor_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// A handler gated by a pattern
pub struct RouteHandler {
    pub pattern: RoutePattern,
    pub handler: MessageHandler,
}

struct RouterInner {
    channels: RwLock<HashMap<String, Arc<dyn Channel>>>,
    /// Append-only; insertion order is evaluation order
    handlers: RwLock<Vec<Arc<RouteHandler>>>,
    event_handlers: RwLock<Vec<EventHandler>>,
    agent: RwLock<Option<Arc<dyn AgentProcessor>>>,
    config: RouterConfig,
    shutdown: CancellationToken,
}

/// Routes inbound messages from registered channels to matching handlers and
/// outbound replies back to channels. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Router {
    inner: Arc<RouterInner>,
}

impl Router {
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            inner: Arc::new(RouterInner {
                channels: RwLock::new(HashMap::new()),
                handlers: RwLock::new(Vec::new()),
                event_handlers: RwLock::new(Vec::new()),
                agent: RwLock::new(None),
                config,
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Token cancelled on shutdown; in-flight processor calls observe it
    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Install or replace the backend processor
    pub async fn set_agent(&self, agent: Arc<dyn AgentProcessor>) {
        *self.inner.agent.write().await = Some(agent);
        info!("Agent processor configured");
    }

    /// Register a channel adapter under its own name, replacing any adapter
    /// already registered under that name, and wire its hooks to this router.
    pub async fn register(&self, channel: Arc<dyn Channel>) {
        let name = channel.name().to_string();

        let weak = Arc::downgrade(&self.inner);
        channel.on_message(message_handler(move |msg| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    Router { inner }.route(msg).await;
                }
                Ok(())
            }
        }));

        let weak = Arc::downgrade(&self.inner);
        channel.on_event(event_handler(move |event| {
            let weak = weak.clone();
            async move {
                if let Some(inner) = weak.upgrade() {
                    Router { inner }.dispatch_event(event).await;
                }
                Ok(())
            }
        }));

        let previous = self.inner.channels.write().await.insert(name.clone(), channel);
        if previous.is_some() {
            info!(channel = %name, "Channel re-registered, previous adapter replaced");
        } else {
            info!(channel = %name, "Channel registered");
        }
    }

    /// Remove a channel from the registry without disconnecting it
    pub async fn unregister(&self, name: &str) {
        if self.inner.channels.write().await.remove(name).is_some() {
            info!(channel = %name, "Channel unregistered");
        }
    }

    pub async fn get_channel(&self, name: &str) -> Option<Arc<dyn Channel>> {
        self.inner.channels.read().await.get(name).cloned()
    }

    /// Names of all registered channels, sorted
    pub async fn list_channels(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.channels.read().await.keys().cloned().collect();
        names.sort();
        names
    }

    /// Append a handler gated by `pattern`
    pub async fn on_message(&self, pattern: RoutePattern, handler: MessageHandler) {
        let mut handlers = self.inner.handlers.write().await;
        handlers.push(Arc::new(RouteHandler { pattern, handler }));
        debug!("Route handler added ({} total)", handlers.len());
    }

    /// Append a handler for channel events
    pub async fn on_event(&self, handler: EventHandler) {
        self.inner.event_handlers.write().await.push(handler);
    }

    pub async fn handler_count(&self) -> usize {
        self.inner.handlers.read().await.len()
    }

    /// Connect every registered channel, stopping at the first failure.
    /// Channels connected before the failure stay connected.
    pub async fn connect_all(&self) -> Result<()> {
        for (name, channel) in self.snapshot_channels().await {
            if let Err(e) = channel.connect().await {
                error!(channel = %name, "Failed to connect channel: {}", e);
                return Err(RouterError::Connect {
                    channel: name,
                    source: e,
                });
            }
            info!(channel = %name, "Channel connected");
        }
        Ok(())
    }

    /// Disconnect every registered channel, collecting all failures
    pub async fn disconnect_all(&self) -> Result<()> {
        let mut failures = Vec::new();
        for (name, channel) in self.snapshot_channels().await {
            match channel.disconnect().await {
                Ok(()) => info!(channel = %name, "Channel disconnected"),
                Err(error) => {
                    warn!(channel = %name, "Failed to disconnect channel: {}", error);
                    failures.push(ChannelFailure {
                        channel: name,
                        error,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RouterError::Disconnect(failures))
        }
    }

    /// Send a message to a chat on a named channel
    pub async fn send(&self, channel_name: &str, chat_id: &str, msg: OutgoingMessage) -> Result<()> {
        let channel = self
            .get_channel(channel_name)
            .await
            .ok_or_else(|| RouterError::ChannelNotFound(channel_name.to_string()))?;

        debug!(channel = %channel_name, chat = %chat_id, "Sending message");
        channel.send(chat_id, msg).await.map_err(RouterError::Adapter)
    }

    /// Send `msg` to every `channel name -> chat id` target. Targets naming an
    /// unregistered channel are skipped; every registered target is attempted
    /// concurrently and failures are aggregated.
    pub async fn broadcast(&self, targets: &HashMap<String, String>, msg: OutgoingMessage) -> Result<()> {
        let channels = self.inner.channels.read().await.clone();

        let sends = targets.iter().filter_map(|(name, chat_id)| {
            let Some(channel) = channels.get(name).cloned() else {
                debug!(channel = %name, "Broadcast target not registered, skipping");
                return None;
            };
            let msg = msg.clone();
            Some(async move {
                channel
                    .send(chat_id, msg)
                    .await
                    .map_err(|error| ChannelFailure {
                        channel: name.clone(),
                        error,
                    })
            })
        });

        let mut failures: Vec<ChannelFailure> = join_all(sends)
            .await
            .into_iter()
            .filter_map(|r| r.err())
            .collect();

        if failures.is_empty() {
            Ok(())
        } else {
            failures.sort_by(|a, b| a.channel.cmp(&b.channel));
            warn!("Broadcast finished with {} failed target(s)", failures.len());
            Err(RouterError::Broadcast(failures))
        }
    }

    /// Show a typing indicator on a channel that supports it
    pub async fn send_typing(&self, channel_name: &str, chat_id: &str) -> Result<()> {
        let channel = self
            .get_channel(channel_name)
            .await
            .ok_or_else(|| RouterError::ChannelNotFound(channel_name.to_string()))?;
        let streaming = channel.as_streaming().ok_or_else(|| RouterError::Unsupported {
            channel: channel_name.to_string(),
            capability: "typing indicators",
        })?;
        streaming.send_typing(chat_id).await.map_err(RouterError::Adapter)
    }

    /// Stream chunks to a channel that supports incremental delivery
    pub async fn send_stream(
        &self,
        channel_name: &str,
        chat_id: &str,
        chunks: mpsc::Receiver<String>,
    ) -> Result<()> {
        let channel = self
            .get_channel(channel_name)
            .await
            .ok_or_else(|| RouterError::ChannelNotFound(channel_name.to_string()))?;
        let streaming = channel.as_streaming().ok_or_else(|| RouterError::Unsupported {
            channel: channel_name.to_string(),
            capability: "streaming",
        })?;
        streaming
            .send_stream(chat_id, chunks)
            .await
            .map_err(RouterError::Adapter)
    }

    /// Handler that forwards the message to the backend processor and sends
    /// the reply back to the originating chat. Does nothing if no processor
    /// is configured.
    pub fn process_with_agent(&self) -> MessageHandler {
        let weak: Weak<RouterInner> = Arc::downgrade(&self.inner);
        message_handler(move |msg: IncomingMessage| {
            let weak = weak.clone();
            async move {
                let Some(inner) = weak.upgrade() else {
                    return Ok(());
                };
                let router = Router { inner };

                let Some(agent) = router.inner.agent.read().await.clone() else {
                    warn!(
                        channel = %msg.channel_name,
                        chat = %msg.chat_id,
                        "No agent configured, message not processed"
                    );
                    return Ok(());
                };

                let session_id = msg.session_id();
                info!(
                    channel = %msg.channel_name,
                    chat = %msg.chat_id,
                    from = %msg.sender_name,
                    "Processing message"
                );

                let response = process_with_cancel(
                    agent.as_ref(),
                    &router.inner.shutdown,
                    router.inner.config.processor_timeout,
                    &session_id,
                    &msg.content,
                )
                .await?;

                router
                    .send(
                        &msg.channel_name,
                        &msg.chat_id,
                        OutgoingMessage::text(response).reply_to(msg.id.clone()),
                    )
                    .await?;
                Ok(())
            }
        })
    }

    /// Run every matching handler, in registration order, against `msg`.
    /// Handler failures are logged and never stop evaluation.
    async fn route(&self, msg: IncomingMessage) {
        // Snapshot so handlers added mid-dispatch don't see this message
        let handlers: Vec<Arc<RouteHandler>> = self.inner.handlers.read().await.clone();

        debug!(
            channel = %msg.channel_name,
            chat = %msg.chat_id,
            "Routing message through {} handler(s)",
            handlers.len()
        );

        for route in handlers.iter().filter(|h| h.pattern.matches(&msg)) {
            if let Err(e) = (route.handler)(msg.clone()).await {
                error!(
                    channel = %msg.channel_name,
                    chat = %msg.chat_id,
                    "Handler error: {:#}",
                    e
                );
            }
        }
    }

    async fn dispatch_event(&self, event: Event) {
        let handlers: Vec<EventHandler> = self.inner.event_handlers.read().await.clone();
        for handler in handlers {
            if let Err(e) = handler(event.clone()).await {
                error!(
                    channel = %event.channel_name,
                    chat = %event.chat_id,
                    event = %event.event_type,
                    "Event handler error: {:#}",
                    e
                );
            }
        }
    }

    async fn snapshot_channels(&self) -> Vec<(String, Arc<dyn Channel>)> {
        let mut channels: Vec<(String, Arc<dyn Channel>)> = self
            .inner
            .channels
            .read()
            .await
            .iter()
            .map(|(name, channel)| (name.clone(), channel.clone()))
            .collect();
        channels.sort_by(|a, b| a.0.cmp(&b.0));
        channels
    }
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RouterInner {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
