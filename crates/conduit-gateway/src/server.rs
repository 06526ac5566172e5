//! Gateway WebSocket server, Axum-based HTTP + WS

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{Message as WsMessage, WebSocket};
use axum::extract::{ConnectInfo, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use axum::routing::get;
use conduit_core::{AgentProcessor, process_with_cancel};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};

use crate::auth::{AllowAll, AuthHook};
use crate::protocol::{Message, MessageType};
use crate::session::{OpenSession, SessionRegistry};

/// Gateway settings
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub bind: SocketAddr,
    /// Per-session outbound queue bound
    pub queue_capacity: usize,
    /// Upper bound on a single `chat` processor call (None = unbounded)
    pub processor_timeout: Option<Duration>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 18789)),
            queue_capacity: 256,
            processor_timeout: Some(Duration::from_secs(120)),
        }
    }
}

/// Body of `/health`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Health {
    pub status: String,
    pub clients: usize,
}

/// Shared state for all WebSocket connections
#[derive(Clone)]
struct GatewayState {
    sessions: Arc<SessionRegistry>,
    processor: Option<Arc<dyn AgentProcessor>>,
    auth: Arc<dyn AuthHook>,
    processor_timeout: Option<Duration>,
    cancel: CancellationToken,
    serving: Arc<AtomicBool>,
}

/// Cloneable view of a gateway for use outside the server task
#[derive(Clone)]
pub struct GatewayHandle {
    sessions: Arc<SessionRegistry>,
    serving: Arc<AtomicBool>,
}

impl GatewayHandle {
    /// Number of currently open sessions
    pub async fn client_count(&self) -> usize {
        self.sessions.count().await
    }

    /// Push `msg` to every open session without waiting on any of them.
    /// Returns how many sessions it was queued for.
    pub async fn broadcast(&self, msg: Message) -> usize {
        let queued = self.sessions.broadcast(&msg).await;
        debug!("Broadcast {} queued for {} session(s)", msg.message_type, queued);
        queued
    }

    pub fn is_healthy(&self) -> bool {
        self.serving.load(Ordering::SeqCst)
    }

    pub async fn health(&self) -> Health {
        Health {
            status: if self.is_healthy() { "ok" } else { "stopped" }.to_string(),
            clients: self.client_count().await,
        }
    }
}

/// The gateway server
pub struct GatewayServer {
    config: GatewayConfig,
    state: GatewayState,
}

impl GatewayServer {
    /// Create a gateway in echo mode; attach a processor with
    /// [`GatewayServer::with_processor`]
    pub fn new(config: GatewayConfig) -> Self {
        let state = GatewayState {
            sessions: Arc::new(SessionRegistry::new(config.queue_capacity)),
            processor: None,
            auth: Arc::new(AllowAll),
            processor_timeout: config.processor_timeout,
            cancel: CancellationToken::new(),
            serving: Arc::new(AtomicBool::new(false)),
        };
        Self { config, state }
    }

    pub fn with_processor(mut self, processor: Arc<dyn AgentProcessor>) -> Self {
        self.state.processor = Some(processor);
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn AuthHook>) -> Self {
        self.state.auth = auth;
        self
    }

    pub fn handle(&self) -> GatewayHandle {
        GatewayHandle {
            sessions: self.state.sessions.clone(),
            serving: self.state.serving.clone(),
        }
    }

    fn router(&self) -> Router {
        Router::new()
            .route("/ws", get(ws_handler))
            .route("/health", get(health_handler))
            .layer(CorsLayer::permissive())
            .with_state(self.state.clone())
    }

    /// Bind the configured address and serve until `cancel` fires
    pub async fn run(self, cancel: CancellationToken) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.bind).await?;
        self.serve(listener, cancel).await
    }

    /// Serve on an already-bound listener until `cancel` fires
    pub async fn serve(mut self, listener: TcpListener, cancel: CancellationToken) -> anyhow::Result<()> {
        self.state.cancel = cancel.clone();
        let addr = listener.local_addr()?;
        let app = self.router();

        self.state.serving.store(true, Ordering::SeqCst);
        info!(
            "Gateway listening on {} ({})",
            addr,
            if self.state.processor.is_some() { "processor attached" } else { "echo mode" }
        );

        let result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await;

        self.state.serving.store(false, Ordering::SeqCst);
        info!("Gateway stopped");
        result?;
        Ok(())
    }

    /// Start the server in the background, returning a handle
    pub fn spawn(
        self,
        listener: TcpListener,
        cancel: CancellationToken,
    ) -> (GatewayHandle, tokio::task::JoinHandle<anyhow::Result<()>>) {
        let handle = self.handle();
        let task = tokio::spawn(async move { self.serve(listener, cancel).await });
        (handle, task)
    }
}

// ── HTTP Handlers ──

async fn health_handler(State(state): State<GatewayState>) -> impl IntoResponse {
    axum::Json(Health {
        status: "ok".to_string(),
        clients: state.sessions.count().await,
    })
}

// ── WebSocket Handler ──

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
) -> impl IntoResponse {
    debug!("WebSocket upgrade from {}", addr);
    ws.on_upgrade(move |socket| handle_ws(socket, state, addr))
}

async fn handle_ws(socket: WebSocket, state: GatewayState, addr: SocketAddr) {
    let OpenSession {
        id,
        outbound,
        mut queue,
    } = state.sessions.open().await;
    info!(session = %id, "Client connected from {}", addr);

    let (mut ws_sender, mut ws_receiver) = socket.split();

    // Writer: the only consumer of this session's queue
    let writer_session = id.clone();
    let mut writer = tokio::spawn(async move {
        while let Some(msg) = queue.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!(session = %writer_session, "Failed to serialize frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_sender.send(WsMessage::Text(json.into())).await {
                debug!(session = %writer_session, "Write failed: {}", e);
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    // Reader: frames are handled one at a time, in arrival order
    let reader = async {
        while let Some(frame) = ws_receiver.next().await {
            let reply = match frame {
                Ok(WsMessage::Text(text)) => handle_frame(&state, &id, text.as_str()).await,
                // Binary frames carry the same JSON, UTF-8 encoded
                Ok(WsMessage::Binary(bytes)) => match std::str::from_utf8(&bytes) {
                    Ok(raw) => handle_frame(&state, &id, raw).await,
                    Err(e) => {
                        warn!(session = %id, "Binary frame is not UTF-8: {}", e);
                        Message::error("", format!("invalid message format: {}", e))
                    }
                },
                Ok(WsMessage::Close(_)) => break,
                // Ping/pong are answered by the transport
                Ok(_) => continue,
                Err(e) => {
                    warn!(session = %id, "WebSocket error: {}", e);
                    break;
                }
            };

            if outbound.send(reply).await.is_err() {
                break;
            }
        }
    };

    tokio::select! {
        _ = reader => {}
        _ = &mut writer => {}
        _ = state.cancel.cancelled() => {}
    }

    state.sessions.close(&id).await;
    writer.abort();
    info!(session = %id, "Client {} disconnected", addr);
}

/// Decode one inbound frame and produce its reply
async fn handle_frame(state: &GatewayState, session_id: &str, raw: &str) -> Message {
    let msg: Message = match serde_json::from_str(raw) {
        Ok(m) => m,
        Err(e) => {
            warn!(session = %session_id, "Malformed frame: {}", e);
            return Message::error("", format!("invalid message format: {}", e));
        }
    };

    debug!(session = %session_id, id = %msg.id, "Frame {}", msg.message_type);

    match msg.message_type {
        MessageType::Ping => Message::pong(msg.id),

        MessageType::Chat => handle_chat(state, session_id, msg).await,

        MessageType::Auth => {
            let authenticated = state.auth.authenticate(session_id, &msg.data).await;
            if !authenticated {
                warn!(session = %session_id, "Authentication rejected");
            }
            Message::response_data(msg.id, flag("authenticated", authenticated))
        }

        // Acknowledged only; broadcasts are not filtered by topic
        MessageType::Subscribe => {
            debug!(session = %session_id, topic = %msg.channel, "Subscribe acknowledged");
            Message::response_data(msg.id, flag("subscribed", true))
        }

        other => {
            warn!(session = %session_id, "Unknown message type: {}", other);
            Message::error(msg.id, format!("unknown message type: {}", other))
        }
    }
}

async fn handle_chat(state: &GatewayState, session_id: &str, msg: Message) -> Message {
    let Some(processor) = state.processor.as_ref() else {
        return Message::response(msg.id, format!("Message received: {}", msg.content));
    };

    let conversation = format!("gateway:{}", session_id);
    match process_with_cancel(
        processor.as_ref(),
        &state.cancel,
        state.processor_timeout,
        &conversation,
        &msg.content,
    )
    .await
    {
        Ok(reply) => Message::response(msg.id, reply),
        Err(e) => {
            error!(session = %session_id, id = %msg.id, "Processor error: {}", e);
            Message::error(msg.id, e.to_string())
        }
    }
}

fn flag(key: &str, value: bool) -> Map<String, Value> {
    let mut data = Map::new();
    data.insert(key.to_string(), Value::Bool(value));
    data
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct FixedProcessor(Result<&'static str, &'static str>);

    #[async_trait]
    impl AgentProcessor for FixedProcessor {
        async fn process(&self, session_id: &str, _content: &str) -> anyhow::Result<String> {
            assert!(session_id.starts_with("gateway:"));
            self.0.map(String::from).map_err(|e| anyhow::anyhow!(e))
        }
    }

    struct Hanging;

    #[async_trait]
    impl AgentProcessor for Hanging {
        async fn process(&self, _session_id: &str, _content: &str) -> anyhow::Result<String> {
            std::future::pending::<anyhow::Result<String>>().await
        }
    }

    struct DenyAll;

    #[async_trait]
    impl AuthHook for DenyAll {
        async fn authenticate(&self, _session_id: &str, _data: &Map<String, Value>) -> bool {
            false
        }
    }

    fn state_with(processor: Option<Arc<dyn AgentProcessor>>) -> GatewayState {
        let mut server = GatewayServer::new(GatewayConfig::default());
        server.state.processor = processor;
        server.state
    }

    #[tokio::test]
    async fn test_ping() {
        let state = state_with(None);
        let reply = handle_frame(&state, "s1", r#"{"id":"ping-1","type":"ping"}"#).await;
        assert_eq!(reply.message_type, MessageType::Pong);
        assert_eq!(reply.id, "ping-1");
    }

    #[tokio::test]
    async fn test_chat_echo_mode() {
        let state = state_with(None);
        let reply = handle_frame(
            &state,
            "s1",
            r#"{"id":"chat-1","type":"chat","content":"Hello!"}"#,
        )
        .await;
        assert_eq!(reply.message_type, MessageType::Response);
        assert_eq!(reply.id, "chat-1");
        assert_eq!(reply.content, "Message received: Hello!");
    }

    #[tokio::test]
    async fn test_chat_with_processor() {
        let state = state_with(Some(Arc::new(FixedProcessor(Ok("Hello from agent!")))));
        let reply = handle_frame(
            &state,
            "s1",
            r#"{"id":"chat-1","type":"chat","content":"Hello, agent!"}"#,
        )
        .await;
        assert_eq!(reply.message_type, MessageType::Response);
        assert_eq!(reply.id, "chat-1");
        assert_eq!(reply.content, "Hello from agent!");
    }

    #[tokio::test]
    async fn test_chat_processor_failure() {
        let state = state_with(Some(Arc::new(FixedProcessor(Err("model unavailable")))));
        let reply = handle_frame(&state, "s1", r#"{"id":"chat-2","type":"chat","content":"hi"}"#)
            .await;
        assert_eq!(reply.message_type, MessageType::Error);
        assert_eq!(reply.id, "chat-2");
        assert_eq!(reply.error, "model unavailable");
    }

    #[tokio::test]
    async fn test_chat_cancelled() {
        let state = state_with(Some(Arc::new(Hanging)));
        state.cancel.cancel();
        let reply = handle_frame(&state, "s1", r#"{"id":"chat-3","type":"chat","content":"hi"}"#)
            .await;
        assert_eq!(reply.message_type, MessageType::Error);
        assert_eq!(reply.error, "processing cancelled");
    }

    #[tokio::test]
    async fn test_chat_timeout() {
        let mut state = state_with(Some(Arc::new(Hanging)));
        state.processor_timeout = Some(Duration::from_millis(20));
        let reply = handle_frame(&state, "s1", r#"{"id":"chat-4","type":"chat","content":"hi"}"#)
            .await;
        assert_eq!(reply.message_type, MessageType::Error);
        assert!(reply.error.contains("timed out"));
    }

    #[tokio::test]
    async fn test_auth_and_subscribe() {
        let state = state_with(None);
        let reply = handle_frame(
            &state,
            "s1",
            r#"{"id":"auth-1","type":"auth","data":{"token":"test-token"}}"#,
        )
        .await;
        assert_eq!(reply.message_type, MessageType::Response);
        assert_eq!(reply.id, "auth-1");
        assert_eq!(reply.data["authenticated"], true);

        let reply = handle_frame(
            &state,
            "s1",
            r#"{"id":"sub-1","type":"subscribe","channel":"test-channel"}"#,
        )
        .await;
        assert_eq!(reply.id, "sub-1");
        assert_eq!(reply.data["subscribed"], true);
    }

    #[tokio::test]
    async fn test_custom_auth_hook() {
        let mut state = state_with(None);
        state.auth = Arc::new(DenyAll);
        let reply = handle_frame(&state, "s1", r#"{"id":"auth-2","type":"auth"}"#).await;
        assert_eq!(reply.message_type, MessageType::Response);
        assert_eq!(reply.data["authenticated"], false);
    }

    #[tokio::test]
    async fn test_unknown_and_reply_types_are_rejected() {
        let state = state_with(None);
        for raw in [
            r#"{"id":"u-1","type":"teleport"}"#,
            r#"{"id":"u-1","type":"pong"}"#,
        ] {
            let reply = handle_frame(&state, "s1", raw).await;
            assert_eq!(reply.message_type, MessageType::Error);
            assert_eq!(reply.id, "u-1");
            assert!(reply.error.starts_with("unknown message type"));
        }
    }

    #[tokio::test]
    async fn test_malformed_frame() {
        let state = state_with(None);
        let reply = handle_frame(&state, "s1", "not json").await;
        assert_eq!(reply.message_type, MessageType::Error);
        assert!(reply.id.is_empty());
        assert!(reply.error.starts_with("invalid message format:"));
    }

    #[tokio::test]
    async fn test_handle_reports_health() {
        let server = GatewayServer::new(GatewayConfig::default());
        let handle = server.handle();
        assert!(!handle.is_healthy());
        assert_eq!(handle.health().await.clients, 0);
    }
}
