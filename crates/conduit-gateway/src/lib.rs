//! conduit-gateway - WebSocket session gateway for conduit
//!
//! UI clients connect over `/ws` and exchange JSON frames (see [`protocol`]).
//! Each connection gets a session with a bounded outbound queue; the gateway
//! answers `ping`, `chat`, `auth` and `subscribe` requests and can push
//! `event` frames to every live session.

pub mod auth;
pub mod protocol;
pub mod server;
pub mod session;

pub use auth::{AllowAll, AuthHook};
pub use protocol::{Message, MessageType};
pub use server::{GatewayConfig, GatewayHandle, GatewayServer, Health};
pub use session::SessionRegistry;
