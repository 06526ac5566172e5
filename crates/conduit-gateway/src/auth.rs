//! Hook for the `auth` handshake

use async_trait::async_trait;
use serde_json::{Map, Value};

/// Decides whether an `auth` frame authenticates its session.
/// Receives the frame's `data` payload unchanged.
#[async_trait]
pub trait AuthHook: Send + Sync {
    async fn authenticate(&self, session_id: &str, data: &Map<String, Value>) -> bool;
}

/// Accepts every `auth` frame
#[derive(Debug, Default, Clone, Copy)]
pub struct AllowAll;

#[async_trait]
impl AuthHook for AllowAll {
    async fn authenticate(&self, _session_id: &str, _data: &Map<String, Value>) -> bool {
        true
    }
}
