//! Live client sessions, each with a bounded outbound queue

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, info, warn};

use crate::protocol::Message;

/// Registry entry for one live connection
struct SessionEntry {
    outbound: mpsc::Sender<Message>,
    opened_at: DateTime<Utc>,
}

/// What a connection task gets back from [`SessionRegistry::open`]
pub struct OpenSession {
    pub id: String,
    /// Sender side of this session's queue, for replies
    pub outbound: mpsc::Sender<Message>,
    /// Drained only by this session's writer
    pub queue: mpsc::Receiver<Message>,
}

/// Tracks every live gateway session
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    queue_capacity: usize,
}

impl SessionRegistry {
    pub fn new(queue_capacity: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            queue_capacity: queue_capacity.max(1),
        }
    }

    /// Register a new session under a fresh id
    pub async fn open(&self) -> OpenSession {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::channel(self.queue_capacity);

        let mut sessions = self.sessions.write().await;
        sessions.insert(
            id.clone(),
            SessionEntry {
                outbound: tx.clone(),
                opened_at: Utc::now(),
            },
        );
        info!(session = %id, "Session opened ({} live)", sessions.len());

        OpenSession {
            id,
            outbound: tx,
            queue: rx,
        }
    }

    /// Remove a session. Safe to call more than once; returns whether this
    /// call did the removal.
    pub async fn close(&self, id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        match sessions.remove(id) {
            Some(entry) => {
                let lived = Utc::now() - entry.opened_at;
                info!(
                    session = %id,
                    "Session closed after {}s ({} live)",
                    lived.num_seconds(),
                    sessions.len()
                );
                true
            }
            None => false,
        }
    }

    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Enqueue `msg` on every live session without waiting. Sessions whose
    /// queue is full or already closed are skipped. Returns the number of
    /// sessions the message was enqueued for.
    pub async fn broadcast(&self, msg: &Message) -> usize {
        let sessions = self.sessions.read().await;
        let mut delivered = 0;

        for (id, entry) in sessions.iter() {
            match entry.outbound.try_send(msg.clone()) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    warn!(session = %id, "Outbound queue full, dropping broadcast");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {
                    debug!(session = %id, "Session already closing, skipping broadcast");
                }
            }
        }

        delivered
    }
}
