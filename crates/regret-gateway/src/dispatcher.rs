use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, broadcast};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};
use uuid::Uuid;

use regret_types::events::SocketEvent;
use regret_types::models::Confession;

/// Capacity of the broadcast channel. Viewers further behind than this skip ahead.
const BROADCAST_CAPACITY: usize = 1024;

/// A pre-serialized `newConfession` event, encoded once for all viewers.
#[derive(Debug, Clone)]
pub struct Broadcast {
    pub id: Uuid,
    pub json: Arc<str>,
}

/// Tracks connected viewers and fans new confessions out to them.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

struct DispatcherInner {
    /// Every connected viewer holds a receiver
    broadcast_tx: broadcast::Sender<Broadcast>,

    /// conn_id -> connected at
    viewers: RwLock<HashMap<Uuid, DateTime<Utc>>>,

    /// Cancelled once on shutdown; connection loops close their sockets
    shutdown: CancellationToken,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            inner: Arc::new(DispatcherInner {
                broadcast_tx,
                viewers: RwLock::new(HashMap::new()),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Register a viewer. Returns (conn_id, receiver). Subscribing happens here so
    /// that anything broadcast after registration reaches the viewer.
    pub async fn register_viewer(&self) -> (Uuid, broadcast::Receiver<Broadcast>) {
        let conn_id = Uuid::new_v4();
        let rx = self.inner.broadcast_tx.subscribe();
        self.inner.viewers.write().await.insert(conn_id, Utc::now());
        (conn_id, rx)
    }

    pub async fn unregister_viewer(&self, conn_id: Uuid) {
        if let Some(since) = self.inner.viewers.write().await.remove(&conn_id) {
            debug!("Viewer {} unregistered after {}s", conn_id, (Utc::now() - since).num_seconds());
        }
    }

    pub async fn viewer_count(&self) -> usize {
        self.inner.viewers.read().await.len()
    }

    /// Broadcast a newly created confession to every connected viewer, the
    /// submitter included. Private confessions are never broadcast.
    /// Returns the number of receivers the event was queued for.
    pub fn broadcast_confession(&self, confession: &Confession) -> usize {
        if !confession.is_public {
            return 0;
        }

        let json = match serde_json::to_string(&SocketEvent::NewConfession(confession.clone())) {
            Ok(json) => json,
            Err(e) => {
                error!("Failed to encode confession {}: {}", confession.id, e);
                return 0;
            }
        };

        // No receivers is not an error: nobody is watching
        self.inner
            .broadcast_tx
            .send(Broadcast {
                id: confession.id,
                json: json.into(),
            })
            .unwrap_or(0)
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.inner.shutdown.clone()
    }

    /// Ask every connection loop to close its socket.
    pub fn shutdown(&self) {
        self.inner.shutdown.cancel();
    }
}
