//! Outbound side of the signaling channel: one queue per live connection

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::protocol::ServerEvent;
use crate::types::ConnectionId;

/// Targeted push to a single connection.
///
/// Returns `false` when the connection is gone. Callers log and move on;
/// nothing is retried or queued.
pub trait Notifier: Send + Sync {
    fn push(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool;
}

/// Live connections and their outbound queues
pub struct SignalingHub {
    connections: DashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl SignalingHub {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    /// Open an outbound queue for a new connection
    pub fn attach(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerEvent>) {
        let connection_id = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        self.connections.insert(connection_id, tx);
        debug!("🔗 Connection {} attached ({} live)", connection_id, self.connections.len());
        (connection_id, rx)
    }

    pub fn detach(&self, connection_id: &ConnectionId) {
        if self.connections.remove(connection_id).is_some() {
            debug!("🔌 Connection {} detached ({} live)", connection_id, self.connections.len());
        }
    }

    pub fn is_attached(&self, connection_id: &ConnectionId) -> bool {
        self.connections.contains_key(connection_id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }
}

impl Default for SignalingHub {
    fn default() -> Self {
        Self::new()
    }
}

impl Notifier for SignalingHub {
    fn push(&self, connection_id: &ConnectionId, event: ServerEvent) -> bool {
        let Some(tx) = self.connections.get(connection_id) else {
            warn!("📭 Dropping {} for closed connection {}", event.name(), connection_id);
            return false;
        };

        let name = event.name();
        if tx.send(event).is_err() {
            warn!("📭 Send of {} to connection {} failed", name, connection_id);
            return false;
        }
        debug!("📨 Queued {} for connection {}", name, connection_id);
        true
    }
}
