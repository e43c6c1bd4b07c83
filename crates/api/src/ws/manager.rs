use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use tokio::sync::{mpsc, RwLock};

use cardesk_core::presence::PresenceSignal;
use cardesk_core::types::{DbId, Timestamp};
use cardesk_events::{ChangeEvent, WireMessage};

/// Channel sender half for pushing messages to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single connected counter terminal.
pub struct WsConnection {
    /// Authenticated officer behind this terminal.
    pub officer_id: DbId,
    /// Branch the officer is scoped to; `None` is the headquarters pool.
    pub branch_id: Option<DbId>,
    /// Cross-branch roles receive every branch's events.
    pub cross_branch: bool,
    /// Channel sender for outbound messages to this connection.
    pub sender: WsSender,
    /// When this connection was established.
    pub connected_at: Timestamp,
}

impl WsConnection {
    /// Whether an event/signal for `branch_id` should reach this terminal.
    fn in_scope(&self, branch_id: Option<DbId>) -> bool {
        self.cross_branch || self.branch_id == branch_id
    }
}

/// Manages all active terminal WebSocket connections.
///
/// Thread-safe via interior `RwLock`; designed to be wrapped in `Arc` and
/// shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<String, WsConnection>>,
}

impl WsManager {
    /// Create a new, empty connection manager.
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a new connection.
    ///
    /// Returns the receiver half of the message channel so the caller can
    /// forward messages to the WebSocket sink.
    pub async fn add(
        &self,
        conn_id: String,
        officer_id: DbId,
        branch_id: Option<DbId>,
        cross_branch: bool,
    ) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            officer_id,
            branch_id,
            cross_branch,
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    /// Remove a connection by its ID.
    pub async fn remove(&self, conn_id: &str) {
        self.connections.write().await.remove(conn_id);
    }

    /// Push a reservation change to every terminal whose branch scope
    /// covers the affected row. The writer's own terminal receives its echo
    /// too; the client-side merge is idempotent by design.
    ///
    /// Connections whose send channels are closed are silently skipped
    /// (they will be cleaned up on their next receive loop iteration).
    pub async fn broadcast_change(&self, event: &ChangeEvent) {
        let frame = Message::Text(
            WireMessage::ReservationChange {
                event: event.clone(),
            }
            .to_json()
            .into(),
        );
        let conns = self.connections.read().await;
        for conn in conns.values() {
            if conn.in_scope(event.branch_id()) {
                let _ = conn.sender.send(frame.clone());
            }
        }
    }

    /// Relay a presence signal to every terminal in scope.
    pub async fn broadcast_presence(&self, signal: &PresenceSignal) {
        let frame = Message::Text(
            WireMessage::PresenceSignal {
                signal: signal.clone(),
            }
            .to_json()
            .into(),
        );
        let conns = self.connections.read().await;
        for conn in conns.values() {
            if conn.in_scope(signal.branch_id) {
                let _ = conn.sender.send(frame.clone());
            }
        }
    }

    /// Return the current number of active connections.
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Send a Close frame to every connection, then clear the map.
    ///
    /// Used during graceful shutdown to notify all terminals before the
    /// server stops accepting new connections.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all WebSocket connections");
    }

    /// Send a Ping frame to every connected terminal.
    ///
    /// Used by the heartbeat task to keep connections alive and detect
    /// stale ones.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
