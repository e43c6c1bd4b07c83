use std::sync::Arc;

use cardesk_events::{ChangeFeed, PresenceBus};

use crate::config::ServerConfig;
use crate::ws::WsManager;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// This is cheaply cloneable (inner data is behind `Arc` or is already `Clone`).
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: cardesk_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// WebSocket connection manager (counter terminals).
    pub ws_manager: Arc<WsManager>,
    /// Row-change feed for the reservation table.
    pub change_feed: Arc<ChangeFeed>,
    /// Ephemeral typing-presence bus.
    pub presence_bus: Arc<PresenceBus>,
}
