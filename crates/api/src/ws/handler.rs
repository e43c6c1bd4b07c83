use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use cardesk_core::presence::PresenceSignal;
use cardesk_events::{PresenceBus, WireMessage};

use crate::middleware::auth::AuthOfficer;
use crate::state::AppState;
use crate::ws::manager::WsManager;

/// HTTP handler that upgrades the connection to WebSocket.
///
/// The upgrade request must carry a valid bearer token; the officer's
/// identity and branch scope are pinned to the connection for its lifetime.
pub async fn ws_handler(
    officer: AuthOfficer,
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| {
        handle_socket(socket, officer, state.ws_manager, state.presence_bus)
    })
}

/// Manage a single terminal connection after upgrade.
///
/// Splits the socket into a sink (outbound) and stream (inbound), then:
///   1. Registers the connection with `WsManager`.
///   2. Spawns a sender task that forwards messages from the manager channel.
///   3. Routes inbound presence frames onto the presence bus.
///   4. Cleans up on disconnect, broadcasting a final `idle` signal so the
///      officer does not linger in other terminals' rosters.
async fn handle_socket(
    socket: WebSocket,
    officer: AuthOfficer,
    ws_manager: Arc<WsManager>,
    presence_bus: Arc<PresenceBus>,
) {
    let conn_id = uuid::Uuid::new_v4().to_string();
    tracing::info!(
        conn_id = %conn_id,
        officer_id = officer.officer_id,
        branch_id = ?officer.branch_id,
        "Terminal connected"
    );

    // Register and get the receiver for outbound messages.
    let cross_branch = officer.cross_branch();
    let mut rx = ws_manager
        .add(
            conn_id.clone(),
            officer.officer_id,
            officer.branch_id,
            cross_branch,
        )
        .await;

    let (mut sink, mut stream) = socket.split();

    // Sender task: forward channel messages to the WebSocket sink.
    let sender_conn_id = conn_id.clone();
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                tracing::debug!(conn_id = %sender_conn_id, "WebSocket sink closed");
                break;
            }
        }
    });

    // Receiver loop: process inbound messages.
    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(conn_id = %conn_id, "Pong received");
            }
            Ok(Message::Text(raw)) => match WireMessage::from_json(&raw) {
                Some(WireMessage::PresenceTyping { appointment_no }) => {
                    presence_bus.publish(PresenceSignal::typing(
                        officer.officer_id,
                        officer.name.clone(),
                        appointment_no,
                        officer.branch_id,
                        chrono::Utc::now(),
                    ));
                }
                Some(WireMessage::PresenceIdle) => {
                    presence_bus.publish(PresenceSignal::idle(
                        officer.officer_id,
                        officer.name.clone(),
                        officer.branch_id,
                        chrono::Utc::now(),
                    ));
                }
                Some(other) => {
                    tracing::debug!(conn_id = %conn_id, message = ?other, "Ignoring server-bound frame");
                }
                None => {
                    tracing::debug!(conn_id = %conn_id, "Ignoring malformed frame");
                }
            },
            Ok(_msg) => {
                // Binary frames have no meaning in this protocol.
            }
            Err(e) => {
                tracing::debug!(conn_id = %conn_id, error = %e, "WebSocket receive error");
                break;
            }
        }
    }

    // Clean up: remove connection, abort sender task, clear presence.
    ws_manager.remove(&conn_id).await;
    send_task.abort();
    presence_bus.publish(PresenceSignal::idle(
        officer.officer_id,
        officer.name.clone(),
        officer.branch_id,
        chrono::Utc::now(),
    ));
    tracing::info!(conn_id = %conn_id, officer_id = officer.officer_id, "Terminal disconnected");
}
