//! Bridges between the in-process buses and the WebSocket fan-out.
//!
//! One pump per bus, mirroring the two channels' different guarantees: the
//! change pump must preserve per-row ordering (a single consumer draining a
//! single broadcast channel does), while the presence pump may drop freely.

use std::sync::Arc;

use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use cardesk_core::presence::PresenceSignal;
use cardesk_events::feed::ChangeEvent;

use crate::ws::manager::WsManager;

/// Spawn the task that forwards reservation changes to connected terminals.
pub fn start_change_pump(
    ws_manager: Arc<WsManager>,
    mut receiver: broadcast::Receiver<ChangeEvent>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Change pump cancelled");
                    break;
                }
                result = receiver.recv() => match result {
                    Ok(event) => {
                        ws_manager.broadcast_change(&event).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Terminals that miss events re-sync from list_today
                        // on reconnect; log loudly anyway.
                        tracing::warn!(skipped = n, "Change pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Change feed closed, pump shutting down");
                        break;
                    }
                },
            }
        }
    })
}

/// Spawn the task that relays presence signals to connected terminals.
pub fn start_presence_pump(
    ws_manager: Arc<WsManager>,
    mut receiver: broadcast::Receiver<PresenceSignal>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Presence pump cancelled");
                    break;
                }
                result = receiver.recv() => match result {
                    Ok(signal) => {
                        ws_manager.broadcast_presence(&signal).await;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        // Presence is disposable; stale entries expire on
                        // the receiver side regardless.
                        tracing::debug!(skipped = n, "Presence pump lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("Presence bus closed, pump shutting down");
                        break;
                    }
                },
            }
        }
    })
}
