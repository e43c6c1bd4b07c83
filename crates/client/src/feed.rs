//! WebSocket connection to the server: change feed in, presence out.
//!
//! Owns the socket and nothing else. Inbound frames become
//! [`RemoteEvent`]s on the controller mailbox; outbound presence frames
//! arrive on a channel from the controller. Reconnects with a fixed delay
//! until cancelled; after every (re-)connect the controller re-syncs its
//! cache, which covers any events missed while offline.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use cardesk_events::WireMessage;

use crate::commands::{Command, RemoteEvent};
use crate::controller::ControllerHandle;

/// Delay between reconnect attempts.
const RECONNECT_DELAY_SECS: u64 = 2;

/// Run the feed connection until `cancel` fires.
///
/// `outbound` carries presence frames from the controller to the server.
pub async fn run_feed(
    ws_url: String,
    token: String,
    handle: ControllerHandle,
    mut outbound: mpsc::UnboundedReceiver<WireMessage>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match connect(&ws_url, &token).await {
            Ok(socket) => {
                tracing::info!(url = %ws_url, "Feed connected");
                handle.send(Command::Remote(RemoteEvent::Connected));
                drive(socket, &handle, &mut outbound, &cancel).await;
                if cancel.is_cancelled() {
                    return;
                }
                tracing::warn!("Feed disconnected, reconnecting");
                handle.send(Command::Remote(RemoteEvent::Disconnected));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Feed connection failed, retrying");
                handle.send(Command::Remote(RemoteEvent::Disconnected));
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)) => {}
        }
    }
}

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// Open the socket with the officer's bearer token on the upgrade request.
async fn connect(
    ws_url: &str,
    token: &str,
) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
    let mut request = ws_url.into_client_request()?;
    request.headers_mut().insert(
        "Authorization",
        format!("Bearer {token}")
            .parse()
            .expect("bearer header is valid ASCII"),
    );
    let (socket, _response) = connect_async(request).await?;
    Ok(socket)
}

/// Pump one live connection until it drops or the client shuts down.
async fn drive(
    socket: WsStream,
    handle: &ControllerHandle,
    outbound: &mut mpsc::UnboundedReceiver<WireMessage>,
    cancel: &CancellationToken,
) {
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            frame = outbound.recv() => match frame {
                Some(frame) => {
                    if sink.send(Message::Text(frame.to_json())).await.is_err() {
                        return;
                    }
                }
                // Controller gone; nothing left to send.
                None => return,
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(raw))) => dispatch(handle, &raw),
                Some(Ok(Message::Close(_))) | None => return,
                Some(Ok(_)) => {
                    // Ping/Pong are handled by the protocol layer.
                }
                Some(Err(e)) => {
                    tracing::debug!(error = %e, "Feed receive error");
                    return;
                }
            },
        }
    }
}

/// Route one inbound frame onto the controller mailbox.
fn dispatch(handle: &ControllerHandle, raw: &str) {
    match WireMessage::from_json(raw) {
        Some(WireMessage::ReservationChange { event }) => {
            handle.send(Command::Remote(RemoteEvent::Change(event)));
        }
        Some(WireMessage::PresenceSignal { signal }) => {
            handle.send(Command::Remote(RemoteEvent::Presence(signal)));
        }
        Some(other) => {
            tracing::debug!(message = ?other, "Ignoring client-bound frame from server");
        }
        None => {
            tracing::debug!("Ignoring malformed feed frame");
        }
    }
}
