//! WebSocket message protocol between terminals and the server.
//!
//! Serialized as JSON with an internally-tagged `"type"` discriminator so
//! either side can route messages by type string.

use serde::{Deserialize, Serialize};

use cardesk_core::presence::PresenceSignal;

use crate::feed::ChangeEvent;

/// Messages exchanged over the terminal WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum WireMessage {
    /// Client sends: input is non-empty and stable, carrying the value.
    #[serde(rename = "presence.typing")]
    PresenceTyping { appointment_no: String },

    /// Client sends: input cleared, blurred, or a create just succeeded.
    #[serde(rename = "presence.idle")]
    PresenceIdle,

    /// Server sends: another officer's presence changed.
    #[serde(rename = "presence.signal")]
    PresenceSignal { signal: PresenceSignal },

    /// Server sends: a reservation row was inserted/updated/deleted.
    #[serde(rename = "reservation.change")]
    ReservationChange { event: ChangeEvent },
}

impl WireMessage {
    /// Serialize for a WebSocket text frame.
    pub fn to_json(&self) -> String {
        // WireMessage contains nothing that can fail to serialize.
        serde_json::to_string(self).expect("wire message serializes")
    }

    /// Parse an incoming text frame. Returns `None` for frames that are not
    /// valid wire messages (they are logged and skipped, never fatal).
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}
