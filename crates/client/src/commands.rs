//! The controller's single inbound channel.
//!
//! Everything that can influence the lifecycle controller arrives here as a
//! [`Command`]: officer actions from the rendering layer, remote events from
//! the feed connection, and the controller's own timer ticks. Draining one
//! mailbox keeps the reconciliation logic testable without a UI harness.

use cardesk_core::presence::PresenceSignal;
use cardesk_core::types::DbId;
use cardesk_db::models::reservation::{CreateReservation, UpdateDetails, UpdateSerials};
use cardesk_events::ChangeEvent;

use crate::store::{CreateResult, StoreError};

/// An event delivered by the server connection.
#[derive(Debug, Clone)]
pub enum RemoteEvent {
    /// A reservation row changed.
    Change(ChangeEvent),
    /// Another officer's presence signal was relayed.
    Presence(PresenceSignal),
    /// The feed connection was (re-)established; the cache must re-sync.
    Connected,
    /// The feed connection dropped; a reconnect is underway.
    Disconnected,
}

/// One message on the controller mailbox.
#[derive(Debug)]
pub enum Command {
    // -- Officer actions --------------------------------------------------
    /// The appointment input field changed.
    InputChanged { value: String },
    /// The appointment input was cleared or blurred.
    InputCleared,
    /// Submit the claim for the current input.
    SubmitCreate { input: CreateReservation },
    /// Record card serials for a row.
    AttachSerials { id: DbId, input: UpdateSerials },
    /// Patch descriptive fields of a row.
    EditDetails { id: DbId, input: UpdateDetails },
    /// Attach the card photo URL to a row.
    AttachImage { id: DbId, url: String },
    /// Issue the pickup receipt for a row.
    GenerateReceipt { id: DbId },
    /// Admin unlock (hard delete) of a row.
    Unlock { id: DbId },
    /// Reload today's listing from the store.
    Refresh,

    // -- Remote events -----------------------------------------------------
    Remote(RemoteEvent),

    // -- Internal ----------------------------------------------------------
    /// A spawned create request finished. `seq` identifies the submission;
    /// stale responses (officer moved on) are discarded.
    CreateFinished {
        seq: u64,
        result: Result<CreateResult, StoreError>,
    },
    /// Debounce tick: broadcast a typing/idle signal if the input has been
    /// stable long enough.
    FlushTyping,
    /// Periodic tick: purge stale presence entries.
    SweepPresence,
    /// Stop the controller loop and its timers.
    Shutdown,
}
