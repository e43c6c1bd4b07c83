//! Notifications from the controller to the rendering layer.
//!
//! Every outcome, including every failure, becomes a [`UiEvent`]; the
//! controller never blocks on rendering and never dies on an error.

use cardesk_core::presence::PresenceAssessment;
use cardesk_core::reservation::ReceiptBlocker;
use cardesk_db::models::receipt::PickupReceipt;
use cardesk_db::models::reservation::Reservation;

/// One notification to the rendering layer.
#[derive(Debug)]
pub enum UiEvent {
    /// The local cache changed; `rows` is the new day's list in creation
    /// order, ready to render.
    CacheUpdated { rows: Vec<Reservation> },

    /// Our claim won; the input was cleared.
    ClaimWon { reservation: Reservation },

    /// Our claim lost. `winner` names the holder when it could be resolved
    /// (owner name, appointment number, serial if already recorded).
    ClaimLost {
        appointment_no: String,
        winner: Option<Reservation>,
    },

    /// A receipt was issued and the reservation completed.
    ReceiptIssued {
        reservation: Reservation,
        receipt: PickupReceipt,
    },

    /// Receipt preconditions failed; one entry per missing item.
    ReceiptBlocked { blockers: Vec<ReceiptBlocker> },

    /// A store call failed; `action` names the operation for the message.
    ActionFailed {
        action: &'static str,
        message: String,
        /// The failure is worth retrying (timeouts, transport errors).
        retryable: bool,
    },

    /// What to show about other officers' activity, recomputed whenever the
    /// roster or the local input changes.
    Presence(PresenceAssessment),

    /// The submit control must be disabled (claim in flight) or re-enabled.
    /// Always re-enabled after a response or failure, never left stuck.
    SubmitEnabled(bool),

    /// Feed connectivity changed; `true` once re-synced.
    FeedOnline(bool),
}
