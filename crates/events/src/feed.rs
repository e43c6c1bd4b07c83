//! Change feed backed by a `tokio::sync::broadcast` channel.
//!
//! [`ChangeFeed`] is the publish/subscribe hub for reservation row changes.
//! It is designed to be shared via `Arc<ChangeFeed>` across the application.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use cardesk_core::types::{DbId, LockDate};
use cardesk_db::models::reservation::Reservation;

// ---------------------------------------------------------------------------
// ChangeEvent
// ---------------------------------------------------------------------------

/// A row-level mutation of the reservation table.
///
/// Insert and update carry the full post-change row; delete carries the
/// identifying key of the removed row so subscribers can evict it from
/// their local caches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ChangeEvent {
    Insert { reservation: Reservation },
    Update { reservation: Reservation },
    Delete {
        id: DbId,
        appointment_no: String,
        lock_date: LockDate,
        branch_id: Option<DbId>,
    },
}

impl ChangeEvent {
    /// Id of the affected row.
    pub fn record_id(&self) -> DbId {
        match self {
            Self::Insert { reservation } | Self::Update { reservation } => reservation.id,
            Self::Delete { id, .. } => *id,
        }
    }

    /// Date partition the affected row belongs to.
    pub fn lock_date(&self) -> LockDate {
        match self {
            Self::Insert { reservation } | Self::Update { reservation } => reservation.lock_date,
            Self::Delete { lock_date, .. } => *lock_date,
        }
    }

    /// Branch partition of the affected row.
    pub fn branch_id(&self) -> Option<DbId> {
        match self {
            Self::Insert { reservation } | Self::Update { reservation } => reservation.branch_id,
            Self::Delete { branch_id, .. } => *branch_id,
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeFeed
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out of reservation changes.
///
/// A single broadcast channel carries every event in publish order, which
/// gives subscribers the one ordering guarantee they rely on: successive
/// events for the *same* row are never reordered. Ordering across different
/// rows is incidental and not part of the contract.
pub struct ChangeFeed {
    sender: broadcast::Sender<ChangeEvent>,
}

impl ChangeFeed {
    /// Create a feed with a specific channel capacity.
    ///
    /// When the buffer is full, the oldest un-consumed events are dropped
    /// and slow receivers will observe a `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// If there are no active subscribers the event is silently dropped;
    /// the database row is the durable record, not the feed.
    pub fn publish(&self, event: ChangeEvent) {
        // Ignore the SendError — it only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    /// Subscribe to all events published on this feed.
    pub fn subscribe(&self) -> broadcast::Receiver<ChangeEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
