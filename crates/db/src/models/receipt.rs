//! Pickup receipt row struct.

use cardesk_core::types::{DbId, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// A row from the `pickup_receipts` table.
///
/// `reservation_id` goes `NULL` when an admin unlocks (deletes) the
/// originating reservation; the receipt itself is never removed.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PickupReceipt {
    pub id: DbId,
    pub appointment_no: String,
    pub reservation_id: Option<DbId>,
    pub issued_by: DbId,
    pub issued_at: Timestamp,
}
