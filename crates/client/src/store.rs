//! The store seam: what the controller needs from the reservation store.
//!
//! The production implementation ([`http::ApiStore`](crate::http::ApiStore))
//! speaks to the server; [`memory::InMemoryStore`](crate::memory::InMemoryStore)
//! backs the test suite with the same uniqueness semantics.

use async_trait::async_trait;
use serde::Deserialize;

use cardesk_core::reservation::ReceiptBlocker;
use cardesk_core::types::DbId;
use cardesk_db::models::receipt::PickupReceipt;
use cardesk_db::models::reservation::{
    CreateReservation, Reservation, UpdateDetails, UpdateSerials,
};

// ---------------------------------------------------------------------------
// Errors and outcomes
// ---------------------------------------------------------------------------

/// Failures a store call can surface. Each maps to a distinct, recoverable
/// notification; none of them crash the controller.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Rejected before or by the server with a field-attributed message.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The session token is missing, invalid, or expired.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The caller is not the owner (or an admin) of the row.
    #[error("permission denied: {0}")]
    Forbidden(String),

    /// The row no longer exists (or is outside the caller's branch scope).
    #[error("not found")]
    NotFound,

    /// The row is in a state that rejects the mutation (completed rows are
    /// immutable).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Receipt preconditions failed; one entry per missing item.
    #[error("receipt preconditions not met")]
    ReceiptBlocked(Vec<ReceiptBlocker>),

    /// The request exceeded its bounded timeout.
    #[error("request timed out")]
    Timeout,

    /// Transport-level failure (connection refused, TLS, malformed body).
    #[error("transport error: {0}")]
    Transport(String),
}

/// Result of a create attempt. The conflict branch is normal control flow,
/// carrying the winning row when the store could resolve it.
#[derive(Debug)]
pub enum CreateResult {
    Created(Reservation),
    Conflict { winner: Option<Reservation> },
}

/// Payload of a successful completion.
#[derive(Debug, Deserialize)]
pub struct Completion {
    pub reservation: Reservation,
    pub receipt: PickupReceipt,
}

// ---------------------------------------------------------------------------
// ReservationStore
// ---------------------------------------------------------------------------

/// Everything the lifecycle controller asks of the reservation store.
///
/// All calls are single round trips with bounded timeouts. `create` is the
/// only operation addressed by business key; every other mutation targets a
/// row by its opaque id and therefore cannot race a concurrent create.
#[async_trait]
pub trait ReservationStore: Send + Sync + 'static {
    /// Attempt to claim an appointment. The store's atomic uniqueness
    /// constraint decides the winner; on conflict the implementation
    /// resolves the winning row where it can.
    async fn create(&self, input: &CreateReservation) -> Result<CreateResult, StoreError>;

    /// Case-insensitive lookup in today's partition.
    async fn get_by_appointment(
        &self,
        appointment_no: &str,
    ) -> Result<Option<Reservation>, StoreError>;

    /// Record serials; the row becomes `printed`.
    async fn update_serials(
        &self,
        id: DbId,
        input: &UpdateSerials,
    ) -> Result<Reservation, StoreError>;

    /// Patch descriptive fields.
    async fn update_details(
        &self,
        id: DbId,
        input: &UpdateDetails,
    ) -> Result<Reservation, StoreError>;

    /// Attach the card photo URL.
    async fn update_image(&self, id: DbId, url: &str) -> Result<Reservation, StoreError>;

    /// Issue the receipt and mark the row completed.
    async fn complete(&self, id: DbId) -> Result<Completion, StoreError>;

    /// Admin unlock (hard delete).
    async fn delete(&self, id: DbId) -> Result<(), StoreError>;

    /// Today's rows in creation order, branch-scoped server-side.
    async fn list_today(&self) -> Result<Vec<Reservation>, StoreError>;
}
