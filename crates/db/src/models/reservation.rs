//! Reservation row struct and request DTOs.

use cardesk_core::reservation::ReservationStatus;
use cardesk_core::types::{DbId, LockDate, Timestamp};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A row from the `reservations` table.
///
/// `appointment_no` is stored as the officer typed it (minus surrounding
/// whitespace); uniqueness and lookups go through `lower(appointment_no)`.
#[derive(Debug, Clone, PartialEq, FromRow, Serialize, Deserialize)]
pub struct Reservation {
    pub id: DbId,
    pub appointment_no: String,
    pub request_no: Option<String>,
    pub passport_no: Option<String>,
    pub foreigner_name: Option<String>,
    pub officer_id: DbId,
    pub officer_name: String,
    pub status: String,
    pub sn_good: Option<String>,
    pub sn_spoiled: Option<String>,
    pub card_image_url: Option<String>,
    pub lock_date: LockDate,
    pub branch_id: Option<DbId>,
    pub created_at: Timestamp,
}

impl Reservation {
    /// Parsed lifecycle status. The CHECK constraint guarantees the stored
    /// string is one of the three valid values.
    pub fn lifecycle_status(&self) -> ReservationStatus {
        ReservationStatus::parse(&self.status).unwrap_or(ReservationStatus::Locked)
    }
}

// ---------------------------------------------------------------------------
// DTOs
// ---------------------------------------------------------------------------

/// Input for claiming an appointment. Officer identity and branch come from
/// the authenticated session, never from the request body.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateReservation {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub appointment_no: String,
    #[validate(length(max = 64))]
    pub request_no: Option<String>,
    #[validate(length(max = 64))]
    pub passport_no: Option<String>,
    #[validate(length(max = 128))]
    pub foreigner_name: Option<String>,
}

/// Input for recording card serial numbers (transitions to `printed`).
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct UpdateSerials {
    #[validate(length(min = 1, max = 64, message = "must be 1-64 characters"))]
    pub sn_good: String,
    #[validate(length(max = 64))]
    pub sn_spoiled: Option<String>,
}

/// Free-form patch of descriptive fields. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateDetails {
    #[validate(length(max = 64))]
    pub request_no: Option<String>,
    #[validate(length(max = 64))]
    pub passport_no: Option<String>,
    #[validate(length(max = 128))]
    pub foreigner_name: Option<String>,
}

/// Input for attaching an uploaded card photo.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpdateImage {
    #[validate(url(message = "must be a valid URL"))]
    pub card_image_url: String,
}
