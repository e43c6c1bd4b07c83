//! Reservation status rules, appointment-number normalization, roles, and
//! receipt preconditions.
//!
//! This module lives in `core` (zero internal deps) so that the repository
//! layer, the API handlers, and the terminal client all enforce the same
//! lifecycle rules instead of re-deriving them locally.

use serde::{Deserialize, Serialize};

use crate::types::DbId;

// ---------------------------------------------------------------------------
// Status constants
// ---------------------------------------------------------------------------

/// Reservation created, card not yet printed.
pub const STATUS_LOCKED: &str = "locked";
/// Serial numbers recorded, card printed.
pub const STATUS_PRINTED: &str = "printed";
/// Receipt issued; terminal state.
pub const STATUS_COMPLETED: &str = "completed";

/// The set of all valid reservation statuses, in lifecycle order.
pub const VALID_STATUSES: &[&str] = &[STATUS_LOCKED, STATUS_PRINTED, STATUS_COMPLETED];

// ---------------------------------------------------------------------------
// ReservationStatus
// ---------------------------------------------------------------------------

/// Lifecycle status of a reservation.
///
/// Ordering is the lifecycle order: `Locked < Printed < Completed`. Status
/// only ever moves forward, one step at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Locked,
    Printed,
    Completed,
}

impl ReservationStatus {
    /// Parse a stored status string. Returns `None` for unknown values.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            STATUS_LOCKED => Some(Self::Locked),
            STATUS_PRINTED => Some(Self::Printed),
            STATUS_COMPLETED => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Locked => STATUS_LOCKED,
            Self::Printed => STATUS_PRINTED,
            Self::Completed => STATUS_COMPLETED,
        }
    }

    /// Returns `true` if moving from `self` to `next` is a legal transition.
    ///
    /// Only single forward steps are allowed; `Locked -> Completed` must go
    /// through `Printed` (serials have to be recorded before a receipt).
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Locked, Self::Printed) | (Self::Printed, Self::Completed)
        )
    }

    /// Terminal states accept no further mutation except admin delete.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl std::fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Appointment number normalization
// ---------------------------------------------------------------------------

/// Maximum accepted length of an appointment number (after trimming).
pub const MAX_APPOINTMENT_NO_LEN: usize = 64;

/// Normalize an appointment number for comparison and uniqueness.
///
/// Trims surrounding whitespace and case-folds, so `" APT-100 "` and
/// `"apt-100"` identify the same appointment.
pub fn normalize_appointment_no(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Validate an officer-supplied appointment number.
///
/// Returns the normalized form, or a field-attributed message suitable for
/// direct display.
pub fn validate_appointment_no(raw: &str) -> Result<String, String> {
    let normalized = normalize_appointment_no(raw);
    if normalized.is_empty() {
        return Err("appointment_no: must not be empty".to_string());
    }
    if normalized.len() > MAX_APPOINTMENT_NO_LEN {
        return Err(format!(
            "appointment_no: must be at most {MAX_APPOINTMENT_NO_LEN} characters"
        ));
    }
    Ok(normalized)
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

/// Counter officer: creates reservations, edits own rows.
pub const ROLE_OFFICER: &str = "officer";
/// Administrator: may edit any row, delete ("unlock"), and see all branches.
pub const ROLE_ADMIN: &str = "admin";
/// Supervisor: read access across branches, no unlock privilege.
pub const ROLE_SUPERVISOR: &str = "supervisor";

/// The set of all valid roles.
pub const VALID_ROLES: &[&str] = &[ROLE_OFFICER, ROLE_ADMIN, ROLE_SUPERVISOR];

/// Roles that see reservations from every branch.
pub fn is_cross_branch(role: &str) -> bool {
    role == ROLE_ADMIN || role == ROLE_SUPERVISOR
}

/// Only admins may hard-delete (unlock) a reservation.
pub fn can_unlock(role: &str) -> bool {
    role == ROLE_ADMIN
}

/// Owner or admin may mutate a reservation's fields.
pub fn can_edit(role: &str, officer_id: DbId, owner_id: DbId) -> bool {
    role == ROLE_ADMIN || officer_id == owner_id
}

// ---------------------------------------------------------------------------
// Receipt preconditions
// ---------------------------------------------------------------------------

/// A reason a receipt cannot yet be generated from a reservation.
///
/// Reported per-missing-item so the officer knows exactly what to supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReceiptBlocker {
    MissingGoodSerial,
    MissingCardImage,
    MissingForeignerName,
    ReceiptAlreadyIssued,
    NotPrinted,
}

impl ReceiptBlocker {
    pub fn message(&self) -> &'static str {
        match self {
            Self::MissingGoodSerial => "sn_good: good-card serial number is required",
            Self::MissingCardImage => "card_image_url: card photo is required",
            Self::MissingForeignerName => "foreigner_name: name is required",
            Self::ReceiptAlreadyIssued => "a receipt was already issued for this appointment",
            Self::NotPrinted => "card has not been printed yet",
        }
    }
}

impl std::fmt::Display for ReceiptBlocker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Check every receipt precondition and return all blockers at once.
///
/// An empty vector means the reservation may be completed.
pub fn receipt_blockers(
    status: ReservationStatus,
    sn_good: Option<&str>,
    card_image_url: Option<&str>,
    foreigner_name: Option<&str>,
    receipt_exists: bool,
) -> Vec<ReceiptBlocker> {
    let mut blockers = Vec::new();

    if status != ReservationStatus::Printed {
        blockers.push(ReceiptBlocker::NotPrinted);
    }
    if sn_good.is_none_or(|s| s.trim().is_empty()) {
        blockers.push(ReceiptBlocker::MissingGoodSerial);
    }
    if card_image_url.is_none_or(|s| s.trim().is_empty()) {
        blockers.push(ReceiptBlocker::MissingCardImage);
    }
    if foreigner_name.is_none_or(|s| s.trim().is_empty()) {
        blockers.push(ReceiptBlocker::MissingForeignerName);
    }
    if receipt_exists {
        blockers.push(ReceiptBlocker::ReceiptAlreadyIssued);
    }

    blockers
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
