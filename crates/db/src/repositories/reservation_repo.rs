//! Repository for the `reservations` table.
//!
//! Uniqueness is enforced exclusively by the partial unique index on
//! `(lower(appointment_no), lock_date, COALESCE(branch_id, 0))`. The insert
//! never pre-reads; a duplicate key comes back as [`CreateOutcome::Duplicate`]
//! and the caller fetches the winning row to show its owner.

use sqlx::PgPool;

use cardesk_core::reservation::{receipt_blockers, ReceiptBlocker, STATUS_COMPLETED, STATUS_PRINTED};
use cardesk_core::types::DbId;

use crate::models::receipt::PickupReceipt;
use crate::models::reservation::{
    CreateReservation, Reservation, UpdateDetails, UpdateSerials,
};

/// Column list for `reservations` queries.
const RESERVATION_COLUMNS: &str = "id, appointment_no, request_no, passport_no, \
                                   foreigner_name, officer_id, officer_name, status, \
                                   sn_good, sn_spoiled, card_image_url, lock_date, \
                                   branch_id, created_at";

// ---------------------------------------------------------------------------
// Outcomes
// ---------------------------------------------------------------------------

/// Result of a create attempt. A duplicate key is not an error: it is the
/// store doing its job.
#[derive(Debug)]
pub enum CreateOutcome {
    Created(Reservation),
    /// Another officer already holds this appointment today.
    Duplicate,
}

/// Result of a completion attempt.
#[derive(Debug)]
pub enum CompleteOutcome {
    Completed {
        reservation: Reservation,
        receipt: PickupReceipt,
    },
    /// One or more receipt preconditions failed; nothing was changed.
    Blocked(Vec<ReceiptBlocker>),
    NotFound,
}

// ---------------------------------------------------------------------------
// ReservationRepo
// ---------------------------------------------------------------------------

/// CRUD operations for reservations.
pub struct ReservationRepo;

impl ReservationRepo {
    /// Attempt to claim an appointment for today.
    ///
    /// Uses `INSERT ... ON CONFLICT DO NOTHING` against the partial unique
    /// index, so the claim is a single atomic statement. A no-op insert
    /// means another row already owns the key.
    pub async fn create(
        pool: &PgPool,
        officer_id: DbId,
        officer_name: &str,
        branch_id: Option<DbId>,
        input: &CreateReservation,
    ) -> Result<CreateOutcome, sqlx::Error> {
        let query = format!(
            "INSERT INTO reservations \
                 (appointment_no, request_no, passport_no, foreigner_name, \
                  officer_id, officer_name, branch_id) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (lower(appointment_no), lock_date, COALESCE(branch_id, 0)) \
             DO NOTHING \
             RETURNING {RESERVATION_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Reservation>(&query)
            .bind(input.appointment_no.trim())
            .bind(input.request_no.as_deref())
            .bind(input.passport_no.as_deref())
            .bind(input.foreigner_name.as_deref())
            .bind(officer_id)
            .bind(officer_name)
            .bind(branch_id)
            .fetch_optional(pool)
            .await?;

        Ok(match row {
            Some(reservation) => {
                tracing::info!(
                    reservation_id = reservation.id,
                    appointment_no = %reservation.appointment_no,
                    officer_id,
                    "Appointment claimed"
                );
                CreateOutcome::Created(reservation)
            }
            None => {
                tracing::debug!(
                    appointment_no = %input.appointment_no.trim(),
                    officer_id,
                    "Claim lost to an existing reservation"
                );
                CreateOutcome::Duplicate
            }
        })
    }

    /// Fetch a reservation by id.
    pub async fn get(pool: &PgPool, id: DbId) -> Result<Option<Reservation>, sqlx::Error> {
        let query = format!("SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1");
        sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Case-insensitive lookup of today's reservation for an appointment,
    /// scoped to the caller's branch. Used to resolve a duplicate into the
    /// winning officer's identity.
    pub async fn get_by_appointment(
        pool: &PgPool,
        appointment_no: &str,
        branch_id: Option<DbId>,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        let query = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations \
             WHERE lower(appointment_no) = lower($1) \
               AND lock_date = CURRENT_DATE \
               AND COALESCE(branch_id, 0) = COALESCE($2, 0)"
        );
        sqlx::query_as::<_, Reservation>(&query)
            .bind(appointment_no.trim())
            .bind(branch_id)
            .fetch_optional(pool)
            .await
    }

    /// Record card serials. Transitions the row to `printed`; re-recording
    /// on an already-printed row is a serial correction. Completed rows are
    /// immutable, so the update is status-gated and returns `None` for them.
    pub async fn update_serials(
        pool: &PgPool,
        id: DbId,
        input: &UpdateSerials,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        let query = format!(
            "UPDATE reservations \
             SET sn_good = $2, sn_spoiled = $3, status = '{STATUS_PRINTED}' \
             WHERE id = $1 AND status <> '{STATUS_COMPLETED}' \
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(input.sn_good.trim())
            .bind(input.sn_spoiled.as_deref())
            .fetch_optional(pool)
            .await
    }

    /// Patch descriptive fields. Absent fields keep their current value.
    /// Does not affect status.
    pub async fn update_details(
        pool: &PgPool,
        id: DbId,
        input: &UpdateDetails,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        let query = format!(
            "UPDATE reservations \
             SET request_no = COALESCE($2, request_no), \
                 passport_no = COALESCE($3, passport_no), \
                 foreigner_name = COALESCE($4, foreigner_name) \
             WHERE id = $1 AND status <> '{STATUS_COMPLETED}' \
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(input.request_no.as_deref())
            .bind(input.passport_no.as_deref())
            .bind(input.foreigner_name.as_deref())
            .fetch_optional(pool)
            .await
    }

    /// Attach the uploaded card photo URL.
    pub async fn update_image(
        pool: &PgPool,
        id: DbId,
        card_image_url: &str,
    ) -> Result<Option<Reservation>, sqlx::Error> {
        let query = format!(
            "UPDATE reservations SET card_image_url = $2 \
             WHERE id = $1 AND status <> '{STATUS_COMPLETED}' \
             RETURNING {RESERVATION_COLUMNS}"
        );
        sqlx::query_as::<_, Reservation>(&query)
            .bind(id)
            .bind(card_image_url)
            .fetch_optional(pool)
            .await
    }

    /// Complete a reservation: issue its pickup receipt and flip the status,
    /// in one transaction so a concurrent complete for the same appointment
    /// cannot slip between the precondition check and the receipt insert.
    pub async fn complete(
        pool: &PgPool,
        id: DbId,
        issued_by: DbId,
    ) -> Result<CompleteOutcome, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let select = format!(
            "SELECT {RESERVATION_COLUMNS} FROM reservations WHERE id = $1 FOR UPDATE"
        );
        let row = sqlx::query_as::<_, Reservation>(&select)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            return Ok(CompleteOutcome::NotFound);
        };

        let (receipt_exists,): (bool,) = sqlx::query_as(
            "SELECT EXISTS(SELECT 1 FROM pickup_receipts WHERE lower(appointment_no) = lower($1))",
        )
        .bind(&row.appointment_no)
        .fetch_one(&mut *tx)
        .await?;

        let blockers = receipt_blockers(
            row.lifecycle_status(),
            row.sn_good.as_deref(),
            row.card_image_url.as_deref(),
            row.foreigner_name.as_deref(),
            receipt_exists,
        );
        if !blockers.is_empty() {
            return Ok(CompleteOutcome::Blocked(blockers));
        }

        let receipt = sqlx::query_as::<_, PickupReceipt>(
            "INSERT INTO pickup_receipts (appointment_no, reservation_id, issued_by) \
             VALUES ($1, $2, $3) \
             RETURNING id, appointment_no, reservation_id, issued_by, issued_at",
        )
        .bind(&row.appointment_no)
        .bind(row.id)
        .bind(issued_by)
        .fetch_one(&mut *tx)
        .await?;

        let update = format!(
            "UPDATE reservations SET status = '{STATUS_COMPLETED}' \
             WHERE id = $1 RETURNING {RESERVATION_COLUMNS}"
        );
        let reservation = sqlx::query_as::<_, Reservation>(&update)
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CompleteOutcome::Completed {
            reservation,
            receipt,
        })
    }

    /// Hard removal ("unlock"). Admin-privileged at the API layer.
    /// Returns `true` if a row was deleted.
    pub async fn delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM reservations WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Today's reservations, creation order. Branch-scoped officers see
    /// their own branch (plus the shared NULL pool is its own scope);
    /// cross-branch roles see everything.
    pub async fn list_today(
        pool: &PgPool,
        branch_id: Option<DbId>,
        cross_branch: bool,
    ) -> Result<Vec<Reservation>, sqlx::Error> {
        if cross_branch {
            let query = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE lock_date = CURRENT_DATE \
                 ORDER BY created_at ASC, id ASC"
            );
            sqlx::query_as::<_, Reservation>(&query).fetch_all(pool).await
        } else {
            let query = format!(
                "SELECT {RESERVATION_COLUMNS} FROM reservations \
                 WHERE lock_date = CURRENT_DATE \
                   AND COALESCE(branch_id, 0) = COALESCE($1, 0) \
                 ORDER BY created_at ASC, id ASC"
            );
            sqlx::query_as::<_, Reservation>(&query)
                .bind(branch_id)
                .fetch_all(pool)
                .await
        }
    }
}
