//! Handlers for the reservation ledger: claim, resolve, attach, complete,
//! unlock, and the daily listing.
//!
//! Every successful mutation is published to the change feed after the
//! database commit, so all connected terminals converge on the same view.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use validator::Validate;

use cardesk_core::error::CoreError;
use cardesk_core::reservation::{can_edit, can_unlock, validate_appointment_no};
use cardesk_core::types::DbId;
use cardesk_db::models::receipt::PickupReceipt;
use cardesk_db::models::reservation::{
    CreateReservation, Reservation, UpdateDetails, UpdateImage, UpdateSerials,
};
use cardesk_db::repositories::{CompleteOutcome, CreateOutcome, ReservationRepo};
use cardesk_events::ChangeEvent;

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthOfficer;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Claim (create)
// ---------------------------------------------------------------------------

/// POST /api/v1/reservations
///
/// Attempt to claim an appointment for today. Returns 201 with the new row,
/// or 409 carrying the winning row when another officer got there first.
pub async fn create_reservation(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Json(input): Json<CreateReservation>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    validate_appointment_no(&input.appointment_no)
        .map_err(|msg| AppError::Core(CoreError::Validation(msg)))?;

    let outcome = ReservationRepo::create(
        &state.pool,
        officer.officer_id,
        &officer.name,
        officer.branch_id,
        &input,
    )
    .await?;

    match outcome {
        CreateOutcome::Created(reservation) => {
            state.change_feed.publish(ChangeEvent::Insert {
                reservation: reservation.clone(),
            });
            Ok((
                StatusCode::CREATED,
                Json(DataResponse { data: reservation }),
            ))
        }
        CreateOutcome::Duplicate => {
            // The duplicate outcome carries no owner details; fetch the
            // winning row so the losing terminal can show who holds it.
            let winner = ReservationRepo::get_by_appointment(
                &state.pool,
                &input.appointment_no,
                officer.branch_id,
            )
            .await?;

            if winner.is_none() {
                // The holder was unlocked between our insert and this
                // lookup; the officer's retry will succeed.
                tracing::warn!(
                    appointment_no = %input.appointment_no.trim(),
                    "Duplicate detected but winning row already gone"
                );
            }
            Err(AppError::DuplicateAppointment { winner })
        }
    }
}

// ---------------------------------------------------------------------------
// Resolve / list
// ---------------------------------------------------------------------------

/// GET /api/v1/reservations/by-appointment/{appointment_no}
///
/// Case-insensitive lookup of today's reservation for an appointment,
/// scoped to the caller's branch. Returns `data: null` when free.
pub async fn get_by_appointment(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Path(appointment_no): Path<String>,
) -> AppResult<impl IntoResponse> {
    let row =
        ReservationRepo::get_by_appointment(&state.pool, &appointment_no, officer.branch_id)
            .await?;
    Ok(Json(DataResponse { data: row }))
}

/// GET /api/v1/reservations
///
/// Today's reservations in creation order. Branch-scoped for officers;
/// admins and supervisors see every branch.
pub async fn list_today(
    officer: AuthOfficer,
    State(state): State<AppState>,
) -> AppResult<impl IntoResponse> {
    let rows =
        ReservationRepo::list_today(&state.pool, officer.branch_id, officer.cross_branch())
            .await?;
    Ok(Json(DataResponse { data: rows }))
}

// ---------------------------------------------------------------------------
// Mutations (owner or admin)
// ---------------------------------------------------------------------------

/// Load a reservation and verify the caller may mutate it.
///
/// Rows outside the caller's branch scope are reported as not found rather
/// than forbidden, so officers cannot probe other branches' ledgers.
async fn load_for_edit(
    state: &AppState,
    officer: &AuthOfficer,
    id: DbId,
) -> AppResult<Reservation> {
    let row = ReservationRepo::get(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "reservation",
            id,
        })?;

    if !officer.cross_branch() && row.branch_id != officer.branch_id {
        return Err(AppError::Core(CoreError::NotFound {
            entity: "reservation",
            id,
        }));
    }
    if !can_edit(&officer.role, officer.officer_id, row.officer_id) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only the reserving officer or an admin may modify this reservation".into(),
        )));
    }
    Ok(row)
}

/// Map a status-gated update's `None` to the terminal-state conflict.
fn updated_or_immutable(row: Option<Reservation>, id: DbId) -> AppResult<Reservation> {
    row.ok_or_else(|| {
        AppError::Core(CoreError::Conflict(format!(
            "Reservation {id} is completed and can no longer be modified"
        )))
    })
}

/// PUT /api/v1/reservations/{id}/serials
///
/// Record the good (and optionally spoiled) card serials; the row becomes
/// `printed`. Re-recording on a printed row is a correction.
pub async fn update_serials(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateSerials>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    load_for_edit(&state, &officer, id).await?;

    let row = ReservationRepo::update_serials(&state.pool, id, &input).await?;
    let reservation = updated_or_immutable(row, id)?;

    tracing::info!(
        reservation_id = id,
        officer_id = officer.officer_id,
        "Card serials recorded"
    );
    state.change_feed.publish(ChangeEvent::Update {
        reservation: reservation.clone(),
    });
    Ok(Json(DataResponse { data: reservation }))
}

/// PATCH /api/v1/reservations/{id}/details
///
/// Patch descriptive fields (request no, passport no, name). Absent fields
/// are left unchanged; status is not affected.
pub async fn update_details(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateDetails>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    load_for_edit(&state, &officer, id).await?;

    let row = ReservationRepo::update_details(&state.pool, id, &input).await?;
    let reservation = updated_or_immutable(row, id)?;

    state.change_feed.publish(ChangeEvent::Update {
        reservation: reservation.clone(),
    });
    Ok(Json(DataResponse { data: reservation }))
}

/// PUT /api/v1/reservations/{id}/image
///
/// Attach the uploaded card photo URL.
pub async fn update_image(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
    Json(input): Json<UpdateImage>,
) -> AppResult<impl IntoResponse> {
    input
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    load_for_edit(&state, &officer, id).await?;

    let row = ReservationRepo::update_image(&state.pool, id, &input.card_image_url).await?;
    let reservation = updated_or_immutable(row, id)?;

    state.change_feed.publish(ChangeEvent::Update {
        reservation: reservation.clone(),
    });
    Ok(Json(DataResponse { data: reservation }))
}

// ---------------------------------------------------------------------------
// Completion
// ---------------------------------------------------------------------------

/// Payload returned by a successful completion.
#[derive(Debug, Serialize)]
pub struct CompletionResponse {
    pub reservation: Reservation,
    pub receipt: PickupReceipt,
}

/// POST /api/v1/reservations/{id}/complete
///
/// Issue the pickup receipt and mark the reservation completed. Fails with
/// a per-item precondition list (400) when the row is not ready.
pub async fn complete_reservation(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    load_for_edit(&state, &officer, id).await?;

    let outcome = ReservationRepo::complete(&state.pool, id, officer.officer_id).await?;
    match outcome {
        CompleteOutcome::Completed {
            reservation,
            receipt,
        } => {
            tracing::info!(
                reservation_id = id,
                receipt_id = receipt.id,
                officer_id = officer.officer_id,
                "Receipt issued, reservation completed"
            );
            state.change_feed.publish(ChangeEvent::Update {
                reservation: reservation.clone(),
            });
            Ok(Json(DataResponse {
                data: CompletionResponse {
                    reservation,
                    receipt,
                },
            }))
        }
        CompleteOutcome::Blocked(blockers) => Err(AppError::ReceiptBlocked(blockers)),
        CompleteOutcome::NotFound => Err(AppError::Core(CoreError::NotFound {
            entity: "reservation",
            id,
        })),
    }
}

// ---------------------------------------------------------------------------
// Unlock (admin delete)
// ---------------------------------------------------------------------------

/// DELETE /api/v1/reservations/{id}
///
/// Hard removal of a reservation ("unlock"). Admin only. The appointment
/// key becomes claimable again immediately.
pub async fn delete_reservation(
    officer: AuthOfficer,
    State(state): State<AppState>,
    Path(id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    if !can_unlock(&officer.role) {
        return Err(AppError::Core(CoreError::Forbidden(
            "Only an admin may unlock a reservation".into(),
        )));
    }

    // Fetch first: the delete event must carry the row's identifying key.
    let row = ReservationRepo::get(&state.pool, id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "reservation",
            id,
        })?;

    let deleted = ReservationRepo::delete(&state.pool, id).await?;
    if deleted {
        tracing::info!(
            reservation_id = id,
            appointment_no = %row.appointment_no,
            admin_id = officer.officer_id,
            "Reservation unlocked"
        );
        state.change_feed.publish(ChangeEvent::Delete {
            id: row.id,
            appointment_no: row.appointment_no,
            lock_date: row.lock_date,
            branch_id: row.branch_id,
        });
    }

    Ok(Json(DataResponse {
        data: serde_json::json!({ "deleted": deleted }),
    }))
}
