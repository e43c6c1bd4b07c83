use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use cardesk_core::error::CoreError;
use cardesk_core::reservation::ReceiptBlocker;
use cardesk_db::models::reservation::Reservation;

/// Application-level error type for HTTP handlers.
///
/// Wraps [`CoreError`] for domain errors and adds HTTP-specific variants.
/// Implements [`IntoResponse`] to produce consistent JSON error responses.
///
/// A duplicate appointment gets its own variant rather than riding on
/// `CoreError::Conflict`: the 409 body must carry the winning row so the
/// losing terminal can show who holds the appointment without a second
/// round trip.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// A domain-level error from `cardesk_core`.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Another officer already holds this appointment today.
    ///
    /// `winner` is `None` only in the rare race where the holder vanished
    /// (admin unlock) between the failed insert and the lookup.
    #[error("Appointment is already reserved")]
    DuplicateAppointment { winner: Option<Reservation> },

    /// Receipt preconditions failed; each blocker names the missing item.
    #[error("Receipt preconditions not met")]
    ReceiptBlocked(Vec<ReceiptBlocker>),

    /// A bad request with a human-readable message.
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// An internal error with a human-readable message.
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Convenience type alias for handler return values.
pub type AppResult<T> = Result<T, AppError>;

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            // --- CoreError variants ---
            AppError::Core(core) => match core {
                CoreError::NotFound { entity, id } => (
                    StatusCode::NOT_FOUND,
                    "NOT_FOUND",
                    format!("{entity} with id {id} not found"),
                ),
                CoreError::Validation(msg) => {
                    (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
                }
                CoreError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
                CoreError::Unauthorized(msg) => {
                    (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone())
                }
                CoreError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
                CoreError::Internal(msg) => {
                    tracing::error!(error = %msg, "Internal core error");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "INTERNAL_ERROR",
                        "An internal error occurred".to_string(),
                    )
                }
            },

            // --- Database errors ---
            AppError::Database(err) => classify_sqlx_error(err),

            // --- Duplicate appointment: 409 with the winning row ---
            AppError::DuplicateAppointment { winner } => {
                let message = match winner {
                    Some(w) => format!(
                        "Appointment {} is already reserved by {}",
                        w.appointment_no, w.officer_name
                    ),
                    None => "Appointment is already reserved".to_string(),
                };
                let body = json!({
                    "error": message,
                    "code": "DUPLICATE_APPOINTMENT",
                    "winner": winner,
                });
                return (StatusCode::CONFLICT, axum::Json(body)).into_response();
            }

            // --- Receipt preconditions: 400 with per-item messages ---
            AppError::ReceiptBlocked(blockers) => {
                let missing: Vec<&str> = blockers.iter().map(|b| b.message()).collect();
                let body = json!({
                    "error": "Receipt cannot be generated yet",
                    "code": "RECEIPT_PRECONDITION",
                    "missing": missing,
                    "blockers": blockers,
                });
                return (StatusCode::BAD_REQUEST, axum::Json(body)).into_response();
            }

            // --- HTTP-specific errors ---
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            AppError::InternalError(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal error occurred".to_string(),
                )
            }
        };

        let body = json!({
            "error": message,
            "code": code,
        });

        (status, axum::Json(body)).into_response()
    }
}

/// Classify a sqlx error into an HTTP status, error code, and message.
///
/// - `RowNotFound` maps to 404.
/// - Unique constraint violations (constraint name starting with `uq_`) map
///   to 409. The repository layer normally absorbs the reservation-key
///   conflict before it gets here; this is the safety net for any other
///   unique index.
/// - Everything else maps to 500 with a sanitized message.
fn classify_sqlx_error(err: &sqlx::Error) -> (StatusCode, &'static str, String) {
    match err {
        sqlx::Error::RowNotFound => (
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            "Resource not found".to_string(),
        ),
        sqlx::Error::Database(db_err) => {
            // PostgreSQL unique constraint violation: error code 23505
            if db_err.code().as_deref() == Some("23505") {
                let constraint = db_err.constraint().unwrap_or("unknown");
                if constraint.starts_with("uq_") {
                    return (
                        StatusCode::CONFLICT,
                        "CONFLICT",
                        format!("Duplicate value violates unique constraint: {constraint}"),
                    );
                }
            }
            tracing::error!(error = %db_err, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
        other => {
            tracing::error!(error = %other, "Database error");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "An internal error occurred".to_string(),
            )
        }
    }
}
