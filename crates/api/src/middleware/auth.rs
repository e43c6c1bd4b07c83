//! JWT-based authentication extractor for Axum handlers.

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use cardesk_core::error::CoreError;
use cardesk_core::reservation::is_cross_branch;
use cardesk_core::types::DbId;

use crate::auth::jwt::validate_token;
use crate::error::AppError;
use crate::state::AppState;

/// Authenticated officer extracted from a JWT Bearer token in the
/// `Authorization` header.
///
/// Use this as an extractor parameter in any handler that requires
/// authentication:
///
/// ```ignore
/// async fn my_handler(officer: AuthOfficer) -> AppResult<Json<()>> {
///     tracing::info!(officer_id = officer.officer_id, "handling request");
///     Ok(Json(()))
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AuthOfficer {
    /// The officer's internal database id (from `claims.sub`).
    pub officer_id: DbId,
    /// Display name (shown in conflict messages and presence).
    pub name: String,
    /// Role name (`"officer"`, `"admin"`, `"supervisor"`).
    pub role: String,
    /// Branch partition; `None` is the shared headquarters pool.
    pub branch_id: Option<DbId>,
}

impl AuthOfficer {
    /// Whether this officer sees reservations from every branch.
    pub fn cross_branch(&self) -> bool {
        is_cross_branch(&self.role)
    }
}

impl FromRequestParts<AppState> for AuthOfficer {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| {
                AppError::Core(CoreError::Unauthorized(
                    "Missing Authorization header".into(),
                ))
            })?;

        let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
            AppError::Core(CoreError::Unauthorized(
                "Invalid Authorization format. Expected: Bearer <token>".into(),
            ))
        })?;

        let claims = validate_token(token, &state.config.jwt).map_err(|_| {
            AppError::Core(CoreError::Unauthorized("Invalid or expired token".into()))
        })?;

        Ok(AuthOfficer {
            officer_id: claims.sub,
            name: claims.name,
            role: claims.role,
            branch_id: claims.branch_id,
        })
    }
}
