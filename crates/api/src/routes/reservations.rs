use axum::routing::{delete, get, patch, post, put};
use axum::Router;

use crate::handlers::reservations as handlers;
use crate::state::AppState;

/// Mount reservation routes (intended for nesting under `/reservations`).
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(handlers::list_today).post(handlers::create_reservation),
        )
        .route(
            "/by-appointment/{appointment_no}",
            get(handlers::get_by_appointment),
        )
        .route("/{id}/serials", put(handlers::update_serials))
        .route("/{id}/details", patch(handlers::update_details))
        .route("/{id}/image", put(handlers::update_image))
        .route("/{id}/complete", post(handlers::complete_reservation))
        .route("/{id}", delete(handlers::delete_reservation))
}
