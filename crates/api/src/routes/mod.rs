pub mod health;
pub mod reservations;

use axum::routing::get;
use axum::Router;

use crate::state::AppState;
use crate::ws;

/// Build the `/api/v1` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /ws                                          terminal WebSocket (feed + presence)
///
/// /reservations                                list today (GET), claim (POST)
/// /reservations/by-appointment/{no}            case-insensitive lookup (GET)
/// /reservations/{id}/serials                   record serials (PUT)
/// /reservations/{id}/details                   patch descriptive fields (PATCH)
/// /reservations/{id}/image                     attach card photo (PUT)
/// /reservations/{id}/complete                  issue receipt (POST)
/// /reservations/{id}                           unlock (DELETE, admin)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        // WebSocket endpoint.
        .route("/ws", get(ws::ws_handler))
        // Reservation ledger.
        .nest("/reservations", reservations::router())
}
