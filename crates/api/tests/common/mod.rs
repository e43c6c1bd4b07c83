use std::sync::Arc;

use axum::Router;
use sqlx::PgPool;

use cardesk_api::auth::jwt::{generate_access_token, JwtConfig};
use cardesk_api::config::ServerConfig;
use cardesk_api::router::build_app_router;
use cardesk_api::state::AppState;
use cardesk_api::ws::WsManager;
use cardesk_core::types::DbId;
use cardesk_events::{ChangeFeed, PresenceBus};

/// Build a test `ServerConfig` with safe defaults and a fixed JWT secret.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        jwt: test_jwt_config(),
    }
}

pub fn test_jwt_config() -> JwtConfig {
    JwtConfig {
        secret: "test-secret".to_string(),
        access_token_expiry_mins: 60,
    }
}

/// Build the full application router with all middleware layers, using the
/// given database pool.
///
/// Mirrors the router construction in `main.rs` so integration tests
/// exercise the same stack production uses. Also returns the change feed so
/// tests can subscribe and assert on published events.
pub fn build_test_app(pool: PgPool) -> (Router, Arc<ChangeFeed>) {
    let config = test_config();
    let change_feed = Arc::new(ChangeFeed::default());

    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::new(WsManager::new()),
        change_feed: Arc::clone(&change_feed),
        presence_bus: Arc::new(PresenceBus::default()),
    };

    (build_app_router(state, &config), change_feed)
}

/// Mint a bearer token for a branch-scoped officer.
pub fn officer_token(officer_id: DbId, name: &str, branch_id: Option<DbId>) -> String {
    generate_access_token(officer_id, name, "officer", branch_id, &test_jwt_config())
        .expect("token generation")
}

/// Mint a bearer token for an admin (cross-branch, unlock privilege).
pub fn admin_token(officer_id: DbId, name: &str) -> String {
    generate_access_token(officer_id, name, "admin", None, &test_jwt_config())
        .expect("token generation")
}
