use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cardesk_api::config::ServerConfig;
use cardesk_api::router::build_app_router;
use cardesk_api::state::AppState;
use cardesk_api::ws;
use cardesk_events::{ChangeFeed, PresenceBus};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cardesk_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Database ---
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = cardesk_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    cardesk_db::health_check(&pool)
        .await
        .expect("Database health check failed");

    cardesk_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    // --- WebSocket manager + buses ---
    let ws_manager = Arc::new(ws::WsManager::new());
    let change_feed = Arc::new(ChangeFeed::default());
    let presence_bus = Arc::new(PresenceBus::default());

    // --- Background tasks (heartbeat + bus pumps) ---
    let cancel = CancellationToken::new();
    let heartbeat = ws::start_heartbeat(Arc::clone(&ws_manager), cancel.clone());
    let change_pump = ws::start_change_pump(
        Arc::clone(&ws_manager),
        change_feed.subscribe(),
        cancel.clone(),
    );
    let presence_pump = ws::start_presence_pump(
        Arc::clone(&ws_manager),
        presence_bus.subscribe(),
        cancel.clone(),
    );
    tracing::info!("Background tasks started (heartbeat, change pump, presence pump)");

    // --- App state + router ---
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
        ws_manager: Arc::clone(&ws_manager),
        change_feed: Arc::clone(&change_feed),
        presence_bus: Arc::clone(&presence_bus),
    };
    let app = build_app_router(state, &config);

    // --- Serve ---
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .expect("Invalid bind address");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    tracing::info!(%addr, "cardesk-api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Drain: stop background tasks, close terminal connections ---
    cancel.cancel();
    ws_manager.shutdown_all().await;
    let _ = tokio::join!(heartbeat, change_pump, presence_pump);
    tracing::info!("Shutdown complete");
}

/// Resolve when the process receives Ctrl-C / SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
