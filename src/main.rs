use std::sync::Arc;
use std::time::Duration;
use sqlx::sqlite::SqlitePoolOptions;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use holler_hub::{
    api::{create_router, AppState},
    auth::PasswordAuthenticator,
    config::Config,
    db::SqliteGraphStore,
    error::AppError,
    hub::Hub,
};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,holler_hub=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("🚀 Starting Holler hub v{}...", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::from_env()?);
    tracing::info!("✅ Configuration loaded");

    // The only fatal failure: the store has to be reachable at startup.
    let db = SqlitePoolOptions::new()
        .max_connections(config.db_max_connections)
        .min_connections(config.db_min_connections)
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    tracing::info!("✅ Database connected: {}", config.database_url);

    sqlx::migrate!("./migrations").run(&db).await?;
    tracing::info!("✅ Database migrations completed");

    let (hub, dispatcher) = Hub::start(
        &config,
        Arc::new(SqliteGraphStore::new(db.clone())),
        Arc::new(PasswordAuthenticator::new(db.clone())),
    );
    tracing::info!(
        "✅ Dispatch loop started (queue {}, write timeout {}ms)",
        config.dispatch_queue,
        config.write_timeout_ms
    );

    let state = AppState {
        db,
        hub,
        config: config.clone(),
    };
    let app = create_router(state);

    let addr = config.server_address();
    tracing::info!("🌐 Server listening on http://{}", addr);
    tracing::info!("  GET  /ws          - Hub WebSocket (first frame must be a login envelope)");
    tracing::info!("  POST /api/users   - Register new user");
    tracing::info!("  GET  /api/health  - Health check");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .await
        .map_err(|e| AppError::Internal(format!("Server error: {}", e)))?;

    // Router state (and with it the last hub handle) is gone; let the loop drain.
    if let Err(e) = dispatcher.await {
        tracing::error!("❌ Dispatch loop failed: {}", e);
    }

    Ok(())
}
