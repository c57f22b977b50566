pub mod state;
pub mod users;

pub use state::AppState;

use axum::{
    extract::{State, WebSocketUpgrade},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
    timeout::TimeoutLayer,
};
use std::time::Duration;
use serde::Serialize;

use crate::hub::serve_socket;

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
    connections: usize,
}

pub fn create_router(state: AppState) -> Router {
    let timeout = Duration::from_secs(state.config.request_timeout_secs);

    // The socket route is kept outside the timeout layer: it lives as long
    // as the client stays connected.
    let http = Router::new()
        .route("/api/health", get(health))
        .route("/api/users", post(users::register))
        .layer(TimeoutLayer::new(timeout));

    Router::new()
        .route("/ws", get(websocket))
        .merge(http)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /ws
async fn websocket(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

async fn health(State(state): State<AppState>) -> axum::Json<HealthResponse> {
    axum::Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: state.hub.registry().len().await,
    })
}
