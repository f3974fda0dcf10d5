//! Thin HTTP and WebSocket adapter over the status registry and broadcast hub
//!
//! ## Endpoints
//!
//! - `GET /api/v1/health` - Health check with the monitored resource types
//! - `GET /api/v1/status` - Status of every monitored resource
//! - `GET /api/v1/status/:resource` - Status of one resource
//! - `POST /api/v1/actions/:resource/:action` - Announce an operator action
//! - `WS /api/v1/stream/:resource` - Real-time snapshots of one resource

pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use error::{ApiError, ApiResult};
pub use state::ApiState;

use std::net::SocketAddr;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/health", get(routes::health::health_check))
        .route("/api/v1/status", get(routes::status::list_status))
        .route("/api/v1/status/:resource", get(routes::status::get_status))
        .route(
            "/api/v1/actions/:resource/:action",
            post(routes::actions::mark_action),
        )
        .route("/api/v1/stream/:resource", get(websocket::websocket_handler))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Spawn the API server
///
/// Binds `bind_addr`, serves in a background task and returns the bound
/// address (useful with port 0).
pub async fn spawn_api_server(bind_addr: SocketAddr, state: ApiState) -> anyhow::Result<SocketAddr> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    let addr = listener.local_addr()?;

    info!("API server listening on {addr}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("API server error: {e}");
        }
    });

    Ok(addr)
}
