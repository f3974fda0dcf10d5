//! Health check endpoint

use axum::{Json, extract::State};
use serde::Serialize;

use crate::ResourceKind;
use crate::api::state::ApiState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: String,
    pub resources: Vec<ResourceKind>,
}

/// GET /api/v1/health
pub async fn health_check(State(state): State<ApiState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now().to_rfc3339(),
        resources: state.registry.kinds(),
    })
}
