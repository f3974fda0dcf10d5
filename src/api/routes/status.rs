//! Status endpoints

use axum::{
    Json,
    extract::{Path, State},
};

use crate::actors::ResourceStatus;
use crate::api::{ApiError, ApiResult, state::ApiState};

/// GET /api/v1/status
pub async fn list_status(State(state): State<ApiState>) -> Json<Vec<ResourceStatus>> {
    let statuses = state
        .registry
        .kinds()
        .into_iter()
        .filter_map(|kind| state.registry.get_status(kind))
        .collect();
    Json(statuses)
}

/// GET /api/v1/status/:resource
///
/// `latest` stays null until the monitor's first successful sample.
pub async fn get_status(
    State(state): State<ApiState>,
    Path(resource): Path<String>,
) -> ApiResult<Json<ResourceStatus>> {
    let kind = state.monitored(&resource)?;
    state
        .registry
        .get_status(kind)
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("{kind} is not monitored")))
}
