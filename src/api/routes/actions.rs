//! Operator action endpoint

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use serde::Serialize;
use tracing::info;

use crate::ResourceKind;
use crate::api::{ApiResult, state::ApiState};
use crate::recovery::ActionKind;

#[derive(Debug, Serialize)]
pub struct ActionAccepted {
    pub resource: ResourceKind,
    pub action: ActionKind,
}

/// POST /api/v1/actions/:resource/:action
///
/// Only records the action so the status flip it causes is not alerted on;
/// performing it is up to the caller.
pub async fn mark_action(
    State(state): State<ApiState>,
    Path((resource, action)): Path<(String, String)>,
) -> ApiResult<(StatusCode, Json<ActionAccepted>)> {
    let kind = state.monitored(&resource)?;
    let action: ActionKind = action.parse()?;

    state.registry.mark_external_action(kind, action);
    info!(resource = %kind, "operator announced '{action}'");

    Ok((
        StatusCode::ACCEPTED,
        Json(ActionAccepted {
            resource: kind,
            action,
        }),
    ))
}
