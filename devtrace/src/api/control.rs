//! Global control endpoints: settings, kill switch, browsing data

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use shared_types::ClearDataRequest;

use super::{error_response, ApiState};
use crate::actors::coordinator::{self, CoordinatorMsg};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSettingsRequest {
    pub persistent_mode: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearBrowsingDataRequest {
    #[serde(flatten)]
    pub options: ClearDataRequest,
    /// Epoch ms; omitted means all time
    #[serde(default)]
    pub since: i64,
}

pub async fn get_settings(State(state): State<ApiState>) -> impl IntoResponse {
    match coordinator::get_settings(&state.app_state.coordinator()).await {
        Ok(settings) => (StatusCode::OK, Json(settings)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn update_settings(
    State(state): State<ApiState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> impl IntoResponse {
    match coordinator::set_persistent_mode(&state.app_state.coordinator(), req.persistent_mode)
        .await
    {
        Ok(Ok(settings)) => (StatusCode::OK, Json(settings)).into_response(),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn kill_all(State(state): State<ApiState>) -> impl IntoResponse {
    match state.app_state.coordinator().cast(CoordinatorMsg::KillAll) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "success": true }))).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn clear_browsing_data(
    State(state): State<ApiState>,
    Json(req): Json<ClearBrowsingDataRequest>,
) -> impl IntoResponse {
    match coordinator::clear_browsing_data(&state.app_state.coordinator(), req.options, req.since)
        .await
    {
        Ok(Ok(response)) => (StatusCode::OK, Json(response)).into_response(),
        Ok(Err(e)) => error_response(StatusCode::BAD_GATEWAY, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}
