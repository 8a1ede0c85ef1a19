//! Per-tab endpoints: frame lifecycle, tool activation, trace log

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use shared_types::{ActivationCommand, FrameId, TabId, ToolArgs, ToolKind, TraceKind};

use super::{app_error, error_response, ApiState};
use crate::actors::coordinator::{self, CoordinatorError, CoordinatorMsg};
use crate::trace_log::TraceQuery;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenFrameRequest {
    pub frame_id: u32,
    pub url: String,
    pub parent_frame_id: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct NavigateRequest {
    pub url: String,
}

/// Body of a tool activation; every field optional (empty body toggles)
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivateToolRequest {
    #[serde(default)]
    pub forced_state: Option<bool>,
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub args: Option<ToolArgs>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TraceListQuery {
    /// Case-insensitive text matched across every field
    pub q: Option<String>,
    pub method: Option<String>,
    pub status: Option<u16>,
    pub kind: Option<TraceKind>,
    pub limit: Option<usize>,
}

impl TraceListQuery {
    fn into_query(self) -> (TraceQuery, Option<usize>) {
        let query = TraceQuery {
            text: self.q,
            method: self.method,
            status: self.status,
            kind: self.kind,
        };
        (query, self.limit)
    }
}

pub async fn list_tabs(State(state): State<ApiState>) -> impl IntoResponse {
    let coordinator = state.app_state.coordinator();
    match ractor::call!(coordinator, |reply| CoordinatorMsg::ListTabs { reply }) {
        Ok(tabs) => (StatusCode::OK, Json(tabs)).into_response(),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn open_frame(
    State(state): State<ApiState>,
    Path(tab_id): Path<u32>,
    Json(req): Json<OpenFrameRequest>,
) -> impl IntoResponse {
    match state
        .app_state
        .open_frame(
            TabId(tab_id),
            FrameId(req.frame_id),
            &req.url,
            req.parent_frame_id.map(FrameId),
        )
        .await
    {
        Ok(handle) => (
            StatusCode::CREATED,
            Json(json!({
                "success": true,
                "tabId": handle.tab_id,
                "frameId": handle.frame_id,
                "topLevel": handle.window.is_top_level(),
            })),
        )
            .into_response(),
        Err(e) => app_error(e),
    }
}

pub async fn close_tab(
    State(state): State<ApiState>,
    Path(tab_id): Path<u32>,
) -> impl IntoResponse {
    let closed = state.app_state.close_tab(TabId(tab_id)).await;
    (StatusCode::OK, Json(json!({ "success": true, "closed": closed })))
}

pub async fn navigate(
    State(state): State<ApiState>,
    Path(tab_id): Path<u32>,
    Json(req): Json<NavigateRequest>,
) -> impl IntoResponse {
    match state.app_state.navigate(TabId(tab_id), &req.url).await {
        Ok(_) => (
            StatusCode::OK,
            Json(json!({ "success": true, "url": req.url })),
        )
            .into_response(),
        Err(e) => app_error(e),
    }
}

pub async fn activate_tool(
    State(state): State<ApiState>,
    Path((tab_id, tool)): Path<(u32, String)>,
    body: Option<Json<ActivateToolRequest>>,
) -> impl IntoResponse {
    let tool = match tool.parse::<ToolKind>() {
        Ok(tool) => tool,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };
    let req = body.map(|Json(req)| req).unwrap_or_default();
    let command = ActivationCommand {
        tool,
        forced_state: req.forced_state,
        silent: req.silent,
        args: req.args,
    };

    match coordinator::dispatch_command(&state.app_state.coordinator(), TabId(tab_id), command)
        .await
    {
        Ok(Ok(delivered)) => (
            StatusCode::ACCEPTED,
            Json(json!({ "success": true, "delivered": delivered })),
        )
            .into_response(),
        Ok(Err(e @ CoordinatorError::UnknownTab(_))) => error_response(StatusCode::NOT_FOUND, e),
        Ok(Err(e)) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn get_activation(
    State(state): State<ApiState>,
    Path(tab_id): Path<u32>,
) -> impl IntoResponse {
    match coordinator::get_activation(&state.app_state.coordinator(), TabId(tab_id)).await {
        Ok(Some(activation)) => (StatusCode::OK, Json(activation)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("No active tools in tab {tab_id}"),
        ),
        Err(e) => error_response(StatusCode::INTERNAL_SERVER_ERROR, e),
    }
}

pub async fn list_traces(
    State(state): State<ApiState>,
    Path(tab_id): Path<u32>,
    Query(params): Query<TraceListQuery>,
) -> impl IntoResponse {
    let (query, limit) = params.into_query();
    match state.app_state.traces(TabId(tab_id), query, limit).await {
        Ok(traces) => (StatusCode::OK, Json(traces)).into_response(),
        Err(e) => app_error(e),
    }
}

pub async fn clear_traces(
    State(state): State<ApiState>,
    Path(tab_id): Path<u32>,
) -> impl IntoResponse {
    match state.app_state.clear_traces(TabId(tab_id)).await {
        Ok(()) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(e) => app_error(e),
    }
}

pub async fn get_trace_curl(
    State(state): State<ApiState>,
    Path((tab_id, trace_id)): Path<(u32, String)>,
) -> impl IntoResponse {
    match state.app_state.replay(TabId(tab_id), trace_id.clone()).await {
        Ok(Some(output)) => (StatusCode::OK, Json(output)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            format!("Trace not found: {trace_id}"),
        ),
        Err(e) => app_error(e),
    }
}
