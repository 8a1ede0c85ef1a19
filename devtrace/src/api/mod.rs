//! HTTP control API for DevTrace
//!
//! The display/trigger layer (popup, panels) drives the coordinator and
//! reads trace logs through these routes.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub mod control;
pub mod tabs;

use crate::app_state::{AppState, AppStateError};

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        // Global settings and switches
        .route(
            "/settings",
            get(control::get_settings).patch(control::update_settings),
        )
        .route("/kill-all", post(control::kill_all))
        .route("/browsing-data/clear", post(control::clear_browsing_data))
        // Tab lifecycle
        .route("/tabs", get(tabs::list_tabs))
        .route("/tabs/{tab_id}", axum::routing::delete(tabs::close_tab))
        .route("/tabs/{tab_id}/frames", post(tabs::open_frame))
        .route("/tabs/{tab_id}/navigation", post(tabs::navigate))
        // Tools
        .route("/tabs/{tab_id}/tools/{tool}", post(tabs::activate_tool))
        .route("/tabs/{tab_id}/activation", get(tabs::get_activation))
        // Trace log
        .route(
            "/tabs/{tab_id}/traces",
            get(tabs::list_traces).delete(tabs::clear_traces),
        )
        .route(
            "/tabs/{tab_id}/traces/{trace_id}/curl",
            get(tabs::get_trace_curl),
        )
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
        "status": "healthy",
        "service": "devtrace",
        "version": env!("CARGO_PKG_VERSION")
        })),
    )
}

pub(crate) fn error_response(status: StatusCode, error: impl std::fmt::Display) -> Response {
    (
        status,
        Json(json!({
            "success": false,
            "error": error.to_string()
        })),
    )
        .into_response()
}

pub(crate) fn app_error(e: AppStateError) -> Response {
    let status = match &e {
        AppStateError::InvalidUrl { .. } => StatusCode::BAD_REQUEST,
        AppStateError::UnknownFrame { .. } => StatusCode::NOT_FOUND,
        AppStateError::MonitorInactive(_) => StatusCode::CONFLICT,
        AppStateError::Actor(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, e)
}
