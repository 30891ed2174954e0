//! HTTP API routes for the financial analyst service
//!
//! Every route reaches runs through the ConductorActor; handlers never touch
//! the orchestrator directly.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use std::sync::Arc;

pub mod analysis;

use crate::app_state::AppState;

#[derive(Clone)]
pub struct ApiState {
    pub app_state: Arc<AppState>,
}

/// Configure all API routes
pub fn router() -> Router<ApiState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/analyze", post(analysis::analyze))
        // Fire-and-poll contract used by the web frontend
        .route("/api/send-request", post(analysis::send_request))
        .route("/api/get-response", get(analysis::get_response))
        .route("/api/runs", get(analysis::list_runs))
        .route("/api/runs/{run_id}", get(analysis::get_run))
}

/// Health check endpoint
pub async fn health_check(State(_state): State<ApiState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(json!({
            "status": "healthy",
            "service": "financial-analyst",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
