//! Analysis run endpoints

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ractor::ActorRef;
use serde::{Deserialize, Serialize};
use serde_json::json;
use shared_types::{
    AnalysisError, AnalysisRequest, AnalysisRunResponse, AnalysisRunStatus, SendRequest,
    SendRequestResponse,
};

use crate::actors::conductor::{ConductorError, ConductorMsg};
use crate::api::ApiState;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: AnalysisError,
}

#[derive(Debug, Deserialize)]
pub struct GetResponseQuery {
    pub run_id: Option<String>,
}

fn error_response(status: StatusCode, err: ConductorError) -> Response {
    (status, Json(ErrorResponse { error: err.into() })).into_response()
}

fn not_found(run_id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: AnalysisError {
                code: "RUN_NOT_FOUND".to_string(),
                message: format!("run {run_id} not found"),
            },
        }),
    )
        .into_response()
}

/// HTTP status for a run record.
pub fn status_code_for_run(run: &AnalysisRunResponse) -> StatusCode {
    match run.status {
        AnalysisRunStatus::Running => StatusCode::ACCEPTED,
        AnalysisRunStatus::Finished => StatusCode::OK,
        AnalysisRunStatus::Failed => match run.error.as_ref().map(|e| e.code.as_str()) {
            Some("RUN_TIMEOUT") => StatusCode::GATEWAY_TIMEOUT,
            Some("RUN_BOUND_EXCEEDED") => StatusCode::UNPROCESSABLE_ENTITY,
            Some("ROUTING_SCHEMA_ERROR" | "MODEL_GATEWAY_ERROR" | "WORKER_FAILED") => {
                StatusCode::BAD_GATEWAY
            }
            Some("INVALID_REQUEST") => StatusCode::BAD_REQUEST,
            Some("RUN_ABORTED") => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

async fn conductor(state: &ApiState) -> Result<ActorRef<ConductorMsg>, Response> {
    state.app_state.ensure_conductor().await.map_err(|e| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            ConductorError::ActorUnavailable(format!("Failed to ensure conductor actor: {e}")),
        )
    })
}

fn rpc_unavailable(err: impl std::fmt::Display) -> Response {
    error_response(
        StatusCode::SERVICE_UNAVAILABLE,
        ConductorError::ActorUnavailable(err.to_string()),
    )
}

/// Runs a query to completion and returns the full record.
pub async fn analyze(
    State(state): State<ApiState>,
    Json(request): Json<AnalysisRequest>,
) -> Response {
    if request.query.trim().is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            ConductorError::InvalidRequest("query cannot be empty".to_string()),
        );
    }

    let conductor = match conductor(&state).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    let result = ractor::call!(conductor, |reply| ConductorMsg::ExecuteQuery {
        query: request.query,
        reply,
    });

    match result {
        Ok(Ok(run)) => {
            tracing::info!(run_id = %run.run_id, status = ?run.status, "Analysis request completed");
            (status_code_for_run(&run), Json(run)).into_response()
        }
        Ok(Err(err @ ConductorError::InvalidRequest(_))) => {
            error_response(StatusCode::BAD_REQUEST, err)
        }
        Ok(Err(err)) => error_response(StatusCode::SERVICE_UNAVAILABLE, err),
        Err(e) => rpc_unavailable(e),
    }
}

/// Starts a run in the background.
pub async fn send_request(
    State(state): State<ApiState>,
    Json(request): Json<SendRequest>,
) -> Response {
    let Some(input) = request
        .input
        .filter(|input| !input.trim().is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "No input provided" })),
        )
            .into_response();
    };

    let conductor = match conductor(&state).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match ractor::call!(conductor, |reply| ConductorMsg::SubmitQuery {
        query: input,
        reply,
    }) {
        Ok(Ok(run)) => (
            StatusCode::ACCEPTED,
            Json(SendRequestResponse {
                status: "request_sent".to_string(),
                run_id: run.run_id,
            }),
        )
            .into_response(),
        Ok(Err(err @ ConductorError::InvalidRequest(_))) => {
            error_response(StatusCode::BAD_REQUEST, err)
        }
        Ok(Err(err)) => error_response(StatusCode::SERVICE_UNAVAILABLE, err),
        Err(e) => rpc_unavailable(e),
    }
}

/// `{status: "waiting"}` while the run is in flight, else its record.
pub async fn get_response(
    State(state): State<ApiState>,
    Query(query): Query<GetResponseQuery>,
) -> Response {
    let Some(run_id) = query.run_id.filter(|id| !id.trim().is_empty()) else {
        return error_response(
            StatusCode::BAD_REQUEST,
            ConductorError::InvalidRequest("run_id is required".to_string()),
        );
    };

    match fetch_run(&state, &run_id).await {
        Ok(Some(run)) if run.status == AnalysisRunStatus::Running => (
            StatusCode::OK,
            Json(json!({ "status": "waiting", "run_id": run.run_id })),
        )
            .into_response(),
        Ok(Some(run)) => (StatusCode::OK, Json(run)).into_response(),
        Ok(None) => not_found(&run_id),
        Err(response) => response,
    }
}

pub async fn list_runs(State(state): State<ApiState>) -> Response {
    let conductor = match conductor(&state).await {
        Ok(actor) => actor,
        Err(response) => return response,
    };

    match ractor::call!(conductor, |reply| ConductorMsg::ListRuns { reply }) {
        Ok(runs) => (StatusCode::OK, Json(runs)).into_response(),
        Err(e) => rpc_unavailable(e),
    }
}

pub async fn get_run(State(state): State<ApiState>, Path(run_id): Path<String>) -> Response {
    match fetch_run(&state, &run_id).await {
        Ok(Some(run)) => {
            let status = if run.status == AnalysisRunStatus::Running {
                StatusCode::ACCEPTED
            } else {
                StatusCode::OK
            };
            (status, Json(run)).into_response()
        }
        Ok(None) => not_found(&run_id),
        Err(response) => response,
    }
}

async fn fetch_run(
    state: &ApiState,
    run_id: &str,
) -> Result<Option<AnalysisRunResponse>, Response> {
    let conductor = conductor(state).await?;
    ractor::call!(conductor, |reply| ConductorMsg::GetRun {
        run_id: run_id.to_string(),
        reply,
    })
    .map_err(rpc_unavailable)
}
