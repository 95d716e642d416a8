//! Shared REST state, error bodies and the operational endpoints.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::time::Instant;
use testograph_core::TestographError;
use testograph_reporting::QuizFlowReport;
use tracing::error;

/// Shared application state for REST handlers.
#[derive(Clone)]
pub struct AppState {
    pub report: QuizFlowReport,
    pub node_id: String,
    pub start_time: Instant,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Map a domain error to its HTTP status and `{error, message}` body.
/// Internal failures are logged and their detail is not echoed back.
pub fn api_error(err: TestographError) -> ApiError {
    let (status, code) = match &err {
        TestographError::Validation(_) => (StatusCode::BAD_REQUEST, "validation_error"),
        TestographError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
        TestographError::Conflict(_) => (StatusCode::CONFLICT, "conflict"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
    };
    let message = if status.is_server_error() {
        error!(error = %err, "Request failed");
        metrics::counter!("api.errors").increment(1);
        "Internal processing error".to_string()
    } else {
        err.to_string()
    };
    (
        status,
        Json(ErrorResponse {
            error: code.to_string(),
            message,
        }),
    )
}

/// GET /health: Health check endpoint.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        node_id: state.node_id.clone(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        step_events: state.report.store().step_event_count(),
    })
}

/// GET /ready: Readiness probe.
pub async fn readiness(State(_state): State<AppState>) -> StatusCode {
    StatusCode::OK
}

/// GET /live: Liveness probe.
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub node_id: String,
    pub uptime_secs: u64,
    pub step_events: usize,
}
