//! `GET /api/admin/quiz-flow`: read-only reporting over the quiz tables.

use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use testograph_reporting::{QuizFlowParams, ReportOutput, ReportQuery};

use crate::rest::{api_error, ApiError, AppState};

pub async fn quiz_flow(
    State(state): State<AppState>,
    Query(params): Query<QuizFlowParams>,
) -> Result<Response, ApiError> {
    let query = ReportQuery::parse(&params, state.report.config()).map_err(api_error)?;
    match state.report.run(&query, Utc::now()).map_err(api_error)? {
        ReportOutput::Json(body) => Ok(Json(body).into_response()),
        ReportOutput::Csv(export) => Ok((
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"{}\"", export.filename),
                ),
            ],
            export.body,
        )
            .into_response()),
    }
}
