//! HTTP API v1.
//!
//! Endpoints:
//!
//! - `GET  /v1/subjects?limit=N`  List subject ids (default 10)
//! - `POST /v1/analyze`           Run the pipeline for one subject
//!
//! `POST /v1/analyze` returns the run report for finished runs, including
//! runs that stopped at a failed stage; the status code reflects the
//! failure reason.

use axum::{
    Router,
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use mediguard_pipeline::{CancellationToken, FailureReason, RunError, RunReport};

use crate::AppState;

const DEFAULT_SUBJECT_LIMIT: usize = 10;

/// Build the v1 router.
pub fn v1_router(state: AppState) -> Router {
    Router::new()
        .route("/subjects", get(list_subjects))
        .route("/analyze", post(analyze))
        .with_state(state)
}

// ── Types ─────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, error: impl Into<String>) -> ApiError {
    (status, Json(ErrorResponse { error: error.into() }))
}

#[derive(Debug, Deserialize)]
pub struct SubjectsQuery {
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    DEFAULT_SUBJECT_LIMIT
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SubjectsResponse {
    pub ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct AnalyzeRequest {
    pub subject_id: String,
    /// Stop after this stage
    #[serde(default)]
    pub through: Option<String>,
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn list_subjects(
    State(state): State<AppState>,
    Query(query): Query<SubjectsQuery>,
) -> Json<SubjectsResponse> {
    Json(SubjectsResponse {
        ids: state.store.subject_ids(query.limit),
    })
}

async fn analyze(
    State(state): State<AppState>,
    Json(request): Json<AnalyzeRequest>,
) -> Result<(StatusCode, Json<RunReport>), ApiError> {
    let subject_id = request.subject_id.trim();
    if subject_id.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "subject_id must not be empty"));
    }

    let cancel = CancellationToken::new();
    let result = match request.through.as_deref() {
        Some(stage) => state.pipeline.run_through(subject_id, stage, cancel).await,
        None => state.pipeline.run_with_cancel(subject_id, cancel).await,
    };

    let ctx = result.map_err(|e| {
        warn!(subject_id, error = %e, "Analysis rejected");
        api_error(run_error_status(&e), e.to_string())
    })?;

    let status = status_for(ctx.failure().map(|f| f.reason));
    info!(
        run_id = ctx.run_id(),
        subject_id,
        status = status.as_u16(),
        duration_ms = ctx.duration_ms(),
        "Analysis finished"
    );
    Ok((status, Json(ctx.report())))
}

fn run_error_status(err: &RunError) -> StatusCode {
    match err {
        RunError::UnknownSubject(_) | RunError::UnknownStage(_) => StatusCode::NOT_FOUND,
        RunError::Store(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

/// Status code for a finished run.
pub fn status_for(failure: Option<FailureReason>) -> StatusCode {
    match failure {
        None => StatusCode::OK,
        Some(FailureReason::ToolFailure) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(FailureReason::ValidationExhausted) => StatusCode::BAD_GATEWAY,
        Some(FailureReason::Cancelled) => StatusCode::SERVICE_UNAVAILABLE,
    }
}
