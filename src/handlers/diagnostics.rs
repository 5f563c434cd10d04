use axum::{Json, extract::State};

use crate::{
    diagnostics::RunnerError,
    error::ApiError,
    extractors::ValidPath,
    state::AppState,
    types::{DiagnosticReport, HealthScore},
};

use super::parse_uuid;

pub async fn run_diagnostics_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
) -> Result<Json<DiagnosticReport>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let report = state
        .diagnostics
        .run_report(webhook_id)
        .await
        .map_err(map_runner_error)?;

    Ok(Json(report))
}

pub async fn health_score_handler(
    State(state): State<AppState>,
    ValidPath(webhook_id): ValidPath<String>,
) -> Result<Json<HealthScore>, ApiError> {
    let webhook_id = parse_uuid("webhook_id", &webhook_id)?;
    let score = state
        .diagnostics
        .health_score(webhook_id)
        .await
        .map_err(map_runner_error)?;

    Ok(Json(score))
}

fn map_runner_error(err: RunnerError) -> ApiError {
    match err {
        RunnerError::Db(db) => ApiError::Db(db),
        RunnerError::NotFound(message) => ApiError::NotFound(message),
        RunnerError::Store(message) => ApiError::Internal(message),
    }
}
