use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::ApiError;
use crate::extractors::AppJson;
use crate::models::{StartAttemptRequest, SubmitAnswerRequest};
use crate::services::AppState;

pub async fn start_attempt(
    State(state): State<Arc<AppState>>,
    AppJson(req): AppJson<StartAttemptRequest>,
) -> Result<impl IntoResponse, ApiError> {
    req.validate()
        .map_err(|e| ApiError::unprocessable(format!("Validation error: {}", e)))?;

    tracing::info!(
        "Starting attempt for session_id={}, problem_id={}",
        req.session_id,
        req.problem_id
    );

    let view = state
        .tutor
        .start_attempt(&req.session_id, &req.problem_id, req.learner_age)
        .await?;
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn get_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let view = state.tutor.attempt_view(attempt_id).await?;
    Ok(Json(view))
}

pub async fn submit_answer(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
    AppJson(req): AppJson<SubmitAnswerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Submitting answer for attempt: {}", attempt_id);

    let outcome = state.tutor.submit_answer(attempt_id, &req.answer).await?;
    Ok(Json(outcome))
}

pub async fn request_solution(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Solution requested for attempt: {}", attempt_id);

    let outcome = state.tutor.request_solution(attempt_id).await?;
    Ok(Json(outcome))
}

pub async fn abandon_attempt(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    tracing::info!("Abandoning attempt: {}", attempt_id);

    let outcome = state.tutor.abandon(attempt_id).await?;
    Ok(Json(outcome))
}

pub async fn run_diagnostics(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state.tutor.diagnose(attempt_id).await?;
    Ok(Json(report))
}

pub async fn list_session_attempts(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let attempts = state.tutor.session_attempts(&session_id).await?;
    Ok(Json(attempts))
}

pub async fn list_attempt_turns(
    State(state): State<Arc<AppState>>,
    Path(attempt_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let turns = state.tutor.attempt_turns(attempt_id).await?;
    Ok(Json(turns))
}
