use axum::{
    extract::{Path, Query, State},
    Json,
};
use std::sync::Arc;

use super::ApiError;
use crate::models::{Problem, ProblemFilter, ProblemSummary};
use crate::services::AppState;

pub async fn list_problems(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<ProblemFilter>,
) -> Result<Json<Vec<ProblemSummary>>, ApiError> {
    let problems = state.tutor.list_problems(&filter).await?;
    Ok(Json(problems.iter().map(Problem::summary).collect()))
}

pub async fn get_problem(
    State(state): State<Arc<AppState>>,
    Path(problem_id): Path<String>,
) -> Result<Json<ProblemSummary>, ApiError> {
    let problem = state.tutor.find_problem(&problem_id).await?;
    Ok(Json(problem.summary()))
}
