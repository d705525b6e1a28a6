use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;

use crate::error::TutorError;
use crate::metrics;
use crate::services::AppState;

pub mod attempts;
pub mod problems;

pub async fn health_check(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let mut dependencies = serde_json::Map::new();

    let problems = check_dependency("problem repository", state.problems.ping()).await;
    let store = check_dependency("attempt store", state.store.ping()).await;
    let all_healthy = [&problems, &store]
        .iter()
        .all(|health| health.get("status").and_then(|v| v.as_str()) == Some("healthy"));
    dependencies.insert("problems".to_string(), json!(problems));
    dependencies.insert("attempt_store".to_string(), json!(store));

    let (status_code, status) = if all_healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "degraded")
    };

    (
        status_code,
        Json(json!({
            "status": status,
            "service": "mathtutor-api",
            "version": env!("CARGO_PKG_VERSION"),
            "dependencies": dependencies
        })),
    )
}

async fn check_dependency(
    name: &str,
    ping: impl Future<Output = anyhow::Result<()>>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut result = serde_json::Map::new();

    match tokio::time::timeout(std::time::Duration::from_secs(1), ping).await {
        Ok(Ok(())) => {
            result.insert("status".to_string(), json!("healthy"));
        }
        Ok(Err(e)) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} error: {}", name, e)));
        }
        Err(_) => {
            result.insert("status".to_string(), json!("unhealthy"));
            result.insert("error".to_string(), json!(format!("{} timeout after 1s", name)));
        }
    }

    result
}

pub async fn metrics_handler() -> impl IntoResponse {
    match metrics::render_metrics() {
        Ok(metrics_text) => (StatusCode::OK, metrics_text),
        Err(e) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to render metrics: {}", e),
        ),
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    NotFound(String),
    Conflict(String),
    Unprocessable(String),
    Unavailable(String),
    Internal(String),
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn unprocessable(message: impl Into<String>) -> Self {
        ApiError::Unprocessable(message.into())
    }
}

impl From<TutorError> for ApiError {
    fn from(err: TutorError) -> Self {
        let message = err.to_string();
        match err {
            TutorError::ProblemNotFound(_) | TutorError::AttemptNotFound(_) => {
                ApiError::NotFound(message)
            }
            TutorError::ConcurrentSubmission(_)
            | TutorError::AttemptClosed(_)
            | TutorError::SolutionNotOffered => ApiError::Conflict(message),
            TutorError::EmptyAnswer => ApiError::Unprocessable(message),
            TutorError::SolutionUnavailable(_) => ApiError::Unavailable(message),
            TutorError::MalformedEvaluation(_)
            | TutorError::GenerationFailure(_)
            | TutorError::DiagnosticFailure(_)
            | TutorError::Upstream(_) => {
                tracing::error!("Unhandled tutor error: {:?}", err);
                ApiError::Internal(message)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, message),
            ApiError::Unprocessable(message) => (StatusCode::UNPROCESSABLE_ENTITY, message),
            ApiError::Unavailable(message) => (StatusCode::SERVICE_UNAVAILABLE, message),
            ApiError::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (
            status,
            Json(json!({ "message": message, "status": status.as_u16() })),
        )
            .into_response()
    }
}
