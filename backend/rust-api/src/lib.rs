use axum::{
    http::{header, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

pub mod config;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod metrics;
pub mod middlewares;
pub mod models;
pub mod services;
pub mod utils;

pub use config::Config;
pub use error::TutorError;
pub use services::AppState;

pub fn create_router(app_state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE])
        .allow_origin(tower_http::cors::Any);

    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .nest("/api/v1/attempts", attempt_routes())
        .route(
            "/api/v1/sessions/{session_id}/attempts",
            get(handlers::attempts::list_session_attempts),
        )
        .nest("/api/v1/problems", problem_routes())
        .with_state(app_state)
        .layer(cors)
        .layer(middleware::from_fn(
            middlewares::metrics::metrics_middleware,
        ))
        .layer(middleware::from_fn(
            middlewares::trace::trace_context_middleware,
        ))
        .layer(TraceLayer::new_for_http())
}

fn attempt_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", post(handlers::attempts::start_attempt))
        .route("/{id}", get(handlers::attempts::get_attempt))
        .route("/{id}/answers", post(handlers::attempts::submit_answer))
        .route("/{id}/solution", post(handlers::attempts::request_solution))
        .route("/{id}/abandon", post(handlers::attempts::abandon_attempt))
        .route("/{id}/diagnostics", post(handlers::attempts::run_diagnostics))
        .route("/{id}/turns", get(handlers::attempts::list_attempt_turns))
}

fn problem_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/", get(handlers::problems::list_problems))
        .route("/{id}", get(handlers::problems::get_problem))
}
