use axum::http::StatusCode;
use mathtutor_api::services::diagnostic::RawDiagnostic;

mod common;

use common::{create_test_app, ADDITION_PROBLEM};

#[tokio::test]
async fn test_diagnostics_degrade_when_model_fails() {
    let app = create_test_app();
    app.model
        .push("arithmetic_error", "corrective_feedback", "Check your sum again.");
    let attempt_id = app.start("diag-a", ADDITION_PROBLEM).await;
    app.answer(&attempt_id, "11").await;

    let (status, report) = app
        .post_empty(&format!("/api/v1/attempts/{attempt_id}/diagnostics"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["misconception"], "none");
    assert_eq!(report["confidence"], "low");
    assert_eq!(report["degraded"], true);
    assert_eq!(report["recommendations"].as_array().unwrap().len(), 2);

    let (_, view) = app.get(&format!("/api/v1/attempts/{attempt_id}")).await;
    assert_eq!(view["conversation"].as_array().unwrap().len(), 2);
    assert_eq!(view["hint_count"], 0);
}

#[tokio::test]
async fn test_diagnostics_classify_after_attempt_is_closed() {
    let app = create_test_app();
    app.model.set_diagnostic(RawDiagnostic {
        misconception_type: Some("arithmetic".to_string()),
        confidence: Some("high".to_string()),
        evidence: Some("Off by one in both answers.".to_string()),
        recommendations: Some(vec!["Practice counting on.".to_string()]),
    });
    let attempt_id = app.start("diag-b", ADDITION_PROBLEM).await;
    app.post_empty(&format!("/api/v1/attempts/{attempt_id}/abandon"))
        .await;

    let (status, report) = app
        .post_empty(&format!("/api/v1/attempts/{attempt_id}/diagnostics"))
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["misconception"], "arithmetic");
    assert_eq!(report["confidence"], "high");
    assert_eq!(report["degraded"], false);
}

#[tokio::test]
async fn test_health_and_metrics_endpoints() {
    let app = create_test_app();

    let (status, health) = app.get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["dependencies"]["attempt_store"]["status"], "healthy");

    let attempt_id = app.start("diag-c", ADDITION_PROBLEM).await;
    assert!(!attempt_id.is_empty());

    let response = app.get("/metrics").await;
    assert_eq!(response.0, StatusCode::OK);
}
