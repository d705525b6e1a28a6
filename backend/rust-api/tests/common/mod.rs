#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tower::ServiceExt;

use mathtutor_api::{
    config::{Config, StoreBackend},
    create_router,
    models::{Complexity, GeneratedProblem, Problem},
    services::{
        attempt_store::InMemoryAttemptStore,
        diagnostic::{DiagnosticClient, DiagnosticRequest, RawDiagnostic},
        evaluation_gateway::{
            EvaluationClient, EvaluationRequest, RawEvaluation, RawSolution, SolutionRequest,
        },
        mastery::{GenerationRequest, ProblemGenerator},
        problem_repository::InMemoryProblemRepository,
        AppState, Collaborators,
    },
};

pub const ADDITION_PROBLEM: &str = "p-add-1";
pub const MULTIPLICATION_PROBLEM: &str = "p-mult-1";

/// Model stand-in: evaluations are served in order, everything else is a switch.
#[derive(Default)]
pub struct ScriptedModel {
    evaluations: Mutex<VecDeque<RawEvaluation>>,
    pub evaluation_requests: Mutex<Vec<EvaluationRequest>>,
    generation_fails: Mutex<bool>,
    diagnostic: Mutex<Option<RawDiagnostic>>,
}

impl ScriptedModel {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push(&self, response_type: &str, badge: &str, message: &str) {
        self.evaluations.lock().unwrap().push_back(RawEvaluation {
            response_type: Some(response_type.to_string()),
            tutor_message: Some(message.to_string()),
            badge_type: Some(badge.to_string()),
            show_solution_button: None,
        });
    }

    pub fn push_raw(&self, raw: RawEvaluation) {
        self.evaluations.lock().unwrap().push_back(raw);
    }

    pub fn fail_generation(&self) {
        *self.generation_fails.lock().unwrap() = true;
    }

    pub fn set_diagnostic(&self, diagnostic: RawDiagnostic) {
        *self.diagnostic.lock().unwrap() = Some(diagnostic);
    }
}

#[async_trait]
impl EvaluationClient for ScriptedModel {
    async fn evaluate(&self, request: &EvaluationRequest) -> anyhow::Result<RawEvaluation> {
        self.evaluation_requests
            .lock()
            .unwrap()
            .push(request.clone());
        self.evaluations
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted evaluation left"))
    }

    async fn solve(&self, _request: &SolutionRequest) -> anyhow::Result<RawSolution> {
        Ok(RawSolution {
            explanation: Some("Count on from the bigger number, step by step.".to_string()),
        })
    }
}

#[async_trait]
impl ProblemGenerator for ScriptedModel {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Vec<GeneratedProblem>> {
        if *self.generation_fails.lock().unwrap() {
            anyhow::bail!("generator unavailable");
        }
        Ok(vec![GeneratedProblem {
            text: format!("Another one like {}: 9 + 4 = ?", request.original.id),
            expected_answer: "13".to_string(),
            explanation: "9 + 1 = 10, then 3 more is 13.".to_string(),
            complexity: None,
        }])
    }
}

#[async_trait]
impl DiagnosticClient for ScriptedModel {
    async fn diagnose(&self, _request: &DiagnosticRequest) -> anyhow::Result<RawDiagnostic> {
        self.diagnostic
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("diagnostics unavailable"))
    }
}

pub struct TestApp {
    pub router: Router,
    pub model: Arc<ScriptedModel>,
    pub store: Arc<InMemoryAttemptStore>,
}

pub fn seed_problems() -> Vec<Problem> {
    vec![
        Problem {
            id: ADDITION_PROBLEM.to_string(),
            grade_level: 2,
            chapter: "addition".to_string(),
            sequence_number: 1,
            complexity: Complexity::Easy,
            requires_multi_step: false,
            text: "Mia has 8 apples and picks 4 more. How many apples does she have?"
                .to_string(),
            expected_answer: Some("12".to_string()),
            explanation: Some("8 + 4 = 12".to_string()),
        },
        Problem {
            id: MULTIPLICATION_PROBLEM.to_string(),
            grade_level: 3,
            chapter: "multiplication".to_string(),
            sequence_number: 1,
            complexity: Complexity::Medium,
            requires_multi_step: true,
            text: "There are 6 boxes with 7 pencils each. 5 pencils break. How many are left?"
                .to_string(),
            expected_answer: Some("37".to_string()),
            explanation: None,
        },
    ]
}

pub fn create_test_app() -> TestApp {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();

    let model = ScriptedModel::new();
    let store = Arc::new(InMemoryAttemptStore::new());

    let config = Config {
        store_backend: StoreBackend::Memory,
        write_async: false,
        ..Config::default()
    };
    let collaborators = Collaborators {
        problems: Arc::new(InMemoryProblemRepository::new(seed_problems())),
        evaluator: model.clone(),
        generator: model.clone(),
        diagnostics: model.clone(),
        store: store.clone(),
    };

    let state = Arc::new(AppState::from_parts(config, collaborators));
    TestApp {
        router: create_router(state),
        model,
        store,
    }
}

impl TestApp {
    pub async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn post_empty(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().method("POST").uri(uri).body(Body::empty()).unwrap())
            .await
    }

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap_or(Value::Null)
        };
        (status, json)
    }

    /// Starts an original attempt and returns its id.
    pub async fn start(&self, session_id: &str, problem_id: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/attempts",
                serde_json::json!({ "session_id": session_id, "problem_id": problem_id }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "start failed: {body}");
        body["attempt_id"].as_str().unwrap().to_string()
    }

    pub async fn answer(&self, attempt_id: &str, answer: &str) -> (StatusCode, Value) {
        self.post(
            &format!("/api/v1/attempts/{attempt_id}/answers"),
            serde_json::json!({ "answer": answer }),
        )
        .await
    }
}
