use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::models::GeneratedProblem;
use crate::services::diagnostic::{DiagnosticClient, DiagnosticRequest, RawDiagnostic};
use crate::services::evaluation_gateway::{
    EvaluationClient, EvaluationRequest, RawEvaluation, RawSolution, SolutionRequest,
};
use crate::services::mastery::{GenerationRequest, ProblemGenerator};

const EVALUATE_PATH: &str = "/v1/tutor/evaluate";
const SOLUTION_PATH: &str = "/v1/tutor/solution";
const DIAGNOSE_PATH: &str = "/v1/tutor/diagnose";
const GENERATE_PATH: &str = "/v1/problems/generate";

#[derive(Debug, Deserialize)]
struct GenerateProblemsResponse {
    #[serde(default)]
    problems: Vec<GeneratedProblem>,
}

/// JSON client for the tutoring model service. One instance serves the
/// evaluation, generation and diagnostic seams.
#[derive(Clone)]
pub struct HttpTutorModelClient {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpTutorModelClient {
    pub fn new(base_url: &str, timeout_ms: u64) -> Result<Self> {
        let timeout = Duration::from_millis(timeout_ms);
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build tutor model HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post_json<Req, Resp>(&self, path: &str, payload: &Req) -> Result<Resp>
    where
        Req: Serialize + ?Sized + Sync,
        Resp: DeserializeOwned,
    {
        let url = self.endpoint(path);

        let response = self
            .client
            .post(&url)
            .json(payload)
            .timeout(self.timeout)
            .send()
            .await
            .with_context(|| format!("Failed to call tutor model at {}", path))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Unknown error".to_string());
            return Err(anyhow!(
                "Tutor model returned error {} for {}: {}",
                status,
                path,
                error_text
            ));
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse tutor model response from {}", path))
    }
}

#[async_trait]
impl EvaluationClient for HttpTutorModelClient {
    async fn evaluate(&self, request: &EvaluationRequest) -> Result<RawEvaluation> {
        self.post_json(EVALUATE_PATH, request).await
    }

    async fn solve(&self, request: &SolutionRequest) -> Result<RawSolution> {
        self.post_json(SOLUTION_PATH, request).await
    }
}

#[async_trait]
impl ProblemGenerator for HttpTutorModelClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<Vec<GeneratedProblem>> {
        let response: GenerateProblemsResponse = self.post_json(GENERATE_PATH, request).await?;
        Ok(response.problems)
    }
}

#[async_trait]
impl DiagnosticClient for HttpTutorModelClient {
    async fn diagnose(&self, request: &DiagnosticRequest) -> Result<RawDiagnostic> {
        self.post_json(DIAGNOSE_PATH, request).await
    }
}
