use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::metrics::{track_model_call, DIAGNOSTICS_TOTAL};
use crate::models::{Confidence, DiagnosticReport, Misconception, ProblemSummary};

const DEFAULT_RECOMMENDATIONS: [&str; 2] = [
    "Ask the learner to explain each step out loud before computing.",
    "Revisit a similar worked example together, then try again.",
];

#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticRequest {
    pub problem: ProblemSummary,
    pub answers: Vec<String>,
    pub hint_count: u8,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawDiagnostic {
    #[serde(default)]
    pub misconception_type: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub evidence: Option<String>,
    #[serde(default)]
    pub recommendations: Option<Vec<String>>,
}

#[async_trait]
pub trait DiagnosticClient: Send + Sync {
    async fn diagnose(&self, request: &DiagnosticRequest) -> anyhow::Result<RawDiagnostic>;
}

/// Out-of-band misconception analysis over a learner's full answer history.
///
/// Read-only with respect to attempts and never fails: any problem degrades
/// to a low-confidence `none` report.
#[derive(Clone)]
pub struct DiagnosticComposer {
    client: Arc<dyn DiagnosticClient>,
}

impl DiagnosticComposer {
    pub fn new(client: Arc<dyn DiagnosticClient>) -> Self {
        Self { client }
    }

    pub async fn compose(
        &self,
        problem: ProblemSummary,
        answers: Vec<String>,
        hint_count: u8,
    ) -> DiagnosticReport {
        let problem_id = problem.id.clone();
        let request = DiagnosticRequest {
            problem,
            answers,
            hint_count,
        };

        match self.try_compose(&request).await {
            Ok(report) => {
                DIAGNOSTICS_TOTAL.with_label_values(&["success"]).inc();
                report
            }
            Err(err) => {
                DIAGNOSTICS_TOTAL.with_label_values(&["degraded"]).inc();
                tracing::warn!(problem_id = %problem_id, error = %err, "Diagnostic degraded");
                Self::default_report()
            }
        }
    }

    async fn try_compose(&self, request: &DiagnosticRequest) -> Result<DiagnosticReport> {
        let raw = track_model_call("diagnose", self.client.diagnose(request))
            .await
            .map_err(|e| TutorError::DiagnosticFailure(format!("{:#}", e)))?;

        let misconception: Misconception = raw
            .misconception_type
            .as_deref()
            .ok_or_else(|| TutorError::DiagnosticFailure("missing misconception_type".into()))?
            .parse()
            .map_err(TutorError::DiagnosticFailure)?;

        let confidence = match raw.confidence.as_deref() {
            Some(value) => value.parse().map_err(TutorError::DiagnosticFailure)?,
            None => Confidence::Low,
        };

        let recommendations: Vec<String> = raw
            .recommendations
            .unwrap_or_default()
            .into_iter()
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect();

        Ok(DiagnosticReport {
            misconception,
            confidence,
            evidence: raw.evidence.unwrap_or_default().trim().to_string(),
            recommendations: if recommendations.is_empty() {
                Self::default_recommendations()
            } else {
                recommendations
            },
            degraded: false,
        })
    }

    pub fn default_report() -> DiagnosticReport {
        DiagnosticReport {
            misconception: Misconception::None,
            confidence: Confidence::Low,
            evidence: String::new(),
            recommendations: Self::default_recommendations(),
            degraded: true,
        }
    }

    fn default_recommendations() -> Vec<String> {
        DEFAULT_RECOMMENDATIONS
            .iter()
            .map(|text| text.to_string())
            .collect()
    }
}
