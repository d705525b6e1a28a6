use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TutorError};
use crate::metrics::{track_model_call, FALLBACK_TURNS_TOTAL};
use crate::models::{Badge, Problem, ProblemSummary, ResponseType, Turn};

pub const FALLBACK_TUTOR_MESSAGE: &str =
    "I'm having a little trouble understanding your answer. Could you rephrase it or show me how you got there?";

#[derive(Debug, Clone, Serialize)]
pub struct EvaluationRequest {
    pub problem: ProblemSummary,
    pub history: Vec<Turn>,
    pub learner_answer: String,
    pub hint_count: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learner_age: Option<u8>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SolutionRequest {
    pub problem: ProblemSummary,
    pub history: Vec<Turn>,
    pub hint_count: u8,
    pub request_solution: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub learner_age: Option<u8>,
}

/// Evaluation response as returned by the model, before validation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawEvaluation {
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub tutor_message: Option<String>,
    #[serde(default)]
    pub badge_type: Option<String>,
    #[serde(default)]
    pub show_solution_button: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawSolution {
    #[serde(default)]
    pub explanation: Option<String>,
}

/// Language model evaluation capability.
#[async_trait]
pub trait EvaluationClient: Send + Sync {
    async fn evaluate(&self, request: &EvaluationRequest) -> anyhow::Result<RawEvaluation>;

    async fn solve(&self, request: &SolutionRequest) -> anyhow::Result<RawSolution>;
}

/// A validated evaluation, safe to drive the state machine.
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationResult {
    pub response_type: ResponseType,
    pub tutor_message: String,
    pub badge: Option<Badge>,
    /// Set when this is the local fallback rather than a model result.
    pub fallback: bool,
}

impl EvaluationResult {
    pub fn fallback() -> Self {
        Self {
            response_type: ResponseType::NeedsHint,
            tutor_message: FALLBACK_TUTOR_MESSAGE.to_string(),
            badge: Some(Badge::HintGiven),
            fallback: true,
        }
    }
}

/// Boundary between the orchestrator and the evaluation capability.
///
/// Every response is checked against the contract; violations and failed calls
/// are replaced by [`EvaluationResult::fallback`]. Calls are never retried.
#[derive(Clone)]
pub struct EvaluationGateway {
    client: Arc<dyn EvaluationClient>,
}

impl EvaluationGateway {
    pub fn new(client: Arc<dyn EvaluationClient>) -> Self {
        Self { client }
    }

    pub async fn evaluate(
        &self,
        problem: &Problem,
        history: &[Turn],
        learner_answer: &str,
        hint_count: u8,
        learner_age: Option<u8>,
    ) -> Result<EvaluationResult> {
        let learner_answer = learner_answer.trim();
        if learner_answer.is_empty() {
            return Err(TutorError::EmptyAnswer);
        }

        let request = EvaluationRequest {
            problem: problem.summary(),
            history: history.to_vec(),
            learner_answer: learner_answer.to_string(),
            hint_count,
            learner_age,
        };

        let (outcome, reason) =
            match track_model_call("evaluate", self.client.evaluate(&request)).await {
                Ok(raw) => (
                    validate_evaluation(raw, problem, hint_count),
                    "contract_violation",
                ),
                Err(e) => (
                    Err(TutorError::MalformedEvaluation(format!(
                        "evaluation call failed: {:#}",
                        e
                    ))),
                    "call_failed",
                ),
            };

        match outcome {
            Ok(result) => Ok(result),
            Err(err) => {
                tracing::warn!(
                    problem_id = %problem.id,
                    hint_count,
                    error = %err,
                    "Evaluation rejected, issuing fallback turn"
                );
                FALLBACK_TURNS_TOTAL.with_label_values(&[reason]).inc();
                Ok(EvaluationResult::fallback())
            }
        }
    }

    /// Solution form of the evaluation. Falls back to the problem's own
    /// explanation when it has one.
    pub async fn reveal_solution(
        &self,
        problem: &Problem,
        history: &[Turn],
        hint_count: u8,
        learner_age: Option<u8>,
    ) -> Result<String> {
        let request = SolutionRequest {
            problem: problem.summary(),
            history: history.to_vec(),
            hint_count,
            request_solution: true,
            learner_age,
        };

        let explanation = track_model_call("solution", self.client.solve(&request))
            .await
            .map_err(|e| format!("{:#}", e))
            .and_then(|raw| {
                raw.explanation
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .ok_or_else(|| "solution response has no explanation".to_string())
            });

        match explanation {
            Ok(text) => Ok(text),
            Err(reason) => {
                if let Some(known) = problem
                    .explanation
                    .as_deref()
                    .map(str::trim)
                    .filter(|text| !text.is_empty())
                {
                    tracing::warn!(
                        problem_id = %problem.id,
                        reason = %reason,
                        "Solution call failed, using stored explanation"
                    );
                    return Ok(known.to_string());
                }
                Err(TutorError::SolutionUnavailable(reason))
            }
        }
    }
}

/// Checks a raw evaluation against the response contract.
pub fn validate_evaluation(
    raw: RawEvaluation,
    problem: &Problem,
    hint_count: u8,
) -> Result<EvaluationResult> {
    let response_type: ResponseType = raw
        .response_type
        .as_deref()
        .ok_or_else(|| TutorError::MalformedEvaluation("missing response_type".to_string()))?
        .parse()
        .map_err(TutorError::MalformedEvaluation)?;

    let tutor_message = raw
        .tutor_message
        .map(|message| message.trim().to_string())
        .filter(|message| !message.is_empty())
        .ok_or_else(|| TutorError::MalformedEvaluation("missing tutor_message".to_string()))?;

    let badge = match raw.badge_type.as_deref().map(str::trim) {
        None => {
            return Err(TutorError::MalformedEvaluation(
                "missing badge_type".to_string(),
            ))
        }
        Some("" | "none") => None,
        Some(name) => Some(name.parse::<Badge>().map_err(TutorError::MalformedEvaluation)?),
    };

    // needs_hint and hint_given must be emitted together.
    if response_type.consumes_hint() != (badge == Some(Badge::HintGiven)) {
        return Err(TutorError::MalformedEvaluation(format!(
            "response_type {} disagrees with badge_type {:?}",
            response_type,
            badge.map(|b| b.as_str())
        )));
    }

    if !response_type.is_terminal() {
        if let Some(expected) = problem.expected_answer.as_deref() {
            if leaks_answer(&tutor_message, expected) {
                return Err(TutorError::MalformedEvaluation(
                    "tutor_message reveals the expected answer".to_string(),
                ));
            }
        }
    }

    if let Some(shown) = raw.show_solution_button {
        tracing::debug!(shown, hint_count, "Ignoring model show_solution_button");
    }

    Ok(EvaluationResult {
        response_type,
        tutor_message,
        badge,
        fallback: false,
    })
}

/// Whole-token, case-insensitive search for `expected` inside `message`.
pub fn leaks_answer(message: &str, expected: &str) -> bool {
    let expected = expected.trim();
    if expected.is_empty() {
        return false;
    }

    let pattern = format!(
        r"(?i)(?:^|[^\w.]){}(?:$|[^\w])",
        regex::escape(expected)
    );
    match Regex::new(&pattern) {
        Ok(re) => re.is_match(message),
        Err(_) => message.to_lowercase().contains(&expected.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Complexity;
    use std::sync::Mutex;

    struct CannedClient {
        evaluation: Mutex<Option<anyhow::Result<RawEvaluation>>>,
        solution: Mutex<Option<anyhow::Result<RawSolution>>>,
    }

    impl CannedClient {
        fn evaluating(result: anyhow::Result<RawEvaluation>) -> Arc<Self> {
            Arc::new(Self {
                evaluation: Mutex::new(Some(result)),
                solution: Mutex::new(None),
            })
        }

        fn solving(result: anyhow::Result<RawSolution>) -> Arc<Self> {
            Arc::new(Self {
                evaluation: Mutex::new(None),
                solution: Mutex::new(Some(result)),
            })
        }
    }

    #[async_trait]
    impl EvaluationClient for CannedClient {
        async fn evaluate(&self, _request: &EvaluationRequest) -> anyhow::Result<RawEvaluation> {
            self.evaluation
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no canned evaluation")))
        }

        async fn solve(&self, _request: &SolutionRequest) -> anyhow::Result<RawSolution> {
            self.solution
                .lock()
                .unwrap()
                .take()
                .unwrap_or_else(|| Err(anyhow::anyhow!("no canned solution")))
        }
    }

    fn problem(expected_answer: Option<&str>) -> Problem {
        Problem {
            id: "p-7".to_string(),
            grade_level: 4,
            chapter: "multiplication".to_string(),
            sequence_number: 7,
            complexity: Complexity::Easy,
            requires_multi_step: false,
            text: "A box holds 6 rows of 7 eggs. How many eggs?".to_string(),
            expected_answer: expected_answer.map(str::to_string),
            explanation: None,
        }
    }

    fn raw(response_type: &str, message: &str, badge: &str) -> RawEvaluation {
        RawEvaluation {
            response_type: Some(response_type.to_string()),
            tutor_message: Some(message.to_string()),
            badge_type: Some(badge.to_string()),
            show_solution_button: Some(false),
        }
    }

    #[test]
    fn accepts_well_formed_hint() {
        let result = validate_evaluation(
            raw("needs_hint", "Try counting one row first.", "hint_given"),
            &problem(None),
            0,
        )
        .unwrap();
        assert_eq!(result.response_type, ResponseType::NeedsHint);
        assert_eq!(result.badge, Some(Badge::HintGiven));
        assert!(!result.fallback);
    }

    #[test]
    fn accepts_none_badge_for_correct_final() {
        let result = validate_evaluation(
            raw("correct_final", "Great job, 42 eggs!", "none"),
            &problem(Some("42")),
            1,
        )
        .unwrap();
        assert_eq!(result.response_type, ResponseType::CorrectFinal);
        assert_eq!(result.badge, None);
    }

    #[test]
    fn rejects_missing_fields() {
        let mut missing_type = raw("needs_hint", "hint", "hint_given");
        missing_type.response_type = None;
        assert!(matches!(
            validate_evaluation(missing_type, &problem(None), 0),
            Err(TutorError::MalformedEvaluation(_))
        ));

        let mut blank_message = raw("partial_progress", "   ", "partial_progress");
        blank_message.tutor_message = Some("   ".to_string());
        assert!(validate_evaluation(blank_message, &problem(None), 0).is_err());

        let mut missing_badge = raw("partial_progress", "Good step", "partial_progress");
        missing_badge.badge_type = None;
        assert!(validate_evaluation(missing_badge, &problem(None), 0).is_err());
    }

    #[test]
    fn rejects_unknown_response_type() {
        let err = validate_evaluation(
            raw("almost_there", "Keep going", "partial_progress"),
            &problem(None),
            0,
        )
        .unwrap_err();
        assert!(err.to_string().contains("almost_there"));
    }

    #[test]
    fn rejects_hint_badge_disagreement() {
        assert!(validate_evaluation(
            raw("needs_hint", "Look at the rows.", "corrective_feedback"),
            &problem(None),
            0
        )
        .is_err());
        assert!(validate_evaluation(
            raw("conceptual_error", "Rows times columns.", "hint_given"),
            &problem(None),
            0
        )
        .is_err());
    }

    #[test]
    fn rejects_answer_leak_in_non_terminal_turn() {
        let err = validate_evaluation(
            raw(
                "arithmetic_error",
                "Almost! The answer is 42.",
                "corrective_feedback",
            ),
            &problem(Some("42")),
            0,
        )
        .unwrap_err();
        assert!(matches!(err, TutorError::MalformedEvaluation(_)));
    }

    #[test]
    fn leak_check_matches_whole_tokens_only() {
        assert!(leaks_answer("so it is 42.", "42"));
        assert!(leaks_answer("42 eggs", "42"));
        assert!(!leaks_answer("there are 420 eggs", "42"));
        assert!(!leaks_answer("try 6 x 7", "42"));
        assert!(leaks_answer("You get 3/4 here", "3/4"));
        assert!(!leaks_answer("anything", "   "));
    }

    #[tokio::test]
    async fn failed_call_becomes_fallback_turn() {
        let gateway =
            EvaluationGateway::new(CannedClient::evaluating(Err(anyhow::anyhow!("timeout"))));
        let result = gateway
            .evaluate(&problem(None), &[], "42", 0, None)
            .await
            .unwrap();
        assert_eq!(result, EvaluationResult::fallback());
        assert_eq!(result.tutor_message, FALLBACK_TUTOR_MESSAGE);
    }

    #[tokio::test]
    async fn malformed_response_becomes_fallback_turn() {
        let gateway =
            EvaluationGateway::new(CannedClient::evaluating(Ok(RawEvaluation::default())));
        let result = gateway
            .evaluate(&problem(None), &[], "7", 2, Some(9))
            .await
            .unwrap();
        assert!(result.fallback);
        assert_eq!(result.response_type, ResponseType::NeedsHint);
    }

    #[tokio::test]
    async fn blank_answer_is_rejected_before_the_call() {
        let gateway = EvaluationGateway::new(CannedClient::evaluating(Ok(raw(
            "correct_final",
            "yes",
            "none",
        ))));
        assert!(matches!(
            gateway.evaluate(&problem(None), &[], "  \n", 0, None).await,
            Err(TutorError::EmptyAnswer)
        ));
    }

    #[tokio::test]
    async fn solution_falls_back_to_stored_explanation() {
        let gateway =
            EvaluationGateway::new(CannedClient::solving(Err(anyhow::anyhow!("502"))));
        let mut generated = problem(Some("42"));
        generated.explanation = Some("6 rows of 7 is 6 x 7 = 42.".to_string());

        let text = gateway
            .reveal_solution(&generated, &[], 3, None)
            .await
            .unwrap();
        assert_eq!(text, "6 rows of 7 is 6 x 7 = 42.");
    }

    #[tokio::test]
    async fn solution_without_any_explanation_is_unavailable() {
        let gateway = EvaluationGateway::new(CannedClient::solving(Ok(RawSolution {
            explanation: Some("  ".to_string()),
        })));
        assert!(matches!(
            gateway.reveal_solution(&problem(None), &[], 3, None).await,
            Err(TutorError::SolutionUnavailable(_))
        ));
    }
}
