use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::{Result, TutorError};
use crate::metrics::{track_model_call, MASTERY_CHECKS_TOTAL};
use crate::models::{
    AttemptPhase, DifficultyAdjustment, GeneratedProblem, MasteryOutcome, Problem, ProblemSummary,
    TerminalState,
};
use crate::services::attempt_machine::Attempt;

#[derive(Debug, Clone, Serialize)]
pub struct GenerationRequest {
    pub original: ProblemSummary,
    pub count: u32,
    pub difficulty_adjustment: DifficultyAdjustment,
}

/// Produces sibling problems for an original problem.
#[async_trait]
pub trait ProblemGenerator: Send + Sync {
    async fn generate(&self, request: &GenerationRequest) -> anyhow::Result<Vec<GeneratedProblem>>;
}

/// Spawns the "prove it again" attempt after an original attempt is solved.
#[derive(Clone)]
pub struct MasteryCheckOrchestrator {
    generator: Arc<dyn ProblemGenerator>,
}

impl MasteryCheckOrchestrator {
    pub fn new(generator: Arc<dyn ProblemGenerator>) -> Self {
        Self { generator }
    }

    /// Returns the mastery attempt for a freshly solved original attempt.
    ///
    /// Fails open: `None` when generation fails or when `original` is not an
    /// eligible attempt, and the caller keeps the original as mastered.
    pub async fn begin(&self, original: &Attempt) -> Option<Attempt> {
        if original.is_mastery_check() || original.phase() != AttemptPhase::Solved {
            return None;
        }

        match self.generate_sibling(original.problem()).await {
            Ok(problem) => {
                MASTERY_CHECKS_TOTAL.with_label_values(&["started"]).inc();
                let attempt = Attempt::new_mastery(original, problem);
                tracing::info!(
                    original_attempt_id = %original.id(),
                    mastery_attempt_id = %attempt.id(),
                    problem_id = %attempt.problem().id,
                    "Mastery check started"
                );
                Some(attempt)
            }
            Err(err) => {
                MASTERY_CHECKS_TOTAL
                    .with_label_values(&["generation_failed"])
                    .inc();
                tracing::warn!(
                    original_attempt_id = %original.id(),
                    error = %err,
                    "Skipping mastery check"
                );
                None
            }
        }
    }

    async fn generate_sibling(&self, original: &Problem) -> Result<Problem> {
        let request = GenerationRequest {
            original: original.summary(),
            count: 1,
            difficulty_adjustment: DifficultyAdjustment::Same,
        };

        let generated = track_model_call("generate", self.generator.generate(&request))
            .await
            .map_err(|e| TutorError::GenerationFailure(format!("{:#}", e)))?;

        let first = generated
            .into_iter()
            .next()
            .ok_or_else(|| TutorError::GenerationFailure("no problems returned".to_string()))?;

        if first.text.trim().is_empty() || first.expected_answer.trim().is_empty() {
            return Err(TutorError::GenerationFailure(
                "generated problem is missing text or answer".to_string(),
            ));
        }

        Ok(Problem::from_generated(original, first))
    }

    /// Outer classification of a finished mastery attempt.
    pub fn classify(terminal: TerminalState) -> MasteryOutcome {
        let outcome = match terminal {
            TerminalState::Solved => MasteryOutcome::MasteryPassed,
            TerminalState::SolutionRevealed => MasteryOutcome::MasteryFailed,
            TerminalState::Abandoned => MasteryOutcome::Skipped,
        };
        MASTERY_CHECKS_TOTAL
            .with_label_values(&[outcome.as_str()])
            .inc();
        outcome
    }
}
