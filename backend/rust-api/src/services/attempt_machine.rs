//! State machine for one problem attempt.
//!
//! Nothing is mutated before an evaluation call resolves: the learner turn,
//! the tutor turn and any ledger change are committed together afterwards.
//! Dropping an in-flight `submit_answer` future therefore leaves the attempt
//! exactly as it was.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::{Result, TutorError};
use crate::metrics::{EVALUATIONS_TOTAL, HINTS_RECORDED_TOTAL};
use crate::models::{
    AttemptFinalization, AttemptPhase, AttemptRecord, AttemptView, Conversation,
    FinalStatus, MasteryOutcome, Problem, ResponseType, TerminalState, Turn,
};
use crate::services::evaluation_gateway::{EvaluationGateway, EvaluationResult};
use crate::services::hint_ledger::HintLedger;

/// Turns committed by one transition, in conversation order.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub committed: Vec<(u32, Turn)>,
    pub tutor_turn: Option<Turn>,
    pub hint_recorded: bool,
    pub terminal: Option<TerminalState>,
}

#[derive(Debug, Clone)]
pub struct Attempt {
    id: Uuid,
    session_id: String,
    problem: Problem,
    conversation: Conversation,
    ledger: HintLedger,
    phase: AttemptPhase,
    solution_offered: bool,
    is_mastery_check: bool,
    original_problem_id: Option<String>,
    original_attempt_id: Option<Uuid>,
    mastery_attempt_id: Option<Uuid>,
    mastery_outcome: Option<MasteryOutcome>,
    mastery_triggered: bool,
    learner_age: Option<u8>,
    created_at: DateTime<Utc>,
}

impl Attempt {
    pub fn new_original(
        session_id: impl Into<String>,
        problem: Problem,
        learner_age: Option<u8>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            problem,
            conversation: Conversation::new(),
            ledger: HintLedger::new(),
            phase: AttemptPhase::Presented,
            solution_offered: false,
            is_mastery_check: false,
            original_problem_id: None,
            original_attempt_id: None,
            mastery_attempt_id: None,
            mastery_outcome: None,
            mastery_triggered: false,
            learner_age,
            created_at: Utc::now(),
        }
    }

    /// A mastery-check attempt on `problem`, scoped to `original`.
    pub fn new_mastery(original: &Attempt, problem: Problem) -> Self {
        Self {
            is_mastery_check: true,
            original_problem_id: Some(original.problem.id.clone()),
            original_attempt_id: Some(original.id),
            ..Self::new_original(original.session_id.clone(), problem, original.learner_age)
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn phase(&self) -> AttemptPhase {
        self.phase
    }

    pub fn hint_count(&self) -> u8 {
        self.ledger.current_count()
    }

    pub fn hints_remaining(&self) -> u8 {
        self.ledger.remaining()
    }

    pub fn solution_offered(&self) -> bool {
        self.solution_offered
    }

    pub fn is_mastery_check(&self) -> bool {
        self.is_mastery_check
    }

    pub fn original_attempt_id(&self) -> Option<Uuid> {
        self.original_attempt_id
    }

    pub fn mastery_attempt_id(&self) -> Option<Uuid> {
        self.mastery_attempt_id
    }

    pub fn mastery_outcome(&self) -> Option<MasteryOutcome> {
        self.mastery_outcome
    }

    pub fn learner_age(&self) -> Option<u8> {
        self.learner_age
    }

    pub fn is_open(&self) -> bool {
        !self.phase.is_terminal()
    }

    pub fn final_status(&self) -> Option<FinalStatus> {
        self.phase.terminal().map(FinalStatus::from)
    }

    /// Evaluates one learner answer and applies the resulting transition.
    pub async fn submit_answer(
        &mut self,
        gateway: &EvaluationGateway,
        answer: &str,
    ) -> Result<Transition> {
        self.ensure_open()?;
        let answer = answer.trim();
        if answer.is_empty() {
            return Err(TutorError::EmptyAnswer);
        }

        let evaluation = gateway
            .evaluate(
                &self.problem,
                self.conversation.turns(),
                answer,
                self.ledger.current_count(),
                self.learner_age,
            )
            .await?;

        Ok(self.apply_evaluation(answer, evaluation))
    }

    /// Commits the learner answer and the tutor reply for `evaluation`.
    pub fn apply_evaluation(&mut self, answer: &str, evaluation: EvaluationResult) -> Transition {
        let response_type = evaluation.response_type;
        let mut badge = evaluation.badge;
        let mut hint_recorded = false;

        EVALUATIONS_TOTAL
            .with_label_values(&[response_type.as_str()])
            .inc();

        self.phase = match response_type {
            ResponseType::CorrectFinal => AttemptPhase::Solved,
            ResponseType::PartialProgress
            | ResponseType::ArithmeticError
            | ResponseType::ConceptualError => AttemptPhase::Evaluated {
                last_response: response_type,
            },
            ResponseType::NeedsHint => {
                let before = self.ledger.current_count();
                let count = self.ledger.record_hint();
                hint_recorded = count > before;
                if hint_recorded {
                    HINTS_RECORDED_TOTAL
                        .with_label_values(&[&count.to_string()])
                        .inc();
                } else {
                    // A saturated ledger issues no hint, so the turn carries no hint badge.
                    badge = None;
                }
                if self.ledger.ceiling_reached() {
                    self.solution_offered = true;
                }
                AttemptPhase::Evaluated {
                    last_response: response_type,
                }
            }
        };

        let learner_turn = Turn::learner(answer);
        let tutor_turn = Turn::tutor(evaluation.tutor_message, Some(response_type), badge);
        let committed = vec![
            (self.conversation.push(learner_turn.clone()), learner_turn),
            (self.conversation.push(tutor_turn.clone()), tutor_turn.clone()),
        ];

        tracing::debug!(
            attempt_id = %self.id,
            response_type = %response_type,
            hint_count = self.ledger.current_count(),
            solution_offered = self.solution_offered,
            fallback = evaluation.fallback,
            "Evaluation applied"
        );

        Transition {
            committed,
            tutor_turn: Some(tutor_turn),
            hint_recorded,
            terminal: self.phase.terminal(),
        }
    }

    /// Reveals the worked solution. Only permitted once the ceiling is reached.
    pub async fn request_solution(&mut self, gateway: &EvaluationGateway) -> Result<Transition> {
        self.ensure_open()?;
        if !self.solution_offered {
            return Err(TutorError::SolutionNotOffered);
        }

        let explanation = gateway
            .reveal_solution(
                &self.problem,
                self.conversation.turns(),
                self.ledger.current_count(),
                self.learner_age,
            )
            .await?;

        let tutor_turn = Turn::tutor(explanation, None, None);
        let sequence = self.conversation.push(tutor_turn.clone());
        self.phase = AttemptPhase::SolutionRevealed;

        tracing::info!(attempt_id = %self.id, "Solution revealed");

        Ok(Transition {
            committed: vec![(sequence, tutor_turn.clone())],
            tutor_turn: Some(tutor_turn),
            hint_recorded: false,
            terminal: Some(TerminalState::SolutionRevealed),
        })
    }

    /// Learner left the problem before finishing it.
    pub fn abandon(&mut self) -> Result<Transition> {
        self.ensure_open()?;
        self.phase = AttemptPhase::Abandoned;
        tracing::info!(attempt_id = %self.id, "Attempt abandoned");
        Ok(Transition {
            committed: Vec::new(),
            tutor_turn: None,
            hint_recorded: false,
            terminal: Some(TerminalState::Abandoned),
        })
    }

    /// True exactly once: for an original attempt that has just been solved.
    pub fn take_mastery_trigger(&mut self) -> bool {
        if self.phase != AttemptPhase::Solved || self.is_mastery_check || self.mastery_triggered {
            return false;
        }
        self.mastery_triggered = true;
        true
    }

    pub fn link_mastery_attempt(&mut self, mastery_attempt_id: Uuid) {
        self.mastery_attempt_id = Some(mastery_attempt_id);
    }

    pub fn set_mastery_outcome(&mut self, outcome: MasteryOutcome) {
        self.mastery_outcome = Some(outcome);
    }

    pub fn finalization(&self) -> Option<AttemptFinalization> {
        self.final_status().map(|final_status| AttemptFinalization {
            final_status,
            hint_count: self.ledger.current_count(),
            mastery_outcome: self.mastery_outcome,
            finalized_at: Utc::now(),
        })
    }

    pub fn to_record(&self) -> AttemptRecord {
        AttemptRecord {
            id: self.id.to_string(),
            session_id: self.session_id.clone(),
            problem_id: self.problem.id.clone(),
            is_mastery_check: self.is_mastery_check,
            original_problem_id: self.original_problem_id.clone(),
            original_attempt_id: self.original_attempt_id.map(|id| id.to_string()),
            learner_age: self.learner_age,
            created_at: self.created_at,
            hint_count: self.ledger.current_count(),
            final_status: self.final_status(),
            mastery_outcome: self.mastery_outcome,
            finalized_at: None,
        }
    }

    pub fn view(&self) -> AttemptView {
        AttemptView {
            attempt_id: self.id,
            session_id: self.session_id.clone(),
            problem: self.problem.summary(),
            phase: self.phase,
            hint_count: self.ledger.current_count(),
            hints_remaining: self.ledger.remaining(),
            show_solution_button: self.solution_offered && self.is_open(),
            is_mastery_check: self.is_mastery_check,
            original_problem_id: self.original_problem_id.clone(),
            original_attempt_id: self.original_attempt_id,
            mastery_attempt_id: self.mastery_attempt_id,
            final_status: self.final_status(),
            mastery_outcome: self.mastery_outcome,
            conversation: self.conversation.turns().to_vec(),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(TutorError::AttemptClosed(self.id))
        }
    }
}
