use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use super::conversation::{ResponseType, Turn};
use super::problem::ProblemSummary;

/// Lifecycle of a single attempt.
///
/// `Presented` -> `AwaitingEvaluation` -> `Evaluated` -> (`AwaitingEvaluation` | terminal).
/// Terminal states are `Solved`, `SolutionRevealed` and `Abandoned`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum AttemptPhase {
    Presented,
    AwaitingEvaluation,
    Evaluated { last_response: ResponseType },
    Solved,
    SolutionRevealed,
    Abandoned,
}

impl AttemptPhase {
    pub fn terminal(&self) -> Option<TerminalState> {
        match self {
            AttemptPhase::Solved => Some(TerminalState::Solved),
            AttemptPhase::SolutionRevealed => Some(TerminalState::SolutionRevealed),
            AttemptPhase::Abandoned => Some(TerminalState::Abandoned),
            AttemptPhase::Presented
            | AttemptPhase::AwaitingEvaluation
            | AttemptPhase::Evaluated { .. } => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.terminal().is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalState {
    Solved,
    SolutionRevealed,
    Abandoned,
}

/// Persisted outcome of a finished attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinalStatus {
    Mastered,
    Incomplete,
    Struggling,
}

impl FinalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinalStatus::Mastered => "mastered",
            FinalStatus::Incomplete => "incomplete",
            FinalStatus::Struggling => "struggling",
        }
    }
}

impl From<TerminalState> for FinalStatus {
    fn from(state: TerminalState) -> Self {
        match state {
            TerminalState::Solved => FinalStatus::Mastered,
            TerminalState::SolutionRevealed => FinalStatus::Struggling,
            TerminalState::Abandoned => FinalStatus::Incomplete,
        }
    }
}

/// Outer classification of a mastery-check attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MasteryOutcome {
    MasteryPassed,
    MasteryFailed,
    Skipped,
}

impl MasteryOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MasteryOutcome::MasteryPassed => "mastery_passed",
            MasteryOutcome::MasteryFailed => "mastery_failed",
            MasteryOutcome::Skipped => "skipped",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    #[serde(rename = "_id")]
    pub id: String,
    pub session_id: String,
    pub problem_id: String,
    pub is_mastery_check: bool,
    #[serde(default)]
    pub original_problem_id: Option<String>,
    #[serde(default)]
    pub original_attempt_id: Option<String>,
    #[serde(default)]
    pub learner_age: Option<u8>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub hint_count: u8,
    #[serde(default)]
    pub final_status: Option<FinalStatus>,
    #[serde(default)]
    pub mastery_outcome: Option<MasteryOutcome>,
    #[serde(default)]
    pub finalized_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub attempt_id: String,
    pub sequence: u32,
    #[serde(flatten)]
    pub turn: Turn,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttemptFinalization {
    pub final_status: FinalStatus,
    pub hint_count: u8,
    pub mastery_outcome: Option<MasteryOutcome>,
    pub finalized_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct StartAttemptRequest {
    #[validate(length(min = 1, max = 128))]
    pub session_id: String,
    #[validate(length(min = 1, max = 128))]
    pub problem_id: String,
    #[validate(range(min = 4, max = 18))]
    pub learner_age: Option<u8>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitAnswerRequest {
    pub answer: String,
}

/// Point-in-time view of an attempt as shown to the learner.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptView {
    pub attempt_id: Uuid,
    pub session_id: String,
    pub problem: ProblemSummary,
    pub phase: AttemptPhase,
    pub hint_count: u8,
    pub hints_remaining: u8,
    pub show_solution_button: bool,
    pub is_mastery_check: bool,
    pub original_problem_id: Option<String>,
    pub original_attempt_id: Option<Uuid>,
    pub mastery_attempt_id: Option<Uuid>,
    pub final_status: Option<FinalStatus>,
    pub mastery_outcome: Option<MasteryOutcome>,
    pub conversation: Vec<Turn>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MasteryOffer {
    pub attempt_id: Uuid,
    pub problem: ProblemSummary,
}

/// Result of one learner action, ready for rendering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnOutcome {
    pub attempt_id: Uuid,
    pub phase: AttemptPhase,
    pub tutor_turn: Option<Turn>,
    pub hint_count: u8,
    pub hints_remaining: u8,
    pub show_solution_button: bool,
    pub terminal: Option<TerminalState>,
    pub final_status: Option<FinalStatus>,
    pub mastery_check: Option<MasteryOffer>,
    pub mastery_outcome: Option<MasteryOutcome>,
}
