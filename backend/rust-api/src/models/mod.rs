pub mod attempt;
pub mod conversation;
pub mod diagnostic;
pub mod problem;

pub use attempt::{
    AttemptFinalization, AttemptPhase, AttemptRecord, AttemptView, FinalStatus, MasteryOffer,
    MasteryOutcome, StartAttemptRequest, SubmitAnswerRequest, TerminalState, TurnOutcome,
    TurnRecord,
};
pub use conversation::{Badge, Conversation, ResponseType, Role, Turn};
pub use diagnostic::{Confidence, DiagnosticReport, Misconception};
pub use problem::{
    Complexity, DifficultyAdjustment, GeneratedProblem, Problem, ProblemFilter, ProblemSummary,
};
