//! Error taxonomy of the tutoring orchestrator.
//!
//! Only `ProblemNotFound`, `AttemptNotFound`, `ConcurrentSubmission` and the
//! request-shape errors ever reach a caller. `MalformedEvaluation`,
//! `GenerationFailure` and `DiagnosticFailure` are recovered locally by the
//! component that raises them.

use uuid::Uuid;

pub type Result<T> = std::result::Result<T, TutorError>;

#[derive(Debug, thiserror::Error)]
pub enum TutorError {
    /// The evaluation response failed contract validation.
    #[error("Malformed evaluation: {0}")]
    MalformedEvaluation(String),

    /// The sibling problem for a mastery check could not be generated.
    #[error("Problem generation failed: {0}")]
    GenerationFailure(String),

    #[error("Problem not found: {0}")]
    ProblemNotFound(String),

    #[error("Attempt not found: {0}")]
    AttemptNotFound(Uuid),

    /// A submission is already in flight for this attempt.
    #[error("Attempt {0} already has a submission in flight")]
    ConcurrentSubmission(Uuid),

    #[error("Diagnostic failed: {0}")]
    DiagnosticFailure(String),

    #[error("Answer must not be empty")]
    EmptyAnswer,

    #[error("Attempt {0} is already closed")]
    AttemptClosed(Uuid),

    #[error("Solution is only available once the hint ceiling is reached")]
    SolutionNotOffered,

    #[error("Solution could not be produced: {0}")]
    SolutionUnavailable(String),

    #[error(transparent)]
    Upstream(#[from] anyhow::Error),
}
