use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Learner,
    Tutor,
}

/// Display-only classification of a tutor turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Badge {
    PartialProgress,
    HintGiven,
    CorrectiveFeedback,
}

impl Badge {
    pub fn as_str(&self) -> &'static str {
        match self {
            Badge::PartialProgress => "partial_progress",
            Badge::HintGiven => "hint_given",
            Badge::CorrectiveFeedback => "corrective_feedback",
        }
    }
}

impl FromStr for Badge {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "partial_progress" => Ok(Badge::PartialProgress),
            "hint_given" => Ok(Badge::HintGiven),
            "corrective_feedback" => Ok(Badge::CorrectiveFeedback),
            other => Err(format!("unknown badge_type '{}'", other)),
        }
    }
}

/// Classification of a learner answer. This is the transition key of the
/// attempt state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    CorrectFinal,
    PartialProgress,
    ArithmeticError,
    ConceptualError,
    NeedsHint,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::CorrectFinal => "correct_final",
            ResponseType::PartialProgress => "partial_progress",
            ResponseType::ArithmeticError => "arithmetic_error",
            ResponseType::ConceptualError => "conceptual_error",
            ResponseType::NeedsHint => "needs_hint",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ResponseType::CorrectFinal)
    }

    pub fn consumes_hint(&self) -> bool {
        matches!(self, ResponseType::NeedsHint)
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "correct_final" => Ok(ResponseType::CorrectFinal),
            "partial_progress" => Ok(ResponseType::PartialProgress),
            "arithmetic_error" => Ok(ResponseType::ArithmeticError),
            "conceptual_error" => Ok(ResponseType::ConceptualError),
            "needs_hint" => Ok(ResponseType::NeedsHint),
            other => Err(format!("unknown response_type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub badge: Option<Badge>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,
}

impl Turn {
    pub fn learner(text: impl Into<String>) -> Self {
        Self {
            role: Role::Learner,
            text: text.into(),
            timestamp: Utc::now(),
            badge: None,
            response_type: None,
        }
    }

    pub fn tutor(
        text: impl Into<String>,
        response_type: Option<ResponseType>,
        badge: Option<Badge>,
    ) -> Self {
        Self {
            role: Role::Tutor,
            text: text.into(),
            timestamp: Utc::now(),
            badge,
            response_type,
        }
    }
}

/// Ordered, append-only turn history of one attempt.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a turn and returns its zero-based sequence number.
    pub fn push(&mut self, turn: Turn) -> u32 {
        self.turns.push(turn);
        (self.turns.len() - 1) as u32
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn learner_answers(&self) -> Vec<String> {
        self.turns
            .iter()
            .filter(|turn| turn.role == Role::Learner)
            .map(|turn| turn.text.clone())
            .collect()
    }
}
