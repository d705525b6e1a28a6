use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Misconception {
    Conceptual,
    Procedural,
    Arithmetic,
    ReadingComprehension,
    IncompleteKnowledge,
    CarelessError,
    None,
}

impl FromStr for Misconception {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "conceptual" => Ok(Misconception::Conceptual),
            "procedural" => Ok(Misconception::Procedural),
            "arithmetic" => Ok(Misconception::Arithmetic),
            "reading_comprehension" => Ok(Misconception::ReadingComprehension),
            "incomplete_knowledge" => Ok(Misconception::IncompleteKnowledge),
            "careless_error" => Ok(Misconception::CarelessError),
            "none" => Ok(Misconception::None),
            other => Err(format!("unknown misconception_type '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl FromStr for Confidence {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Confidence::Low),
            "medium" => Ok(Confidence::Medium),
            "high" => Ok(Confidence::High),
            other => Err(format!("unknown confidence '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub misconception: Misconception,
    pub confidence: Confidence,
    pub evidence: String,
    pub recommendations: Vec<String>,
    /// True when the report is the local default rather than a model result.
    pub degraded: bool,
}
