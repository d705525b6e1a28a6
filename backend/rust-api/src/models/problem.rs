use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Complexity {
    Easy,
    Medium,
    Hard,
}

impl Complexity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Complexity::Easy => "easy",
            Complexity::Medium => "medium",
            Complexity::Hard => "hard",
        }
    }
}

impl fmt::Display for Complexity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Complexity {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Complexity::Easy),
            "medium" => Ok(Complexity::Medium),
            "hard" => Ok(Complexity::Hard),
            other => Err(format!("unknown complexity '{}'", other)),
        }
    }
}

/// A math problem. Canonical problems live in the repository; generated ones
/// only exist for the duration of a mastery check and carry their answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Problem {
    #[serde(rename = "_id")]
    pub id: String,
    pub grade_level: u8,
    pub chapter: String,
    pub sequence_number: u32,
    pub complexity: Complexity,
    #[serde(default)]
    pub requires_multi_step: bool,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
}

impl Problem {
    /// Builds the ephemeral sibling of `original` from a generator result.
    /// Classification metadata is inherited, the id is fresh.
    pub fn from_generated(original: &Problem, generated: GeneratedProblem) -> Self {
        Self {
            id: format!("{}-mastery-{}", original.id, Uuid::new_v4()),
            grade_level: original.grade_level,
            chapter: original.chapter.clone(),
            sequence_number: original.sequence_number,
            complexity: generated.complexity.unwrap_or(original.complexity),
            requires_multi_step: original.requires_multi_step,
            text: generated.text,
            expected_answer: Some(generated.expected_answer),
            explanation: Some(generated.explanation),
        }
    }

    pub fn summary(&self) -> ProblemSummary {
        ProblemSummary {
            id: self.id.clone(),
            grade_level: self.grade_level,
            chapter: self.chapter.clone(),
            sequence_number: self.sequence_number,
            complexity: self.complexity,
            requires_multi_step: self.requires_multi_step,
            text: self.text.clone(),
        }
    }
}

/// Learner-safe view of a problem: never carries the answer or explanation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProblemSummary {
    pub id: String,
    pub grade_level: u8,
    pub chapter: String,
    pub sequence_number: u32,
    pub complexity: Complexity,
    pub requires_multi_step: bool,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DifficultyAdjustment {
    Easier,
    Same,
    Harder,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedProblem {
    pub text: String,
    pub expected_answer: String,
    pub explanation: String,
    #[serde(default)]
    pub complexity: Option<Complexity>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProblemFilter {
    #[serde(default, alias = "grade")]
    pub grade_level: Option<u8>,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub complexity: Option<Complexity>,
}

impl ProblemFilter {
    pub fn matches(&self, problem: &Problem) -> bool {
        let grade_ok = self
            .grade_level
            .map_or(true, |grade| problem.grade_level == grade);
        let chapter_ok = self
            .chapter
            .as_deref()
            .map_or(true, |chapter| problem.chapter == chapter);
        let complexity_ok = self
            .complexity
            .map_or(true, |complexity| problem.complexity == complexity);

        grade_ok && chapter_ok && complexity_ok
    }
}
