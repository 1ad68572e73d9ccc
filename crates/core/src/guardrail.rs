//! Guardrail result types shared by the checker and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which side of the turn a guardrail inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Input,
    Output,
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Input => f.write_str("input"),
            Direction::Output => f.write_str("output"),
        }
    }
}

/// The outcome of one guardrail predicate. Recorded whether it passed or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailCheck {
    pub id: String,
    pub name: String,
    pub direction: Direction,
    /// The text that was inspected (truncated for display)
    pub input: String,
    pub passed: bool,
    pub reasoning: String,
    pub timestamp: DateTime<Utc>,
}

impl GuardrailCheck {
    pub fn new(
        name: impl Into<String>,
        direction: Direction,
        input: &str,
        passed: bool,
        reasoning: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            name: name.into(),
            direction,
            input: input.chars().take(200).collect(),
            passed,
            reasoning: reasoning.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Whether every check in a set passed.
pub fn all_passed(checks: &[GuardrailCheck]) -> bool {
    checks.iter().all(|c| c.passed)
}

/// Names of the failing checks, comma separated.
pub fn failing_names(checks: &[GuardrailCheck]) -> String {
    checks
        .iter()
        .filter(|c| !c.passed)
        .map(|c| c.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
