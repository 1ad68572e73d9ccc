//! Grounding decision types.

use serde::{Deserialize, Serialize};

/// A single search result used in grounded synthesis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub snippet: String,
    pub link: String,
    /// Host the result came from (e.g. "www.bbc.co.uk")
    #[serde(default)]
    pub display_link: String,
}

/// Why the grounding engine did or did not search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "code", content = "detail")]
pub enum GroundingReason {
    /// The draft contained no knowledge-insufficiency admission.
    NoAdmission,
    /// Triage replies route; they never answer, so they are never grounded.
    TriageAgent,
    /// Search ran and the final reply carries sources.
    Grounded { admission: String },
    /// An admission was found but search failed or returned nothing.
    SearchUnavailable { admission: String },
}

impl GroundingReason {
    pub fn code(&self) -> &'static str {
        match self {
            GroundingReason::NoAdmission => "no_admission",
            GroundingReason::TriageAgent => "triage_agent",
            GroundingReason::Grounded { .. } => "grounded",
            GroundingReason::SearchUnavailable { .. } => "search_unavailable",
        }
    }
}

/// The outcome of the two-phase grounding check for one assistant turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroundingDecision {
    pub triggered: bool,
    pub reason: GroundingReason,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
    #[serde(default)]
    pub sources: Vec<Source>,
    /// Whether the search result came from cache
    #[serde(default)]
    pub cache_hit: bool,
}

impl GroundingDecision {
    pub fn skipped(reason: GroundingReason) -> Self {
        Self {
            triggered: false,
            reason,
            query: None,
            sources: Vec::new(),
            cache_hit: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_codes() {
        assert_eq!(GroundingReason::NoAdmission.code(), "no_admission");
        assert_eq!(
            GroundingReason::SearchUnavailable {
                admission: "i don't have information about".into()
            }
            .code(),
            "search_unavailable"
        );
    }

    #[test]
    fn skipped_decision_has_no_sources() {
        let d = GroundingDecision::skipped(GroundingReason::NoAdmission);
        assert!(!d.triggered);
        assert!(d.sources.is_empty());
        assert!(d.query.is_none());
    }
}
