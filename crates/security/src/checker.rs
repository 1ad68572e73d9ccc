//! Guardrail Checker — runs every predicate, in order, on every check.
//!
//! There is no short-circuit: a caller always sees one result per
//! predicate, so the UI can show which checks passed as well as which
//! failed.

use touchline_config::GuardrailConfig;
use touchline_core::guardrail::{Direction, GuardrailCheck};
use tracing::debug;

use crate::predicates::{DisallowedContent, LengthLimit, TopicRelevance};

/// The outcome of one predicate on one text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub passed: bool,
    pub reasoning: String,
}

impl Verdict {
    pub fn pass(reasoning: impl Into<String>) -> Self {
        Self {
            passed: true,
            reasoning: reasoning.into(),
        }
    }

    pub fn fail(reasoning: impl Into<String>) -> Self {
        Self {
            passed: false,
            reasoning: reasoning.into(),
        }
    }
}

/// An independent pass/fail check.
///
/// Predicates must yield a verdict for both directions, even when they
/// only meaningfully inspect one.
pub trait GuardrailPredicate: Send + Sync {
    fn name(&self) -> &str;
    fn evaluate(&self, text: &str, direction: Direction) -> Verdict;
}

pub struct GuardrailChecker {
    predicates: Vec<Box<dyn GuardrailPredicate>>,
}

impl GuardrailChecker {
    pub fn new() -> Self {
        Self {
            predicates: Vec::new(),
        }
    }

    /// Length limit, topic relevance, and disallowed content, in that order.
    /// `extra_keywords` widens topic relevance (e.g. routing vocabulary).
    pub fn from_config<I, S>(config: &GuardrailConfig, extra_keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut relevance = TopicRelevance::new(config.domain_keywords.iter().cloned());
        relevance.extend(extra_keywords);

        Self::new()
            .with_predicate(LengthLimit::new(
                config.max_input_chars,
                config.max_output_chars,
            ))
            .with_predicate(relevance)
            .with_predicate(DisallowedContent::new(config.blocked_terms.iter().cloned()))
    }

    pub fn with_predicate(mut self, predicate: impl GuardrailPredicate + 'static) -> Self {
        self.predicates.push(Box::new(predicate));
        self
    }

    /// Predicate names in evaluation order.
    pub fn names(&self) -> Vec<String> {
        self.predicates.iter().map(|p| p.name().to_string()).collect()
    }

    /// Run every predicate on `text`. Always returns one check per predicate.
    pub fn check(&self, text: &str, direction: Direction) -> Vec<GuardrailCheck> {
        self.predicates
            .iter()
            .map(|p| {
                let verdict = p.evaluate(text, direction);
                debug!(guardrail = p.name(), %direction, passed = verdict.passed, "Guardrail evaluated");
                GuardrailCheck::new(p.name(), direction, text, verdict.passed, verdict.reasoning)
            })
            .collect()
    }
}

impl Default for GuardrailChecker {
    fn default() -> Self {
        Self::from_config(&GuardrailConfig::default(), Vec::<String>::new())
    }
}
