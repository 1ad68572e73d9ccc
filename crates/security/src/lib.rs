//! Guardrails for Touchline — independent pass/fail checks on user input
//! and assistant replies.
//!
//! Provides:
//! - **Checker**: runs an ordered predicate set with no short-circuit
//! - **Predicates**: length limit, topic relevance, disallowed content

pub mod checker;
pub mod predicates;

pub use checker::{GuardrailChecker, GuardrailPredicate, Verdict};
pub use predicates::{DisallowedContent, LengthLimit, TopicRelevance};
