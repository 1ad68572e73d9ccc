//! Built-in guardrail predicates.

use touchline_core::guardrail::Direction;
use touchline_core::text::{contains_phrase, first_match, normalize};

use crate::checker::{GuardrailPredicate, Verdict};

/// Rejects text longer than a per-direction character budget.
#[derive(Debug, Clone)]
pub struct LengthLimit {
    max_input_chars: usize,
    max_output_chars: usize,
}

impl LengthLimit {
    pub fn new(max_input_chars: usize, max_output_chars: usize) -> Self {
        Self {
            max_input_chars,
            max_output_chars,
        }
    }
}

impl GuardrailPredicate for LengthLimit {
    fn name(&self) -> &str {
        "length_limit"
    }

    fn evaluate(&self, text: &str, direction: Direction) -> Verdict {
        let limit = match direction {
            Direction::Input => self.max_input_chars,
            Direction::Output => self.max_output_chars,
        };
        let len = text.chars().count();
        if len > limit {
            Verdict::fail(format!("{len} characters exceeds the {direction} limit of {limit}"))
        } else {
            Verdict::pass(format!("{len} of {limit} characters"))
        }
    }
}

/// Phrases that are always on-topic for a chat assistant: greetings,
/// introductions, thanks, and routing requests.
const CONVERSATIONAL: &[&str] = &[
    "hi", "hello", "hey", "thanks", "thank you", "cheers", "my name is", "i support",
    "my favourite team", "my favorite team", "my favourite sport", "my favorite sport",
    "back to triage", "talk to someone else", "different topic", "something else", "help",
];

/// Messages with at most this many words are treated as follow-ups and
/// pass relevance on their own.
const FOLLOW_UP_WORDS: usize = 8;

/// Requires user input to be about the system's sports domain.
#[derive(Debug, Clone)]
pub struct TopicRelevance {
    keywords: Vec<String>,
}

impl TopicRelevance {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keywords: keywords.into_iter().map(Into::into).collect(),
        }
    }

    pub fn extend<I, S>(&mut self, keywords: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords.extend(keywords.into_iter().map(Into::into));
    }
}

impl GuardrailPredicate for TopicRelevance {
    fn name(&self) -> &str {
        "topic_relevance"
    }

    fn evaluate(&self, text: &str, direction: Direction) -> Verdict {
        if direction == Direction::Output {
            return Verdict::pass("Replies are scoped by the active agent's instructions");
        }

        let normalized = normalize(text);
        if let Some(keyword) = first_match(&normalized, self.keywords.iter().map(String::as_str)) {
            return Verdict::pass(format!("Mentions \"{keyword}\""));
        }
        if let Some(phrase) = first_match(&normalized, CONVERSATIONAL.iter().copied()) {
            return Verdict::pass(format!("Conversational message (\"{phrase}\")"));
        }
        let words = normalized.split(' ').filter(|w| !w.is_empty()).count();
        if words <= FOLLOW_UP_WORDS {
            return Verdict::pass("Short follow-up message");
        }
        Verdict::fail("Message does not appear to be about football or boxing")
    }
}

/// Blocks configured terms in either direction, and leaked Google API keys
/// in replies.
#[derive(Debug, Clone)]
pub struct DisallowedContent {
    blocked_terms: Vec<String>,
}

impl DisallowedContent {
    pub fn new<I, S>(blocked_terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            blocked_terms: blocked_terms.into_iter().map(Into::into).collect(),
        }
    }
}

/// Google API keys are 39 characters starting with "AIza".
fn looks_like_api_key(text: &str) -> bool {
    text.split(|c: char| !(c.is_ascii_alphanumeric() || c == '-' || c == '_'))
        .any(|token| token.starts_with("AIza") && token.len() >= 35)
}

impl GuardrailPredicate for DisallowedContent {
    fn name(&self) -> &str {
        "disallowed_content"
    }

    fn evaluate(&self, text: &str, direction: Direction) -> Verdict {
        let normalized = normalize(text);
        if let Some(term) = self
            .blocked_terms
            .iter()
            .find(|t| contains_phrase(&normalized, t))
        {
            return Verdict::fail(format!("Contains blocked term \"{term}\""));
        }
        if direction == Direction::Output && looks_like_api_key(text) {
            return Verdict::fail("Reply appears to contain a credential");
        }
        Verdict::pass("No disallowed content")
    }
}
