//! Routing rule table — ordered `phrases -> agent` rules, first match wins.
//!
//! Matching is on normalized text with whole-word boundaries, so "fight"
//! never matches inside "firefighter" and "aj" never matches "major".

use touchline_core::text::{first_match, normalize};

use crate::registry::{BOXING, CHAMPIONSHIP, PREMIER_LEAGUE, SPORTS_NEWS};

/// Phrases that ask a specialist to hand the conversation back.
pub const RETURN_TO_TRIAGE: &[&str] = &[
    "back to triage",
    "talk to someone else",
    "different topic",
    "something else",
];

#[derive(Debug, Clone)]
pub struct RoutingRule {
    pub target: String,
    pub phrases: Vec<String>,
}

impl RoutingRule {
    pub fn new<I, S>(target: impl Into<String>, phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            target: target.into(),
            phrases: phrases.into_iter().map(Into::into).collect(),
        }
    }

    fn first_match<'a>(&'a self, normalized: &str) -> Option<&'a str> {
        first_match(normalized, self.phrases.iter().map(String::as_str))
    }
}

/// A routing decision with the phrase that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Route<'a> {
    pub target: &'a str,
    pub phrase: &'a str,
}

#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    rules: Vec<RoutingRule>,
}

impl RoutingTable {
    pub fn new(rules: Vec<RoutingRule>) -> Self {
        Self { rules }
    }

    pub fn sports() -> Self {
        Self::new(vec![
            RoutingRule::new(
                PREMIER_LEAGUE,
                [
                    "premier league", "arsenal", "chelsea", "manchester", "man city", "man utd",
                    "liverpool", "tottenham", "spurs", "aston villa", "newcastle", "haaland",
                    "salah",
                ],
            ),
            RoutingRule::new(
                CHAMPIONSHIP,
                [
                    "championship", "leicester", "leeds", "norwich", "southampton", "ipswich",
                    "west brom", "sunderland", "promotion", "relegation", "playoff",
                ],
            ),
            RoutingRule::new(
                BOXING,
                [
                    "boxing", "boxer", "fury", "joshua", "usyk", "heavyweight", "welterweight",
                    "middleweight", "fight", "bout", "knockout",
                ],
            ),
            RoutingRule::new(
                SPORTS_NEWS,
                ["transfer", "signing", "news", "rumour", "rumor", "breaking"],
            ),
        ])
    }

    /// The first rule matching `text`.
    pub fn route(&self, text: &str) -> Option<Route<'_>> {
        self.route_excluding(text, None)
    }

    /// Like [`route`](Self::route) but never selects `exclude`.
    pub fn route_excluding(&self, text: &str, exclude: Option<&str>) -> Option<Route<'_>> {
        let normalized = normalize(text);
        self.rules
            .iter()
            .filter(|r| Some(r.target.as_str()) != exclude)
            .find_map(|r| {
                r.first_match(&normalized).map(|phrase| Route {
                    target: r.target.as_str(),
                    phrase,
                })
            })
    }

    /// Whether any of `agent`'s own rules match `text`.
    pub fn matches_agent(&self, agent: &str, text: &str) -> bool {
        let normalized = normalize(text);
        self.rules
            .iter()
            .filter(|r| r.target == agent)
            .any(|r| r.first_match(&normalized).is_some())
    }

    /// Why `text` falls outside `agent`'s specialty, if it does: an explicit
    /// request to go back to triage, or a message that matches another
    /// specialist's rules and none of this agent's.
    pub fn specialty_check(&self, agent: &str, text: &str) -> Option<String> {
        let normalized = normalize(text);
        if let Some(phrase) = first_match(&normalized, RETURN_TO_TRIAGE.iter().copied()) {
            return Some(format!("User asked to move on (\"{phrase}\")"));
        }
        if self.matches_agent(agent, text) {
            return None;
        }
        self.route_excluding(text, Some(agent))
            .map(|r| format!("\"{}\" is a {} question", r.phrase, r.target))
    }

    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.rules.iter().map(|r| r.target.as_str())
    }

    /// Every phrase across all rules.
    pub fn keywords(&self) -> impl Iterator<Item = &str> {
        self.rules
            .iter()
            .flat_map(|r| r.phrases.iter().map(String::as_str))
    }
}
