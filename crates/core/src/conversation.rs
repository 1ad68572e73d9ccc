//! Conversation aggregate — id, current agent, context slots, turns, events.
//!
//! History and events are append-only: the only way to remove an entry is to
//! drop the whole conversation (eviction or explicit delete in the store).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::event::Event;
use crate::grounding::GroundingDecision;

/// Unique identifier for a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(pub String);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for ConversationId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for ConversationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One visible utterance. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub text: String,
    /// Producing agent (assistant turns only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grounding: Option<GroundingDecision>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            agent: None,
            timestamp: Utc::now(),
            grounding: None,
        }
    }

    pub fn assistant(agent: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            text: text.into(),
            agent: Some(agent.into()),
            timestamp: Utc::now(),
            grounding: None,
        }
    }

    pub fn with_grounding(mut self, decision: GroundingDecision) -> Self {
        self.grounding = Some(decision);
        self
    }
}

/// Well-known context slot names.
pub mod slots {
    pub const USER_ID: &str = "user_id";
    pub const USER_NAME: &str = "user_name";
    pub const FAVORITE_TEAM: &str = "favorite_team";
    pub const FAVORITE_SPORT: &str = "favorite_sport";
    pub const LAST_QUERY_TYPE: &str = "last_query_type";

    pub const ALL: [&str; 5] = [USER_ID, USER_NAME, FAVORITE_TEAM, FAVORITE_SPORT, LAST_QUERY_TYPE];
}

/// Named context slots with optional values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContextSlots(BTreeMap<String, Option<String>>);

impl ContextSlots {
    /// All well-known slots present and empty, plus a fresh random user id.
    pub fn initial() -> Self {
        use rand::Rng;
        let mut map: BTreeMap<String, Option<String>> =
            slots::ALL.iter().map(|s| (s.to_string(), None)).collect();
        let user_id: u32 = rand::rng().random_range(10_000_000..100_000_000);
        map.insert(slots::USER_ID.into(), Some(user_id.to_string()));
        Self(map)
    }

    pub fn get(&self, slot: &str) -> Option<&str> {
        self.0.get(slot).and_then(|v| v.as_deref())
    }

    pub fn set(&mut self, slot: impl Into<String>, value: impl Into<String>) {
        self.0.insert(slot.into(), Some(value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, Option<&str>)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_deref()))
    }
}

/// A conversation owned by the session store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub created_at: DateTime<Utc>,
    pub last_active_at: DateTime<Utc>,
    current_agent: String,
    pub context: ContextSlots,
    history: Vec<Turn>,
    events: Vec<Event>,
}

impl Conversation {
    /// Create an empty conversation whose current agent is `default_agent`.
    pub fn new(default_agent: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: ConversationId::new(),
            created_at: now,
            last_active_at: now,
            current_agent: default_agent.into(),
            context: ContextSlots::initial(),
            history: Vec::new(),
            events: Vec::new(),
        }
    }

    pub fn current_agent(&self) -> &str {
        &self.current_agent
    }

    /// Set the current agent. Handoff validation is the orchestrator's job.
    pub fn set_current_agent(&mut self, agent: impl Into<String>) {
        self.current_agent = agent.into();
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn push_turn(&mut self, turn: Turn) {
        self.history.push(turn);
    }

    /// Append an event, nudging its timestamp forward if the clock has not
    /// advanced so the log stays strictly time-ordered.
    pub fn push_event(&mut self, mut event: Event) {
        if let Some(last) = self.events.last() {
            if event.timestamp <= last.timestamp {
                event.timestamp = last.timestamp + chrono::Duration::microseconds(1);
            }
        }
        self.events.push(event);
    }

    /// Mark activity now; used by idle eviction.
    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    /// Turns appended after the first `from` entries.
    pub fn turns_since(&self, from: usize) -> &[Turn] {
        self.history.get(from..).unwrap_or(&[])
    }

    /// The most recent `n` turns, oldest first.
    pub fn recent_turns(&self, n: usize) -> &[Turn] {
        let start = self.history.len().saturating_sub(n);
        &self.history[start..]
    }

    pub fn idle_for(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_active_at
    }
}
