//! Conversation events — the append-only log the UI polls each turn.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    AgentSelected,
    Handoff,
    ToolCalled,
    GuardrailResult,
    GroundingTriggered,
    GroundingSkipped,
}

/// A single entry in a conversation's event log. Immutable once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,

    #[serde(rename = "type")]
    pub kind: EventKind,

    /// Agent the event is attributed to
    pub agent: String,

    pub content: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,
}

impl Event {
    pub fn new(kind: EventKind, agent: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().simple().to_string(),
            kind,
            agent: agent.into(),
            content: content.into(),
            metadata: None,
            timestamp: Utc::now(),
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Metadata string field, if present.
    pub fn meta_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}
