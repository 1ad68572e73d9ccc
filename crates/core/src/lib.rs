//! # Touchline Core
//!
//! Domain types, traits, and error definitions for the Touchline sports
//! agent orchestrator. This crate does no I/O — it defines the domain model
//! that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every subsystem seam is a trait here ([`Provider`], [`Tool`],
//! [`SessionStore`]). Implementations live in their respective crates, and
//! tests substitute scripted fakes.

pub mod agent;
pub mod conversation;
pub mod error;
pub mod event;
pub mod grounding;
pub mod guardrail;
pub mod message;
pub mod provider;
pub mod session;
pub mod text;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use agent::AgentDefinition;
pub use conversation::{ContextSlots, Conversation, ConversationId, Turn, TurnRole, slots};
pub use error::{
    Error, ProviderError, Result, SearchError, SearchErrorKind, SessionError, ToolError,
};
pub use event::{Event, EventKind};
pub use grounding::{GroundingDecision, GroundingReason, Source};
pub use guardrail::{Direction, GuardrailCheck};
pub use message::{Message, MessageToolCall, Role};
pub use provider::{Provider, ProviderRequest, ProviderResponse, ToolDefinition, Usage};
pub use session::{SessionLease, SessionStore, with_lock};
pub use tool::{Tool, ToolRegistry, ToolResult};
