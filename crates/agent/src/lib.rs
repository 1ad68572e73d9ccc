//! The agent layer — roster, routing, specialist drafting, grounding, and
//! the orchestrator that ties one conversational turn together.
//!
//! A user message flows through the [`Orchestrator`]:
//!
//! 1. **Guard** the input with every configured predicate
//! 2. **Route** from `Triage` to a specialist via the [`RoutingTable`]
//! 3. **Draft** a reply with the [`SpecialistRunner`] (model + lookup tools)
//! 4. **Ground** drafts that admit missing knowledge with web search
//! 5. **Guard** the output and commit the turn to the session store

pub mod grounding;
pub mod orchestrator;
pub mod profile;
pub mod registry;
pub mod routing;
pub mod specialist;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use grounding::{GroundingEngine, GroundingOutcome, GroundingRequest};
pub use orchestrator::{MAX_MESSAGE_CHARS, Orchestrator, TurnOutcome};
pub use registry::AgentRegistry;
pub use routing::{Route, RoutingRule, RoutingTable};
pub use specialist::{Draft, SpecialistRunner};
