//! Tools for Touchline specialists and the grounding engine.
//!
//! - [`SearchClient`]: cached, retrying web search over a [`SearchBackend`]
//! - [`LookupTool`]: static reference tables the specialists may consult

pub mod google_search;
pub mod retry;
pub mod search_client;
pub mod sports_lookup;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use google_search::{GoogleSearchBackend, SearchBackend};
pub use retry::RetryPolicy;
pub use search_client::{SearchClient, SearchOutcome};
pub use sports_lookup::LookupTool;

use touchline_core::tool::ToolRegistry;

/// Create a registry holding every specialist lookup tool.
///
/// Agents only see the subset their definition declares.
pub fn default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    registry.register(Box::new(LookupTool::premier_league()));
    registry.register(Box::new(LookupTool::championship()));
    registry.register(Box::new(LookupTool::boxing()));
    registry.register(Box::new(LookupTool::sports_news()));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_all_lookups() {
        let registry = default_registry();
        for name in [
            "premier_league_lookup",
            "championship_lookup",
            "boxing_lookup",
            "sports_news_lookup",
        ] {
            assert!(registry.get(name).is_some(), "missing {name}");
        }
    }
}
