//! Agent definitions — the static roster the orchestrator dispatches over.

use serde::{Deserialize, Serialize};

/// An immutable agent definition.
///
/// Loaded once at startup into the registry and referenced by `name`
/// everywhere else (conversations store the name, never a copy).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentDefinition {
    /// Unique key
    pub name: String,

    pub description: String,

    /// System instructions sent to the language model
    #[serde(skip_serializing)]
    pub instructions: String,

    /// Agents this one may hand off to (the default agent is always allowed)
    pub handoffs: Vec<String>,

    /// Tools this agent may invoke
    pub tools: Vec<String>,

    /// Guardrails applied to input addressed to this agent
    #[serde(default)]
    pub input_guardrails: Vec<String>,
}

impl AgentDefinition {
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        instructions: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            instructions: instructions.into(),
            handoffs: Vec::new(),
            tools: Vec::new(),
            input_guardrails: Vec::new(),
        }
    }

    pub fn with_handoffs<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.handoffs = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_tools<I, S>(mut self, tools: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tools = tools.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_input_guardrails<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.input_guardrails = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn declares_handoff(&self, target: &str) -> bool {
        self.handoffs.iter().any(|h| h == target)
    }

    pub fn declares_tool(&self, tool: &str) -> bool {
        self.tools.iter().any(|t| t == tool)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_and_membership() {
        let agent = AgentDefinition::new("Boxing", "Boxing expert", "You know boxing.")
            .with_handoffs(["Sports News"])
            .with_tools(["boxing_lookup"]);
        assert!(agent.declares_handoff("Sports News"));
        assert!(!agent.declares_handoff("Premier League"));
        assert!(agent.declares_tool("boxing_lookup"));
    }

    #[test]
    fn instructions_are_not_serialized() {
        let agent = AgentDefinition::new("Triage", "Routes questions", "secret prompt");
        let json = serde_json::to_string(&agent).unwrap();
        assert!(json.contains("Routes questions"));
        assert!(!json.contains("secret prompt"));
    }
}
