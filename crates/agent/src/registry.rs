//! Agent Registry — the immutable roster, resolved by name at dispatch time.

use std::collections::HashMap;
use touchline_core::agent::AgentDefinition;
use touchline_core::error::{Error, Result};

use crate::routing::RoutingTable;

pub const TRIAGE: &str = "Triage";
pub const PREMIER_LEAGUE: &str = "Premier League";
pub const CHAMPIONSHIP: &str = "Championship";
pub const BOXING: &str = "Boxing";
pub const SPORTS_NEWS: &str = "Sports News";

const GUARDRAILS: [&str; 3] = ["length_limit", "topic_relevance", "disallowed_content"];

pub struct AgentRegistry {
    agents: Vec<AgentDefinition>,
    index: HashMap<String, usize>,
    default_agent: String,
}

impl AgentRegistry {
    /// Build a registry, checking that the default agent and every declared
    /// handoff target exist.
    pub fn new(agents: Vec<AgentDefinition>, default_agent: impl Into<String>) -> Result<Self> {
        let default_agent = default_agent.into();
        let mut index = HashMap::new();
        for (i, agent) in agents.iter().enumerate() {
            if index.insert(agent.name.clone(), i).is_some() {
                return Err(Error::Config {
                    message: format!("Duplicate agent '{}'", agent.name),
                });
            }
        }

        if !index.contains_key(&default_agent) {
            return Err(Error::Config {
                message: format!("Default agent '{default_agent}' is not registered"),
            });
        }
        for agent in &agents {
            if let Some(target) = agent.handoffs.iter().find(|t| !index.contains_key(*t)) {
                return Err(Error::Config {
                    message: format!("Agent '{}' declares unknown handoff '{target}'", agent.name),
                });
            }
        }

        Ok(Self {
            agents,
            index,
            default_agent,
        })
    }

    /// The five-agent sports roster with `Triage` as the default.
    pub fn sports() -> Result<Self> {
        Self::new(sports_roster(), TRIAGE)
    }

    /// Every routing target must be a registered agent.
    pub fn validate_routes(&self, routes: &RoutingTable) -> Result<()> {
        match routes.targets().find(|t| !self.index.contains_key(*t)) {
            Some(target) => Err(Error::Config {
                message: format!("Routing rule targets unknown agent '{target}'"),
            }),
            None => Ok(()),
        }
    }

    pub fn get(&self, name: &str) -> Option<&AgentDefinition> {
        self.index.get(name).map(|&i| &self.agents[i])
    }

    pub fn default_agent(&self) -> &str {
        &self.default_agent
    }

    pub fn is_default(&self, name: &str) -> bool {
        name == self.default_agent
    }

    /// All agents in registration order.
    pub fn list(&self) -> &[AgentDefinition] {
        &self.agents
    }

    /// Check a handoff against the source agent's declared targets.
    /// Handing back to the default agent is always allowed.
    pub fn check_handoff(&self, from: &str, to: &str) -> Result<()> {
        let unknown = || Error::UnknownAgent {
            from: from.to_string(),
            to: to.to_string(),
        };
        let source = self.get(from).ok_or_else(unknown)?;
        if self.get(to).is_none() {
            return Err(unknown());
        }
        if self.is_default(to) || source.declares_handoff(to) {
            Ok(())
        } else {
            Err(unknown())
        }
    }
}

fn sports_roster() -> Vec<AgentDefinition> {
    vec![
        AgentDefinition::new(
            TRIAGE,
            "Routes your questions to the right specialist",
            "You are a friendly UK sports triage agent. Work out what the user wants and route them \
             to the right specialist: Premier League, Championship, Boxing, or Sports News. \
             If you are unsure, ask a clarifying question rather than guessing.",
        )
        .with_handoffs([PREMIER_LEAGUE, CHAMPIONSHIP, BOXING, SPORTS_NEWS])
        .with_input_guardrails(GUARDRAILS),
        AgentDefinition::new(
            PREMIER_LEAGUE,
            "Premier League teams, players, fixtures, and standings",
            "You are a Premier League expert with comprehensive knowledge of all 20 clubs, their \
             players, history, and statistics. Use premier_league_lookup for reference facts. \
             Only say you lack information if you truly do not have it.",
        )
        .with_handoffs([CHAMPIONSHIP, SPORTS_NEWS])
        .with_tools(["premier_league_lookup"])
        .with_input_guardrails(GUARDRAILS),
        AgentDefinition::new(
            CHAMPIONSHIP,
            "England's second tier, promotion and relegation",
            "You are a Championship football expert with deep knowledge of England's second tier, \
             its promotion and relegation battles, and the playoff system. Use championship_lookup \
             for reference facts.",
        )
        .with_handoffs([PREMIER_LEAGUE, SPORTS_NEWS])
        .with_tools(["championship_lookup"])
        .with_input_guardrails(GUARDRAILS),
        AgentDefinition::new(
            BOXING,
            "Fighters, weight divisions, and British boxing",
            "You are a boxing expert covering current and former world champions, weight divisions \
             and title holders, fight history, and the British boxing scene. Use boxing_lookup for \
             reference facts. Only say you lack current information if you truly do not have it.",
        )
        .with_handoffs([SPORTS_NEWS])
        .with_tools(["boxing_lookup"])
        .with_input_guardrails(GUARDRAILS),
        AgentDefinition::new(
            SPORTS_NEWS,
            "Transfers and breaking developments",
            "You are a sports news expert focused on UK football transfers, boxing news, and \
             breaking developments. Use sports_news_lookup for headlines.",
        )
        .with_handoffs([PREMIER_LEAGUE, CHAMPIONSHIP, BOXING])
        .with_tools(["sports_news_lookup"])
        .with_input_guardrails(GUARDRAILS),
    ]
}
