//! Specialist runner — one agent drafting a reply with the language model.
//!
//! Per call:
//! 1. **Specialty check** (deterministic, before any model call)
//! 2. **Build the request**: instructions + known context + handoff protocol,
//!    the recent history window, and the new user text
//! 3. **Tool loop**: execute declared tools the model asks for, refuse the
//!    rest, and feed results back, up to `max_tool_rounds` rounds
//! 4. **Interpret** the reply: a `HANDOFF:` line means out of specialty
//!
//! Model failures never abort the turn; they become a degraded reply.

use std::sync::Arc;
use std::time::Duration;
use touchline_config::LlmConfig;
use touchline_core::agent::AgentDefinition;
use touchline_core::conversation::{Conversation, TurnRole, slots};
use touchline_core::error::ProviderError;
use touchline_core::event::{Event, EventKind};
use touchline_core::message::{Message, MessageToolCall};
use touchline_core::provider::{Provider, ProviderRequest, ProviderResponse};
use touchline_core::tool::ToolRegistry;
use tracing::{debug, info, warn};

use crate::routing::RoutingTable;

/// Prefix the model uses to decline a question outside its specialty.
pub const HANDOFF_PREFIX: &str = "HANDOFF:";

pub const BUSY_REPLY: &str =
    "I'm getting a lot of requests right now. Please try again in a moment.";
pub const UNAVAILABLE_REPLY: &str =
    "The sports assistant is unavailable right now because its language model is not configured.";
pub const APOLOGY_REPLY: &str =
    "I apologize, but I'm having trouble processing your request right now. Please try again.";

/// What a specialist produced for one user message.
#[derive(Debug, Clone)]
pub enum Draft {
    Reply(String),
    /// The question belongs to another agent.
    OutOfSpecialty { reason: String },
    /// The model call failed; `reply` is the user-facing degraded text.
    Degraded { reply: String, error: ProviderError },
}

impl Draft {
    fn from_error(error: ProviderError) -> Self {
        let reply = match &error {
            ProviderError::RateLimited { .. } => BUSY_REPLY,
            ProviderError::NotConfigured(_) => UNAVAILABLE_REPLY,
            _ => APOLOGY_REPLY,
        };
        Draft::Degraded {
            reply: reply.to_string(),
            error,
        }
    }
}

pub struct SpecialistRunner {
    provider: Arc<dyn Provider>,
    tools: Arc<ToolRegistry>,
    routes: Arc<RoutingTable>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    max_tool_rounds: usize,
    history_window: usize,
    timeout: Duration,
}

impl SpecialistRunner {
    pub fn new(
        provider: Arc<dyn Provider>,
        tools: Arc<ToolRegistry>,
        routes: Arc<RoutingTable>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            provider,
            tools,
            routes,
            model: model.into(),
            temperature: 0.7,
            max_tokens: None,
            max_tool_rounds: 2,
            history_window: 10,
            timeout: Duration::from_secs(30),
        }
    }

    /// Apply model, temperature, token, tool-round, and timeout settings.
    pub fn with_llm_config(mut self, config: &LlmConfig) -> Self {
        self.model = config.model.clone();
        self.temperature = config.temperature;
        self.max_tokens = Some(config.max_tokens);
        self.max_tool_rounds = config.max_tool_rounds;
        self.timeout = Duration::from_secs(config.timeout_secs);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_history_window(mut self, turns: usize) -> Self {
        self.history_window = turns;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    fn system_prompt(agent: &AgentDefinition, conversation: &Conversation) -> String {
        let mut prompt = agent.instructions.clone();
        if let Some(name) = conversation.context.get(slots::USER_NAME) {
            prompt.push_str(&format!("\n\nUser's name: {name}"));
        }
        if let Some(team) = conversation.context.get(slots::FAVORITE_TEAM) {
            prompt.push_str(&format!("\nUser's favorite team: {team}"));
        }
        if let Some(sport) = conversation.context.get(slots::FAVORITE_SPORT) {
            prompt.push_str(&format!("\nUser's favorite sport: {sport}"));
        }
        prompt.push_str(&format!(
            "\n\nIf the question is outside your specialty, reply with a single line starting \
             with \"{HANDOFF_PREFIX}\" followed by the reason, and nothing else."
        ));
        prompt
    }

    /// Recent turns as model messages. Leading assistant turns (such as the
    /// welcome) are dropped so the exchange opens with the user.
    fn history(&self, conversation: &Conversation) -> Vec<Message> {
        conversation
            .recent_turns(self.history_window)
            .iter()
            .skip_while(|t| t.role == TurnRole::Assistant)
            .map(|t| match t.role {
                TurnRole::User => Message::user(&t.text),
                TurnRole::Assistant => Message::assistant(&t.text),
            })
            .collect()
    }

    async fn call(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        match tokio::time::timeout(self.timeout, self.provider.complete(request)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::Timeout(format!(
                "no response within {}s",
                self.timeout.as_secs()
            ))),
        }
    }

    /// Run `agent` on `user_text`.
    ///
    /// `conversation` is the turn's working copy: its history must not yet
    /// contain `user_text`, and tool-called events are appended to it.
    pub async fn run(
        &self,
        agent: &AgentDefinition,
        conversation: &mut Conversation,
        user_text: &str,
    ) -> Draft {
        if let Some(reason) = self.routes.specialty_check(&agent.name, user_text) {
            debug!(agent = %agent.name, %reason, "Out of specialty before model call");
            return Draft::OutOfSpecialty { reason };
        }

        let mut messages = self.history(conversation);
        messages.push(Message::user(user_text));
        let definitions = self
            .tools
            .definitions_for(agent.tools.iter().map(String::as_str));
        let system = Self::system_prompt(agent, conversation);

        let mut round = 0;
        loop {
            let offer_tools = round < self.max_tool_rounds && !definitions.is_empty();
            let request = ProviderRequest {
                model: self.model.clone(),
                system: Some(system.clone()),
                messages: messages.clone(),
                temperature: self.temperature,
                max_tokens: self.max_tokens,
                tools: if offer_tools { definitions.clone() } else { Vec::new() },
            };

            let response = match self.call(request).await {
                Ok(r) => r,
                Err(e) => {
                    warn!(agent = %agent.name, error = %e, "Language model call failed");
                    return Draft::from_error(e);
                }
            };

            if response.message.tool_calls.is_empty() || !offer_tools {
                return Self::interpret(agent, response.message.content);
            }

            round += 1;
            debug!(
                agent = %agent.name,
                round,
                tool_count = response.message.tool_calls.len(),
                "Executing tool calls"
            );
            let calls = response.message.tool_calls.clone();
            messages.push(response.message);
            for call in &calls {
                let output = self.execute_tool(agent, conversation, call).await;
                messages.push(Message::tool_result(call, output));
            }
        }
    }

    async fn execute_tool(
        &self,
        agent: &AgentDefinition,
        conversation: &mut Conversation,
        call: &MessageToolCall,
    ) -> String {
        let arguments: serde_json::Value =
            serde_json::from_str(&call.arguments).unwrap_or_default();

        let (success, output) = if !agent.declares_tool(&call.name) {
            warn!(agent = %agent.name, tool = %call.name, "Refused undeclared tool");
            (
                false,
                format!("Tool '{}' is not available to the {} agent", call.name, agent.name),
            )
        } else {
            match self.tools.execute(&call.name, arguments.clone()).await {
                Ok(result) => (result.success, result.output),
                Err(e) => (false, format!("Error: {e}")),
            }
        };

        info!(agent = %agent.name, tool = %call.name, success, "Tool called");
        conversation.push_event(
            Event::new(EventKind::ToolCalled, &agent.name, format!("{}: {output}", call.name))
                .with_metadata(serde_json::json!({
                    "tool": call.name,
                    "arguments": arguments,
                    "success": success,
                })),
        );
        output
    }

    fn interpret(agent: &AgentDefinition, content: String) -> Draft {
        let trimmed = content.trim();
        if let Some(reason) = trimmed.strip_prefix(HANDOFF_PREFIX) {
            let reason = reason.trim();
            let reason = if reason.is_empty() {
                format!("{} declined the question", agent.name)
            } else {
                reason.to_string()
            };
            return Draft::OutOfSpecialty { reason };
        }
        if trimmed.is_empty() {
            return Draft::from_error(ProviderError::InvalidResponse("empty reply".into()));
        }
        Draft::Reply(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{AgentRegistry, BOXING};
    use crate::testing::{ScriptedProvider, make_text_response, make_tool_call, make_tool_call_response};
    use touchline_core::conversation::Turn;

    fn runner(provider: Arc<ScriptedProvider>) -> SpecialistRunner {
        SpecialistRunner::new(
            provider,
            Arc::new(touchline_tools::default_registry()),
            Arc::new(RoutingTable::sports()),
            "mock-model",
        )
    }

    fn boxing() -> AgentDefinition {
        AgentRegistry::sports().unwrap().get(BOXING).unwrap().clone()
    }

    #[tokio::test]
    async fn plain_reply() {
        let provider = Arc::new(ScriptedProvider::single_text("Tyson Fury is a heavyweight."));
        let mut conv = Conversation::new("Triage");
        let draft = runner(provider.clone()).run(&boxing(), &mut conv, "Who is Tyson Fury?").await;
        assert!(matches!(draft, Draft::Reply(ref t) if t.contains("heavyweight")));
        assert_eq!(provider.call_count(), 1);
    }

    #[tokio::test]
    async fn system_prompt_carries_context_and_protocol() {
        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        let mut conv = Conversation::new("Triage");
        conv.context.set(slots::FAVORITE_TEAM, "Arsenal");
        runner(provider.clone()).run(&boxing(), &mut conv, "Who is Usyk?").await;

        let request = provider.requests().remove(0);
        let system = request.system.unwrap();
        assert!(system.contains("User's favorite team: Arsenal"));
        assert!(system.contains(HANDOFF_PREFIX));
        assert_eq!(request.tools.len(), 1);
        assert_eq!(request.tools[0].name, "boxing_lookup");
    }

    #[tokio::test]
    async fn history_window_drops_leading_assistant_turns() {
        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        let mut conv = Conversation::new("Triage");
        conv.push_turn(Turn::assistant("Triage", "Welcome!"));
        conv.push_turn(Turn::user("Who is Fury?"));
        conv.push_turn(Turn::assistant(BOXING, "A heavyweight."));
        runner(provider.clone()).run(&boxing(), &mut conv, "And Usyk?").await;

        let messages = provider.requests().remove(0).messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[0].content, "Who is Fury?");
        assert_eq!(messages[2].content, "And Usyk?");
    }

    #[tokio::test]
    async fn declared_tool_runs_and_is_recorded() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call("boxing_lookup", serde_json::json!({"query": "fury"}))],
                "Looking up Fury",
            ),
            make_text_response("Fury is the Gypsy King."),
        ]));
        let mut conv = Conversation::new("Triage");
        let draft = runner(provider.clone()).run(&boxing(), &mut conv, "Tell me about Fury").await;

        assert!(matches!(draft, Draft::Reply(_)));
        assert_eq!(conv.events().len(), 1);
        let event = &conv.events()[0];
        assert_eq!(event.kind, EventKind::ToolCalled);
        assert_eq!(event.meta_str("tool"), Some("boxing_lookup"));
        assert!(event.content.contains("Gypsy King"));

        // Tool result was fed back to the model
        let second = &provider.requests()[1];
        assert!(second.messages.iter().any(|m| m.tool_name.as_deref() == Some("boxing_lookup")));
    }

    #[tokio::test]
    async fn undeclared_tool_is_refused() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            make_tool_call_response(
                vec![make_tool_call("premier_league_lookup", serde_json::json!({"query": "arsenal"}))],
                "",
            ),
            make_text_response("Sorry, boxing only."),
        ]));
        let mut conv = Conversation::new("Triage");
        runner(provider).run(&boxing(), &mut conv, "heavyweight rankings").await;

        let event = &conv.events()[0];
        assert_eq!(event.metadata.as_ref().unwrap()["success"], false);
        assert!(event.content.contains("not available"));
    }

    #[tokio::test]
    async fn tool_rounds_are_bounded() {
        let call = || make_tool_call("boxing_lookup", serde_json::json!({"query": "fury"}));
        let provider = Arc::new(ScriptedProvider::new(vec![
            make_tool_call_response(vec![call()], ""),
            make_tool_call_response(vec![call()], ""),
            make_text_response("Done."),
        ]));
        let mut conv = Conversation::new("Triage");
        let draft = runner(provider.clone()).run(&boxing(), &mut conv, "fury fury fury").await;

        assert!(matches!(draft, Draft::Reply(ref t) if t == "Done."));
        assert_eq!(provider.call_count(), 3);
        // The final round offers no tools
        assert!(provider.requests()[2].tools.is_empty());
    }

    #[tokio::test]
    async fn handoff_line_is_out_of_specialty() {
        let provider = Arc::new(ScriptedProvider::single_text("HANDOFF: this is about cricket"));
        let mut conv = Conversation::new("Triage");
        let draft = runner(provider).run(&boxing(), &mut conv, "Who won the ashes?").await;
        assert!(matches!(draft, Draft::OutOfSpecialty { ref reason } if reason.contains("cricket")));
    }

    #[tokio::test]
    async fn deterministic_check_skips_model() {
        let provider = Arc::new(ScriptedProvider::new(vec![]));
        let mut conv = Conversation::new("Triage");
        let draft = runner(provider.clone()).run(&boxing(), &mut conv, "How are Arsenal doing?").await;
        assert!(matches!(draft, Draft::OutOfSpecialty { .. }));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn failures_degrade_with_distinct_messages() {
        let cases = [
            (ProviderError::RateLimited { retry_after_secs: 5 }, BUSY_REPLY),
            (ProviderError::NotConfigured("no key".into()), UNAVAILABLE_REPLY),
            (ProviderError::Network("reset".into()), APOLOGY_REPLY),
        ];
        for (error, expected) in cases {
            let provider = Arc::new(ScriptedProvider::failing(error));
            let mut conv = Conversation::new("Triage");
            let draft = runner(provider).run(&boxing(), &mut conv, "Who is Usyk?").await;
            assert!(matches!(draft, Draft::Degraded { ref reply, .. } if reply == expected));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_model_times_out() {
        let provider = Arc::new(
            ScriptedProvider::single_text("too late").with_delay(Duration::from_secs(60)),
        );
        let mut conv = Conversation::new("Triage");
        let draft = runner(provider)
            .with_timeout(Duration::from_secs(5))
            .run(&boxing(), &mut conv, "Who is Usyk?")
            .await;
        assert!(matches!(
            draft,
            Draft::Degraded { error: ProviderError::Timeout(_), .. }
        ));
    }
}
