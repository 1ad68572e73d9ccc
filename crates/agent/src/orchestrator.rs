//! Orchestrator — drives one conversational turn end to end.
//!
//! A turn runs entirely on a working copy of the conversation taken under
//! the conversation's lease:
//!
//! 1. **Input guardrails**: every predicate recorded; a failure appends a
//!    refusal and ends the turn
//! 2. **Triage**: from the default agent, the routing table picks a
//!    specialist or the default agent asks a clarifying question
//! 3. **Draft**: the specialist runner answers, possibly via tools
//! 4. **Redirect**: an out-of-specialty draft hands back to triage and
//!    reselects once
//! 5. **Grounding** of the draft
//! 6. **Output guardrails**: a failure swaps in a safe fallback
//! 7. **Commit** turns, events, context, and current agent atomically
//!
//! Dropping the lease before step 7 (an error, or the caller going away)
//! leaves the stored conversation untouched.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use touchline_config::AppConfig;
use touchline_core::conversation::{ContextSlots, Conversation, ConversationId, Turn, slots};
use touchline_core::error::{Error, ProviderError, Result};
use touchline_core::event::{Event, EventKind};
use touchline_core::grounding::GroundingDecision;
use touchline_core::guardrail::{Direction, GuardrailCheck, all_passed, failing_names};
use touchline_core::provider::Provider;
use touchline_core::session::SessionStore;
use touchline_security::GuardrailChecker;
use touchline_tools::SearchClient;
use tracing::{error, info, warn};

use crate::grounding::{GroundingEngine, GroundingRequest};
use crate::profile;
use crate::registry::AgentRegistry;
use crate::routing::RoutingTable;
use crate::specialist::{APOLOGY_REPLY, BUSY_REPLY, Draft, SpecialistRunner};

/// Hard cap on message length; longer input is a validation error rather
/// than a recorded guardrail refusal.
pub const MAX_MESSAGE_CHARS: usize = 4000;

pub const OUTPUT_FALLBACK: &str =
    "Sorry, I can't share that reply. Please ask me something else about football or boxing.";
const ROUTING_FAILURE: &str =
    "Sorry, something went wrong while routing your question. Please try again.";

/// Everything a caller needs to render one `handle_turn` call.
#[derive(Debug, Clone, Serialize)]
pub struct TurnOutcome {
    pub conversation_id: ConversationId,
    pub current_agent: String,
    pub context: ContextSlots,
    /// Assistant turns produced by this call (the welcome turn on creation)
    pub messages: Vec<Turn>,
    /// Events appended by this call
    pub events: Vec<Event>,
    /// Guardrail checks run by this call, input first
    pub guardrails: Vec<GuardrailCheck>,
    /// Set when the turn was not committed; the message is not stored
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TurnOutcome {
    fn since(
        conversation: &Conversation,
        turns: usize,
        events: usize,
        guardrails: Vec<GuardrailCheck>,
    ) -> Self {
        Self {
            conversation_id: conversation.id.clone(),
            current_agent: conversation.current_agent().to_string(),
            context: conversation.context.clone(),
            messages: conversation
                .turns_since(turns)
                .iter()
                .filter(|t| t.agent.is_some())
                .cloned()
                .collect(),
            events: conversation.events().get(events..).unwrap_or(&[]).to_vec(),
            guardrails,
            error: None,
        }
    }

    /// The final assistant reply of this call.
    pub fn reply(&self) -> Option<&str> {
        self.messages.last().map(|t| t.text.as_str())
    }

    pub fn grounding(&self) -> Option<&GroundingDecision> {
        self.messages.last().and_then(|t| t.grounding.as_ref())
    }
}

pub struct Orchestrator {
    registry: Arc<AgentRegistry>,
    routes: Arc<RoutingTable>,
    runner: SpecialistRunner,
    grounding: GroundingEngine,
    guardrails: GuardrailChecker,
    store: Arc<dyn SessionStore>,
    max_message_chars: usize,
}

impl Orchestrator {
    pub fn new(
        registry: Arc<AgentRegistry>,
        routes: Arc<RoutingTable>,
        runner: SpecialistRunner,
        grounding: GroundingEngine,
        guardrails: GuardrailChecker,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        registry.validate_routes(&routes)?;
        Ok(Self {
            registry,
            routes,
            runner,
            grounding,
            guardrails,
            store,
            max_message_chars: MAX_MESSAGE_CHARS,
        })
    }

    /// The sports roster, routing table, lookup tools, and guardrails built
    /// from `config`.
    pub fn from_config(
        config: &AppConfig,
        provider: Arc<dyn Provider>,
        search: Arc<SearchClient>,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self> {
        let registry = Arc::new(AgentRegistry::sports()?);
        let routes = Arc::new(RoutingTable::sports());
        let tools = Arc::new(touchline_tools::default_registry());
        let runner = SpecialistRunner::new(provider, tools, routes.clone(), config.llm.model.clone())
            .with_llm_config(&config.llm);
        let grounding = GroundingEngine::new(search, registry.default_agent());
        let guardrails = GuardrailChecker::from_config(&config.guardrails, routes.keywords());
        Self::new(registry, routes, runner, grounding, guardrails, store)
    }

    pub fn with_max_message_chars(mut self, max: usize) -> Self {
        self.max_message_chars = max;
        self
    }

    pub fn registry(&self) -> &AgentRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn search_client(&self) -> &SearchClient {
        self.grounding.search_client()
    }

    pub fn provider_name(&self) -> &str {
        self.runner.provider_name()
    }

    pub async fn conversation(&self, id: &ConversationId) -> Result<Option<Conversation>> {
        Ok(self.store.get(id).await?)
    }

    pub async fn delete(&self, id: &ConversationId) -> Result<bool> {
        Ok(self.store.delete(id).await?)
    }

    pub async fn evict_idle(&self, retention: Duration) -> Result<usize> {
        Ok(self.store.evict_idle(retention).await?)
    }

    /// A fresh conversation on the default agent with its welcome turn.
    fn new_conversation(&self) -> Conversation {
        let default = self.registry.default_agent();
        let mut conversation = Conversation::new(default);
        let specialists = self.specialist_names().join(", ");
        conversation.push_turn(Turn::assistant(
            default,
            format!(
                "Welcome to Touchline! I can put you in touch with our specialists: {specialists}. \
                 What would you like to talk about?"
            ),
        ));
        conversation.push_event(Event::new(
            EventKind::AgentSelected,
            default,
            format!("{default} selected for new conversation"),
        ));
        conversation
    }

    fn specialist_names(&self) -> Vec<&str> {
        self.registry
            .list()
            .iter()
            .map(|a| a.name.as_str())
            .filter(|n| !self.registry.is_default(n))
            .collect()
    }

    fn clarifying_question(&self, conversation: &Conversation) -> String {
        let topics = self.specialist_names().join(", ");
        match conversation.context.get(slots::USER_NAME) {
            Some(name) => format!("Thanks, {name}! Which would you like to talk about: {topics}?"),
            None => format!("Which would you like to talk about: {topics}?"),
        }
    }

    fn validate(&self, text: &str) -> Result<()> {
        if text.is_empty() {
            return Err(Error::Validation("Please enter a message.".into()));
        }
        let len = text.chars().count();
        if len > self.max_message_chars {
            return Err(Error::Validation(format!(
                "That message is too long ({len} characters, the maximum is {}).",
                self.max_message_chars
            )));
        }
        Ok(())
    }

    /// Process one user message.
    ///
    /// With no `id`, a conversation is created; an empty `text` then returns
    /// its initial state without producing a user turn. Fails with
    /// `UnknownConversation` when `id` does not exist.
    pub async fn handle_turn(&self, id: Option<&ConversationId>, text: &str) -> Result<TurnOutcome> {
        let text = text.trim();
        let (lease, created) = match id {
            Some(id) => {
                let lease = self
                    .store
                    .lock(id)
                    .await?
                    .ok_or_else(|| Error::UnknownConversation(id.to_string()))?;
                (lease, false)
            }
            None => {
                if !text.is_empty() {
                    self.validate(text)?;
                }
                let conversation = self.new_conversation();
                let id = self.store.create(conversation).await?;
                info!(conversation_id = %id, "Conversation started");
                let lease = self.store.lock(&id).await?.ok_or_else(|| {
                    Error::Internal(format!("conversation {id} vanished after create"))
                })?;
                if text.is_empty() {
                    return Ok(TurnOutcome::since(lease.current(), 0, 0, Vec::new()));
                }
                (lease, true)
            }
        };

        self.validate(text)?;

        let mut working = lease.snapshot();
        let (turns_before, events_before) = if created {
            (0, 0)
        } else {
            (working.history().len(), working.events().len())
        };

        let guardrails = self.run_turn(&mut working, text).await?;
        let outcome = TurnOutcome::since(&working, turns_before, events_before, guardrails);
        self.store.commit(lease, working).await?;
        Ok(outcome)
    }

    /// [`handle_turn`](Self::handle_turn), with every error that is not a
    /// server fault turned into a well-formed outcome for the conversation.
    pub async fn chat(&self, id: Option<&ConversationId>, text: &str) -> Result<TurnOutcome> {
        match self.handle_turn(id, text).await {
            Err(e) if !e.is_server_fault() => self.recover(id, e).await,
            other => other,
        }
    }

    async fn recover(&self, id: Option<&ConversationId>, err: Error) -> Result<TurnOutcome> {
        let conversation = match id {
            Some(id) => self
                .store
                .get(id)
                .await?
                .ok_or_else(|| Error::UnknownConversation(id.to_string()))?,
            None => {
                let conversation = self.new_conversation();
                self.store.create(conversation.clone()).await?;
                conversation
            }
        };

        let notice = match &err {
            Error::Validation(message) => message.clone(),
            Error::RateLimited(_) | Error::Upstream(ProviderError::RateLimited { .. }) => {
                BUSY_REPLY.to_string()
            }
            Error::UnknownAgent { .. } => ROUTING_FAILURE.to_string(),
            _ => APOLOGY_REPLY.to_string(),
        };
        warn!(conversation_id = %conversation.id, error = %err, "Turn not committed");

        // A conversation created here reports its welcome turn as well
        let (turns, events) = match id {
            Some(_) => (conversation.history().len(), conversation.events().len()),
            None => (0, 0),
        };
        let mut outcome = TurnOutcome::since(&conversation, turns, events, Vec::new());
        outcome
            .messages
            .push(Turn::assistant(conversation.current_agent(), notice));
        outcome.error = Some(err.to_string());
        Ok(outcome)
    }

    fn record_guardrails(conversation: &mut Conversation, checks: &[GuardrailCheck]) {
        let agent = conversation.current_agent().to_string();
        for check in checks {
            let status = if check.passed { "passed" } else { "failed" };
            conversation.push_event(
                Event::new(
                    EventKind::GuardrailResult,
                    &agent,
                    format!("{} {status} ({}): {}", check.name, check.direction, check.reasoning),
                )
                .with_metadata(serde_json::json!({
                    "guardrail": check.name,
                    "direction": check.direction,
                    "passed": check.passed,
                })),
            );
        }
    }

    fn refusal(&self, checks: &[GuardrailCheck]) -> String {
        if checks.iter().any(|c| !c.passed && c.name == "length_limit") {
            return "That message is a bit long for me. Could you shorten your question?".into();
        }
        format!(
            "Sorry, I can't help with that. I can answer questions about the {}.",
            self.specialist_names().join(", ")
        )
    }

    fn handoff(&self, conversation: &mut Conversation, to: &str, reason: &str) -> Result<()> {
        let from = conversation.current_agent().to_string();
        if let Err(e) = self.registry.check_handoff(&from, to) {
            error!(conversation_id = %conversation.id, %from, %to, "Rejected handoff to undeclared target");
            return Err(e);
        }
        info!(conversation_id = %conversation.id, %from, %to, %reason, "Handoff");
        conversation.set_current_agent(to);
        conversation.push_event(
            Event::new(EventKind::Handoff, &from, format!("{from} -> {to}: {reason}"))
                .with_metadata(serde_json::json!({ "from": from, "to": to, "reason": reason })),
        );
        Ok(())
    }

    /// Steps 1-6 on the working copy. Returns the guardrail checks run.
    async fn run_turn(&self, working: &mut Conversation, text: &str) -> Result<Vec<GuardrailCheck>> {
        let mut checks = self.guardrails.check(text, Direction::Input);
        Self::record_guardrails(working, &checks);
        if !all_passed(&checks) {
            warn!(
                conversation_id = %working.id,
                failed = %failing_names(&checks),
                "Input blocked by guardrails"
            );
            let agent = working.current_agent().to_string();
            working.push_turn(Turn::user(text));
            working.push_turn(Turn::assistant(agent, self.refusal(&checks)));
            return Ok(checks);
        }

        profile::apply_message(&mut working.context, text);

        let default = self.registry.default_agent().to_string();
        if working.current_agent() == default {
            if let Some(route) = self.routes.route(text) {
                let reason = format!("matched \"{}\"", route.phrase);
                self.handoff(working, route.target, &reason)?;
            }
        }

        let draft = self.draft(working, text, &default).await?;

        let agent = working.current_agent().to_string();
        let grounded = self
            .grounding
            .ground(GroundingRequest {
                agent: &agent,
                draft: &draft,
                user_text: text,
                context: &working.context,
            })
            .await;
        for event in grounded.events {
            working.push_event(event);
        }

        let output_checks = self.guardrails.check(&grounded.reply, Direction::Output);
        Self::record_guardrails(working, &output_checks);
        let reply = if all_passed(&output_checks) {
            grounded.reply
        } else {
            warn!(
                conversation_id = %working.id,
                failed = %failing_names(&output_checks),
                "Reply replaced by fallback"
            );
            OUTPUT_FALLBACK.to_string()
        };
        checks.extend(output_checks);

        profile::record_agent(&mut working.context, &agent);
        working.push_turn(Turn::user(text));
        working.push_turn(Turn::assistant(&agent, reply).with_grounding(grounded.decision));
        Ok(checks)
    }

    /// Draft a reply from the current agent, redirecting through triage at
    /// most once.
    async fn draft(&self, working: &mut Conversation, text: &str, default: &str) -> Result<String> {
        let mut redirected = false;
        loop {
            let current = working.current_agent().to_string();
            if current == default {
                return Ok(self.clarifying_question(working));
            }
            let agent = self
                .registry
                .get(&current)
                .ok_or_else(|| Error::Internal(format!("current agent '{current}' is not registered")))?;

            match self.runner.run(agent, working, text).await {
                Draft::Reply(reply) => return Ok(reply),
                Draft::Degraded { reply, error } => {
                    warn!(conversation_id = %working.id, agent = %current, %error, "Degraded reply");
                    return Ok(reply);
                }
                Draft::OutOfSpecialty { reason } if redirected => {
                    info!(conversation_id = %working.id, agent = %current, %reason, "Second redirect refused");
                    self.handoff(working, default, &reason)?;
                    return Ok(self.clarifying_question(working));
                }
                Draft::OutOfSpecialty { reason } => {
                    redirected = true;
                    self.handoff(working, default, &reason)?;
                    if let Some(route) = self.routes.route_excluding(text, Some(&current)) {
                        let reason = format!("matched \"{}\"", route.phrase);
                        self.handoff(working, route.target, &reason)?;
                    }
                }
            }
        }
    }
}
