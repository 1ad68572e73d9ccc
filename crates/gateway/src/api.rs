//! Chat and conversation endpoints.
//!
//! - `POST   /chat`                — Run one turn (or the handshake)
//! - `GET    /agents`              — The agent roster
//! - `GET    /conversations/{id}`  — Full history of a conversation
//! - `DELETE /conversations/{id}`  — Remove a conversation

use axum::{
    Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use touchline_agent::TurnOutcome;
use touchline_core::agent::AgentDefinition;
use touchline_core::conversation::{ContextSlots, ConversationId, Turn, TurnRole};
use touchline_core::error::Error;
use touchline_core::event::Event;
use touchline_core::grounding::GroundingDecision;
use touchline_core::guardrail::GuardrailCheck;

use crate::SharedState;

pub fn api_router(state: SharedState) -> Router {
    Router::new()
        .route("/chat", post(chat_handler))
        .route("/agents", get(list_agents_handler))
        .route(
            "/conversations/{id}",
            get(get_conversation_handler).delete(delete_conversation_handler),
        )
        .with_state(state)
}

// ── Request / Response types ──────────────────────────────────────────────

#[derive(Deserialize)]
struct ChatRequest {
    #[serde(default)]
    message: String,
    /// Existing conversation (omit or null to start one)
    #[serde(default)]
    conversation_id: Option<String>,
}

#[derive(Serialize)]
struct ChatResponse {
    conversation_id: String,
    current_agent: String,
    context: ContextSlots,
    events: Vec<Event>,
    agents: Vec<AgentDefinition>,
    guardrails: Vec<GuardrailCheck>,
    messages: Vec<MessageDto>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
struct MessageDto {
    content: String,
    agent: Option<String>,
    timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    grounding: Option<GroundingDecision>,
}

#[derive(Serialize)]
struct HistoryEntryDto {
    role: &'static str,
    #[serde(flatten)]
    message: MessageDto,
}

#[derive(Serialize)]
struct ConversationDetailResponse {
    id: String,
    current_agent: String,
    created_at: String,
    last_active_at: String,
    context: ContextSlots,
    messages: Vec<HistoryEntryDto>,
    events: Vec<Event>,
}

#[derive(Serialize)]
struct AgentListResponse {
    default_agent: String,
    agents: Vec<AgentDefinition>,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl From<&Turn> for MessageDto {
    fn from(turn: &Turn) -> Self {
        Self {
            content: turn.text.clone(),
            agent: turn.agent.clone(),
            timestamp: turn.timestamp.to_rfc3339(),
            grounding: turn.grounding.clone(),
        }
    }
}

/// Server faults only; every other error is already a chat reply.
struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownConversation(_) => StatusCode::NOT_FOUND,
            e if e.is_server_fault() => {
                error!(error = %e, "Request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
            _ => StatusCode::BAD_REQUEST,
        };
        (
            status,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

// ── Handlers ──────────────────────────────────────────────────────────────

async fn chat_handler(
    State(state): State<SharedState>,
    Json(payload): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    let id = payload
        .conversation_id
        .filter(|id| !id.is_empty())
        .map(ConversationId);
    info!(
        conversation_id = id.as_ref().map(|i| i.as_str()).unwrap_or("new"),
        message_len = payload.message.len(),
        "chat request"
    );

    let outcome = state
        .orchestrator
        .chat(id.as_ref(), &payload.message)
        .await?;
    Ok(Json(chat_response(&state, outcome)))
}

fn chat_response(state: &SharedState, outcome: TurnOutcome) -> ChatResponse {
    ChatResponse {
        conversation_id: outcome.conversation_id.to_string(),
        current_agent: outcome.current_agent,
        context: outcome.context,
        events: outcome.events,
        agents: state.orchestrator.registry().list().to_vec(),
        guardrails: outcome.guardrails,
        messages: outcome.messages.iter().map(MessageDto::from).collect(),
        error: outcome.error,
    }
}

async fn list_agents_handler(State(state): State<SharedState>) -> Json<AgentListResponse> {
    let registry = state.orchestrator.registry();
    Json(AgentListResponse {
        default_agent: registry.default_agent().to_string(),
        agents: registry.list().to_vec(),
    })
}

async fn get_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ConversationDetailResponse>, ApiError> {
    let id = ConversationId(id);
    let conversation = state
        .orchestrator
        .conversation(&id)
        .await?
        .ok_or_else(|| Error::UnknownConversation(id.to_string()))?;

    Ok(Json(ConversationDetailResponse {
        id: conversation.id.to_string(),
        current_agent: conversation.current_agent().to_string(),
        created_at: conversation.created_at.to_rfc3339(),
        last_active_at: conversation.last_active_at.to_rfc3339(),
        context: conversation.context.clone(),
        messages: conversation
            .history()
            .iter()
            .map(|t| HistoryEntryDto {
                role: match t.role {
                    TurnRole::User => "user",
                    TurnRole::Assistant => "assistant",
                },
                message: MessageDto::from(t),
            })
            .collect(),
        events: conversation.events().to_vec(),
    }))
}

async fn delete_conversation_handler(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = ConversationId(id);
    if state.orchestrator.delete(&id).await? {
        info!(conversation_id = %id, "Conversation deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(Error::UnknownConversation(id.to_string()).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GatewayState;
    use axum::body::Body;
    use axum::http::{Request, header};
    use http_body_util::BodyExt;
    use std::sync::Arc;
    use tower::ServiceExt;

    use touchline_agent::Orchestrator;
    use touchline_agent::testing::{ScriptedProvider, make_text_response};
    use touchline_config::{AppConfig, SearchConfig};
    use touchline_memory::InMemorySessionStore;
    use touchline_tools::SearchClient;
    use touchline_tools::testing::{ScriptedSearchBackend, sample_sources};

    fn test_state(replies: &[&str]) -> SharedState {
        let provider = Arc::new(ScriptedProvider::new(
            replies.iter().map(|r| make_text_response(r)).collect(),
        ));
        let search_config = SearchConfig {
            api_key: Some("k".into()),
            engine_id: Some("cx".into()),
            ..SearchConfig::default()
        };
        let search = Arc::new(SearchClient::new(
            Arc::new(ScriptedSearchBackend::returning(sample_sources())),
            &search_config,
        ));
        let orchestrator = Orchestrator::from_config(
            &AppConfig::default(),
            provider,
            search,
            Arc::new(InMemorySessionStore::new()),
        )
        .unwrap();
        Arc::new(GatewayState {
            orchestrator: Arc::new(orchestrator),
        })
    }

    async fn post_chat(app: &Router, body: serde_json::Value) -> (StatusCode, serde_json::Value) {
        let req = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&body).unwrap())
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json = serde_json::from_slice(&body).unwrap_or(serde_json::Value::Null);
        (status, json)
    }

    #[tokio::test]
    async fn handshake_returns_initial_state() {
        let app = api_router(test_state(&[]));
        let (status, json) =
            post_chat(&app, serde_json::json!({ "message": "", "conversation_id": null })).await;

        assert_eq!(status, StatusCode::OK);
        assert!(!json["conversation_id"].as_str().unwrap().is_empty());
        assert_eq!(json["current_agent"], "Triage");
        assert_eq!(json["agents"].as_array().unwrap().len(), 5);
        let messages = json["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["agent"], "Triage");
        assert_eq!(json["events"][0]["type"], "agent_selected");
        assert!(json["guardrails"].as_array().unwrap().is_empty());
        // Instructions stay server-side
        assert!(json["agents"][0].get("instructions").is_none());
    }

    #[tokio::test]
    async fn chat_turn_routes_and_reports_guardrails() {
        let app = api_router(test_state(&["Tyson Fury is the Gypsy King."]));
        let (_, start) = post_chat(&app, serde_json::json!({ "message": "" })).await;
        let id = start["conversation_id"].as_str().unwrap();

        let (status, json) = post_chat(
            &app,
            serde_json::json!({ "message": "Who is Tyson Fury?", "conversation_id": id }),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["conversation_id"], id);
        assert_eq!(json["current_agent"], "Boxing");
        assert_eq!(json["messages"][0]["content"], "Tyson Fury is the Gypsy King.");
        assert_eq!(json["guardrails"].as_array().unwrap().len(), 6);
        let types: Vec<&str> = json["events"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|e| e["type"].as_str())
            .collect();
        assert!(types.contains(&"handoff"));
        assert!(!types.contains(&"grounding_triggered"));
    }

    #[tokio::test]
    async fn unknown_conversation_is_404() {
        let app = api_router(test_state(&[]));
        let (status, json) = post_chat(
            &app,
            serde_json::json!({ "message": "hello", "conversation_id": "nope" }),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(json["error"].as_str().unwrap().contains("nope"));

        let (status, _) = get(&app, "/conversations/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn validation_failure_is_still_a_chat_reply() {
        let app = api_router(test_state(&[]));
        let (_, start) = post_chat(&app, serde_json::json!({ "message": "" })).await;
        let id = start["conversation_id"].as_str().unwrap();

        let (status, json) =
            post_chat(&app, serde_json::json!({ "message": "  ", "conversation_id": id })).await;
        assert_eq!(status, StatusCode::OK);
        assert!(json["error"].is_string());
        assert_eq!(json["messages"][0]["content"], "Please enter a message.");
    }

    #[tokio::test]
    async fn conversation_detail_and_delete() {
        let app = api_router(test_state(&["Usyk is undisputed."]));
        let (_, first) = post_chat(&app, serde_json::json!({ "message": "Who is Usyk?" })).await;
        let id = first["conversation_id"].as_str().unwrap().to_string();

        let (status, detail) = get(&app, &format!("/conversations/{id}")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(detail["current_agent"], "Boxing");
        let roles: Vec<&str> = detail["messages"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|m| m["role"].as_str())
            .collect();
        assert_eq!(roles, vec!["assistant", "user", "assistant"]);

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/conversations/{id}"))
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let (status, _) = get(&app, &format!("/conversations/{id}")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn agents_listing() {
        let app = api_router(test_state(&[]));
        let (status, json) = get(&app, "/agents").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["default_agent"], "Triage");
        let names: Vec<&str> = json["agents"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|a| a["name"].as_str())
            .collect();
        assert!(names.contains(&"Boxing"));
        assert!(names.contains(&"Premier League"));
    }
}
