//! End-to-end tests for Touchline.
//!
//! These drive the HTTP router over a real orchestrator and in-memory
//! session store, with the language model and web search replaced by
//! scripted fakes.

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use touchline_agent::Orchestrator;
use touchline_agent::testing::{
    ScriptedProvider, make_text_response, make_tool_call, make_tool_call_response,
};
use touchline_config::{AppConfig, SearchConfig};
use touchline_core::error::SearchErrorKind;
use touchline_core::provider::ProviderResponse;
use touchline_gateway::{GatewayState, build_router};
use touchline_memory::InMemorySessionStore;
use touchline_tools::SearchClient;
use touchline_tools::testing::{ScriptedSearchBackend, sample_sources};

// ── Harness ──────────────────────────────────────────────────────────────

struct App {
    router: Router,
    provider: Arc<ScriptedProvider>,
    search: Arc<ScriptedSearchBackend>,
}

fn app_with(provider: ScriptedProvider, search: ScriptedSearchBackend) -> App {
    let config = AppConfig {
        search: SearchConfig {
            api_key: Some("test-key".into()),
            engine_id: Some("test-cx".into()),
            ..SearchConfig::default()
        },
        ..AppConfig::default()
    };
    let provider = Arc::new(provider);
    let search = Arc::new(search);
    let client = Arc::new(SearchClient::new(search.clone(), &config.search));
    let orchestrator = Orchestrator::from_config(
        &config,
        provider.clone(),
        client,
        Arc::new(InMemorySessionStore::new()),
    )
    .expect("sports roster is valid");
    let state = Arc::new(GatewayState {
        orchestrator: Arc::new(orchestrator),
    });
    App {
        router: build_router(state, &config),
        provider,
        search,
    }
}

fn app(replies: Vec<ProviderResponse>) -> App {
    app_with(
        ScriptedProvider::new(replies),
        ScriptedSearchBackend::returning(sample_sources()),
    )
}

async fn chat(app: &App, conversation_id: Option<&str>, message: &str) -> Value {
    let body = json!({ "message": message, "conversation_id": conversation_id });
    let req = Request::builder()
        .method("POST")
        .uri("/chat")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn get_conversation(app: &App, id: &str) -> Value {
    let req = Request::builder()
        .uri(format!("/conversations/{id}"))
        .body(Body::empty())
        .unwrap();
    let response = app.router.clone().oneshot(req).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

fn events_of<'a>(json: &'a Value, kind: &str) -> Vec<&'a Value> {
    json["events"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|e| e["type"] == kind)
        .collect()
}

fn reply(json: &Value) -> &str {
    json["messages"].as_array().unwrap().last().unwrap()["content"]
        .as_str()
        .unwrap()
}

async fn start(app: &App) -> String {
    let json = chat(app, None, "").await;
    json["conversation_id"].as_str().unwrap().to_string()
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn e2e_handshake_creates_triage_conversation() {
    let app = app(vec![]);
    let json = chat(&app, None, "").await;

    assert!(!json["conversation_id"].as_str().unwrap().is_empty());
    assert_eq!(json["current_agent"], "Triage");
    assert!(!json["agents"].as_array().unwrap().is_empty());
    let messages = json["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0]["agent"], "Triage");
    assert!(json["context"]["user_id"].is_string());
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn e2e_boxing_question_routes_without_grounding() {
    let app = app(vec![make_text_response(
        "Tyson Fury is a former unified heavyweight champion from Manchester.",
    )]);
    let id = start(&app).await;
    let json = chat(&app, Some(&id), "Who is Tyson Fury?").await;

    assert_eq!(json["current_agent"], "Boxing");
    assert!(events_of(&json, "grounding_triggered").is_empty());
    assert_eq!(events_of(&json, "grounding_skipped").len(), 1);
    let message = json["messages"].as_array().unwrap().last().unwrap();
    assert!(message["grounding"]["sources"].as_array().unwrap().is_empty());
    assert!(!reply(&json).contains("http"));
    assert_eq!(app.search.calls(), 0);
}

#[tokio::test]
async fn e2e_admission_triggers_grounded_reply() {
    let app = app(vec![make_text_response(
        "I don't have information about future fixtures.",
    )]);
    let id = start(&app).await;
    let json = chat(&app, Some(&id), "When do Arsenal play next?").await;

    assert_eq!(json["current_agent"], "Premier League");
    let triggered = events_of(&json, "grounding_triggered");
    assert_eq!(triggered.len(), 1);
    assert!(
        triggered[0]["metadata"]["reason"]
            .as_str()
            .unwrap()
            .starts_with("admission:")
    );

    let message = json["messages"].as_array().unwrap().last().unwrap();
    assert_eq!(message["grounding"]["reason"]["code"], "grounded");
    let sources = message["grounding"]["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    // Official sources rank first
    assert!(sources[0]["link"].as_str().unwrap().contains("premierleague.com"));
    for source in sources {
        assert!(!source["title"].as_str().unwrap().is_empty());
        assert!(!source["snippet"].as_str().unwrap().is_empty());
        assert!(!source["link"].as_str().unwrap().is_empty());
    }
    assert!(reply(&json).contains("premierleague.com"));
    assert_eq!(app.search.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn e2e_search_exhaustion_still_replies() {
    let app = app_with(
        ScriptedProvider::new(vec![make_text_response(
            "As of my knowledge cutoff I can't say who leads the table.",
        )]),
        ScriptedSearchBackend::failing(SearchErrorKind::Upstream5xx),
    );
    let id = start(&app).await;
    let json = chat(&app, Some(&id), "Who is top of the Premier League?").await;

    let message = json["messages"].as_array().unwrap().last().unwrap();
    assert_eq!(message["grounding"]["reason"]["code"], "search_unavailable");
    assert!(reply(&json).starts_with("As of my knowledge cutoff"));
    assert!(json.get("error").is_none());
    // Every configured attempt was made
    assert_eq!(app.search.calls(), 3);
}

#[tokio::test]
async fn e2e_time_sensitive_question_alone_does_not_ground() {
    let app = app(vec![make_text_response(
        "Arsenal face Chelsea on Saturday at the Emirates.",
    )]);
    let id = start(&app).await;
    let json = chat(&app, Some(&id), "What are the latest 2025 Arsenal fixtures?").await;

    assert!(events_of(&json, "grounding_triggered").is_empty());
    assert_eq!(app.search.calls(), 0);
}

#[tokio::test]
async fn e2e_repeated_query_is_served_from_cache() {
    let admission = "I don't have information about future fixtures.";
    let app = app(vec![make_text_response(admission), make_text_response(admission)]);

    let first = start(&app).await;
    let second = start(&app).await;
    let a = chat(&app, Some(&first), "When do Arsenal play next?").await;
    let b = chat(&app, Some(&second), "When do Arsenal play next?").await;

    let cache_of = |json: &Value| {
        events_of(json, "tool_called")
            .into_iter()
            .find(|e| e["metadata"]["tool"] == "web_search")
            .map(|e| e["metadata"]["cache"].as_str().unwrap().to_string())
    };
    assert_eq!(cache_of(&a).as_deref(), Some("miss"));
    assert_eq!(cache_of(&b).as_deref(), Some("hit"));
    assert_eq!(app.search.calls(), 1);
}

#[tokio::test]
async fn e2e_every_guardrail_reports_once_per_direction() {
    let app = app(vec![make_text_response("Usyk beat Fury twice.")]);
    let id = start(&app).await;
    let json = chat(&app, Some(&id), "Tell me about Usyk").await;

    let guardrails = json["guardrails"].as_array().unwrap();
    for direction in ["input", "output"] {
        let mut names: Vec<&str> = guardrails
            .iter()
            .filter(|g| g["direction"] == direction)
            .filter_map(|g| g["name"].as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(names, vec!["disallowed_content", "length_limit", "topic_relevance"]);
    }
    assert_eq!(events_of(&json, "guardrail_result").len(), 6);
}

#[tokio::test]
async fn e2e_blocked_input_is_refused_and_recorded() {
    let app = app(vec![]);
    let id = start(&app).await;
    let long = "boxing ".repeat(200);
    let json = chat(&app, Some(&id), &long).await;

    let failed: Vec<&str> = json["guardrails"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|g| g["passed"] == false)
        .filter_map(|g| g["name"].as_str())
        .collect();
    assert_eq!(failed, vec!["length_limit"]);
    assert!(reply(&json).contains("shorten"));
    assert_eq!(json["current_agent"], "Triage");
    assert_eq!(app.provider.call_count(), 0);
}

#[tokio::test]
async fn e2e_specialist_uses_its_lookup_tool() {
    let app = app(vec![
        make_tool_call_response(
            vec![make_tool_call("boxing_lookup", json!({ "query": "usyk" }))],
            "",
        ),
        make_text_response("Usyk holds the heavyweight titles."),
    ]);
    let id = start(&app).await;
    let json = chat(&app, Some(&id), "Which belts does Usyk hold?").await;

    let tool_events = events_of(&json, "tool_called");
    let lookup = tool_events
        .iter()
        .find(|e| e["metadata"]["tool"] == "boxing_lookup")
        .expect("lookup recorded");
    assert_eq!(lookup["metadata"]["success"], true);
    assert_eq!(reply(&json), "Usyk holds the heavyweight titles.");
    assert_eq!(app.provider.call_count(), 2);
}

#[tokio::test]
async fn e2e_handoffs_stay_within_declared_targets() {
    let app = app(vec![
        make_text_response("Usyk is undisputed."),
        make_text_response("Leeds are chasing promotion."),
        make_text_response("Arsenal are top."),
    ]);
    let id = start(&app).await;
    for message in ["Who is Usyk?", "How are Leeds doing?", "And Arsenal?"] {
        chat(&app, Some(&id), message).await;
    }

    let detail = get_conversation(&app, &id).await;
    let agents = chat(&app, None, "").await["agents"].clone();
    let declared = |from: &str| -> Vec<String> {
        agents
            .as_array()
            .unwrap()
            .iter()
            .find(|a| a["name"] == from)
            .map(|a| {
                a["handoffs"]
                    .as_array()
                    .unwrap()
                    .iter()
                    .filter_map(|h| h.as_str().map(String::from))
                    .collect()
            })
            .unwrap_or_default()
    };

    let handoffs = events_of(&detail, "handoff");
    assert!(!handoffs.is_empty());
    for event in handoffs {
        let from = event["metadata"]["from"].as_str().unwrap();
        let to = event["metadata"]["to"].as_str().unwrap();
        assert!(
            to == "Triage" || declared(from).iter().any(|t| t == to),
            "{from} -> {to} is not declared"
        );
    }
    assert_eq!(detail["current_agent"], "Premier League");
}

#[tokio::test(start_paused = true)]
async fn e2e_concurrent_turns_are_serialized() {
    let app = app_with(
        ScriptedProvider::new(vec![
            make_text_response("Fury is from Manchester."),
            make_text_response("Joshua is from Watford."),
            make_text_response("Usyk is from Ukraine."),
        ])
        .with_delay(Duration::from_millis(200)),
        ScriptedSearchBackend::returning(vec![]),
    );
    let app = Arc::new(app);
    let id = start(&app).await;

    let mut tasks = Vec::new();
    for question in ["Who is Fury?", "Who is Joshua?", "Who is Usyk?"] {
        let app = app.clone();
        let id = id.clone();
        tasks.push(tokio::spawn(async move { chat(&app, Some(&id), question).await }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let detail = get_conversation(&app, &id).await;
    let roles: Vec<&str> = detail["messages"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(|m| m["role"].as_str())
        .collect();
    assert_eq!(
        roles,
        vec!["assistant", "user", "assistant", "user", "assistant", "user", "assistant"]
    );
}

#[tokio::test]
async fn e2e_context_carries_across_turns() {
    let app = app(vec![make_text_response("Leeds play at Elland Road.")]);
    let id = start(&app).await;
    let greeting = chat(&app, Some(&id), "Hi, my name is Sam and I support Leeds United").await;
    assert_eq!(greeting["context"]["user_name"], "Sam");
    assert_eq!(greeting["context"]["favorite_team"], "Leeds United");
    assert_eq!(greeting["current_agent"], "Championship");

    let detail = get_conversation(&app, &id).await;
    assert_eq!(detail["context"]["last_query_type"], "championship");
    assert_eq!(detail["context"]["favorite_sport"], "football");
}
