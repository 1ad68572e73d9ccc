//! Google Gemini provider (`generateContent` REST API).
//!
//! Supports:
//! - System instructions
//! - Function calling (`functionDeclarations` / `functionCall` / `functionResponse`)
//! - Health checks via the model metadata endpoint

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use touchline_core::error::ProviderError;
use touchline_core::message::{Message, MessageToolCall, Role};
use touchline_core::provider::*;
use tracing::{debug, warn};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// A Gemini language-model provider authenticated with an API key.
pub struct GeminiProvider {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProviderError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            client,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Convert model messages to Gemini `contents`.
    ///
    /// System messages are folded into `systemInstruction` by the caller;
    /// any left in the list are sent as user text.
    fn to_contents(messages: &[Message]) -> Vec<Content> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::Assistant => {
                    let mut parts = Vec::new();
                    if !m.content.is_empty() {
                        parts.push(Part::text(&m.content));
                    }
                    for call in &m.tool_calls {
                        let args = serde_json::from_str(&call.arguments)
                            .unwrap_or_else(|_| serde_json::json!({}));
                        parts.push(Part {
                            function_call: Some(FunctionCall {
                                name: call.name.clone(),
                                args,
                            }),
                            ..Part::default()
                        });
                    }
                    Content {
                        role: "model".into(),
                        parts,
                    }
                }
                Role::Tool => Content {
                    role: "user".into(),
                    parts: vec![Part {
                        function_response: Some(FunctionResponse {
                            name: m.tool_name.clone().unwrap_or_default(),
                            response: serde_json::json!({ "content": m.content }),
                        }),
                        ..Part::default()
                    }],
                },
                Role::User | Role::System => Content {
                    role: "user".into(),
                    parts: vec![Part::text(&m.content)],
                },
            })
            .collect()
    }

    fn to_tools(tools: &[ToolDefinition]) -> Vec<ApiTool> {
        if tools.is_empty() {
            return Vec::new();
        }
        vec![ApiTool {
            function_declarations: tools
                .iter()
                .map(|t| FunctionDeclaration {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    parameters: t.parameters.clone(),
                })
                .collect(),
        }]
    }

    fn build_body(request: &ProviderRequest) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: Self::to_contents(&request.messages),
            system_instruction: request.system.as_ref().map(|s| Content {
                role: "system".into(),
                parts: vec![Part::text(s)],
            }),
            tools: Self::to_tools(&request.tools),
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
                candidate_count: 1,
            },
        }
    }

    /// Turn the first candidate into an assistant message.
    fn parse_response(response: GenerateContentResponse) -> Result<Message, ProviderError> {
        let content = response
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .ok_or_else(|| ProviderError::InvalidResponse("No candidates in response".into()))?;

        let mut text = String::new();
        let mut tool_calls = Vec::new();
        for part in content.parts {
            if let Some(t) = part.text {
                text.push_str(&t);
            }
            if let Some(call) = part.function_call {
                tool_calls.push(MessageToolCall {
                    id: format!("call_{}", uuid::Uuid::new_v4().simple()),
                    name: call.name,
                    arguments: call.args.to_string(),
                });
            }
        }

        let mut message = Message::assistant(text);
        message.tool_calls = tool_calls;
        Ok(message)
    }
}

fn map_send_error(e: reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::Timeout(e.to_string())
    } else {
        ProviderError::Network(e.to_string())
    }
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        "gemini"
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let url = format!(
            "{}/models/{}:generateContent",
            self.base_url, request.model
        );
        let body = Self::build_body(&request);

        debug!(model = %request.model, messages = request.messages.len(), "Sending Gemini request");

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(map_send_error)?;

        let status = response.status().as_u16();

        if status == 429 {
            let retry_after_secs = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse().ok())
                .unwrap_or(5);
            return Err(ProviderError::RateLimited { retry_after_secs });
        }

        if status == 401 || status == 403 {
            return Err(ProviderError::AuthenticationFailed(
                "Invalid API key or insufficient permissions".into(),
            ));
        }

        if status != 200 {
            let error_body = response.text().await.unwrap_or_default();
            warn!(status, "Gemini returned error");
            return Err(ProviderError::ApiError {
                status_code: status,
                message: error_body,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::InvalidResponse(format!("Failed to parse response: {e}")))?;

        let usage = parsed.usage_metadata.as_ref().map(|u| Usage {
            prompt_tokens: u.prompt_token_count,
            completion_tokens: u.candidates_token_count,
            total_tokens: u.total_token_count,
        });
        let model = parsed
            .model_version
            .clone()
            .unwrap_or_else(|| request.model.clone());

        Ok(ProviderResponse {
            message: Self::parse_response(parsed)?,
            usage,
            model,
        })
    }

    async fn health_check(&self) -> Result<bool, ProviderError> {
        let url = format!("{}/models", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(map_send_error)?;
        Ok(response.status().is_success())
    }
}

// --- Gemini API types (internal) ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ApiTool>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default)]
    role: String,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_call: Option<FunctionCall>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    function_response: Option<FunctionResponse>,
}

impl Part {
    fn text(s: &str) -> Self {
        Self {
            text: Some(s.to_string()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    args: serde_json::Value,
}

#[derive(Debug, Serialize, Deserialize)]
struct FunctionResponse {
    name: String,
    response: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ApiTool {
    function_declarations: Vec<FunctionDeclaration>,
}

#[derive(Debug, Serialize)]
struct FunctionDeclaration {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    candidate_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<UsageMetadata>,
    #[serde(default)]
    model_version: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UsageMetadata {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
    #[serde(default)]
    total_token_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(messages: Vec<Message>) -> ProviderRequest {
        ProviderRequest {
            model: "gemini-1.5-flash".into(),
            system: Some("You are the Boxing agent.".into()),
            messages,
            temperature: 0.7,
            max_tokens: Some(512),
            tools: vec![ToolDefinition {
                name: "boxing_lookup".into(),
                description: "Look up a fighter".into(),
                parameters: serde_json::json!({"type": "object"}),
            }],
        }
    }

    #[test]
    fn body_uses_camel_case_and_system_instruction() {
        let body = GeminiProvider::build_body(&request(vec![Message::user("Who is Usyk?")]));
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json["systemInstruction"]["parts"][0]["text"],
            "You are the Boxing agent."
        );
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Who is Usyk?");
        assert_eq!(
            json["tools"][0]["functionDeclarations"][0]["name"],
            "boxing_lookup"
        );
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 512);
    }

    #[test]
    fn tool_round_trip_maps_to_function_parts() {
        let call = MessageToolCall {
            id: "call_1".into(),
            name: "boxing_lookup".into(),
            arguments: r#"{"fighter":"Usyk"}"#.into(),
        };
        let mut assistant = Message::assistant("");
        assistant.tool_calls = vec![call.clone()];
        let result = Message::tool_result(&call, "Undisputed heavyweight champion");

        let contents = GeminiProvider::to_contents(&[assistant, result]);
        assert_eq!(contents[0].role, "model");
        assert_eq!(contents[0].parts.len(), 1);
        let fc = contents[0].parts[0].function_call.as_ref().unwrap();
        assert_eq!(fc.args["fighter"], "Usyk");
        let fr = contents[1].parts[0].function_response.as_ref().unwrap();
        assert_eq!(fr.name, "boxing_lookup");
        assert_eq!(fr.response["content"], "Undisputed heavyweight champion");
    }

    #[test]
    fn parse_text_and_function_call() {
        let raw = r#"{
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        {"text": "Let me check. "},
                        {"functionCall": {"name": "boxing_lookup", "args": {"fighter": "Fury"}}}
                    ]
                }
            }],
            "usageMetadata": {"promptTokenCount": 12, "candidatesTokenCount": 4, "totalTokenCount": 16}
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.usage_metadata.as_ref().unwrap().total_token_count, 16);
        let message = GeminiProvider::parse_response(parsed).unwrap();
        assert_eq!(message.content, "Let me check. ");
        assert_eq!(message.tool_calls.len(), 1);
        assert_eq!(message.tool_calls[0].name, "boxing_lookup");
        assert!(message.tool_calls[0].arguments.contains("Fury"));
    }

    #[test]
    fn empty_candidates_is_invalid_response() {
        let parsed: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        let err = GeminiProvider::parse_response(parsed).unwrap_err();
        assert!(matches!(err, ProviderError::InvalidResponse(_)));
    }

    #[test]
    fn empty_key_is_unconfigured() {
        let provider = GeminiProvider::new("", Duration::from_secs(5)).unwrap();
        assert!(!provider.is_configured());
        let provider = GeminiProvider::new("key", Duration::from_secs(5)).unwrap();
        assert!(provider.is_configured());
    }
}
