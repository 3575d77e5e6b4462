//! Chat-completion client for the Mistral API.
//!
//! Defines the [`ChatModel`] trait used by the agents and the concrete
//! [`MistralChat`] backend. The HTTP plumbing ([`ApiClient`]) is shared with
//! the OCR provider so both follow the same retry policy.
//!
//! # Retry Strategy
//!
//! Only rate limiting is retried:
//! - HTTP 429 → wait `retry_base_delay_ms × 2^attempt` (1s, 2s by default)
//! - anything else (4xx, 5xx, network) → fail immediately
//!
//! After `max_retries` rate-limited attempts the call fails with
//! [`ApiError::RetriesExhausted`]; there is no wait after the last one.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

use crate::config::MistralConfig;

/// Classified HTTP failure from an external API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{endpoint} returned HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },
    #[error("max retries exceeded for {endpoint} after {attempts} rate-limited attempts")]
    RetriesExhausted { endpoint: String, attempts: u32 },
}

/// Authenticated JSON client with the 429 retry policy.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    max_retries: u32,
    retry_base_delay: Duration,
}

impl ApiClient {
    /// Build a client from `[mistral]` settings.
    ///
    /// # Errors
    ///
    /// Fails if the environment variable named by `api_key_env` is unset or
    /// empty, or if the HTTP client cannot be built.
    pub fn from_config(config: &MistralConfig) -> Result<Self> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| {
                anyhow::anyhow!("{} environment variable not set", config.api_key_env)
            })?;
        Self::new(config, api_key)
    }

    pub fn new(config: &MistralConfig, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            max_retries: config.max_retries,
            retry_base_delay: Duration::from_millis(config.retry_base_delay_ms),
        })
    }

    /// POST `body` to `{base_url}{path}` and decode the JSON response.
    pub async fn post_json(&self, path: &str, body: &Value) -> Result<Value> {
        let url = format!("{}{}", self.base_url, path);

        for attempt in 0..self.max_retries.max(1) {
            let response = self
                .http
                .post(&url)
                .bearer_auth(&self.api_key)
                .json(body)
                .send()
                .await
                .with_context(|| format!("Request to {} failed", path))?;

            let status = response.status();
            if status.is_success() {
                let json: Value = response
                    .json()
                    .await
                    .with_context(|| format!("Invalid JSON from {}", path))?;
                return Ok(json);
            }

            if status.as_u16() == 429 {
                if attempt + 1 >= self.max_retries.max(1) {
                    break;
                }
                let delay = self.retry_base_delay * 2u32.saturating_pow(attempt.min(16));
                tracing::warn!(
                    endpoint = path,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "rate limit exceeded, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            let body_text = response.text().await.unwrap_or_default();
            return Err(ApiError::Status {
                endpoint: path.to_string(),
                status: status.as_u16(),
                body: body_text,
            }
            .into());
        }

        Err(ApiError::RetriesExhausted {
            endpoint: path.to_string(),
            attempts: self.max_retries.max(1),
        }
        .into())
    }
}

// ============ Messages ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A tool invocation requested by the model.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// Raw JSON arguments exactly as the model produced them.
    pub arguments: String,
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
}

impl ChatMessage {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            name: None,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::plain(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::plain(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls,
            ..Self::plain(Role::Assistant, content)
        }
    }

    /// Result of executing `call`, addressed back to it by id.
    pub fn tool_result(call: &ToolCall, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call.id.clone()),
            name: Some(call.name.clone()),
            ..Self::plain(Role::Tool, content)
        }
    }

    fn to_wire(&self) -> Value {
        let mut msg = serde_json::json!({
            "role": self.role,
            "content": self.content,
        });
        if !self.tool_calls.is_empty() {
            msg["tool_calls"] = self
                .tool_calls
                .iter()
                .map(|c| {
                    serde_json::json!({
                        "id": c.id,
                        "type": "function",
                        "function": { "name": c.name, "arguments": c.arguments },
                    })
                })
                .collect();
        }
        if let Some(ref id) = self.tool_call_id {
            msg["tool_call_id"] = Value::String(id.clone());
        }
        if let Some(ref name) = self.name {
            msg["name"] = Value::String(name.clone());
        }
        msg
    }
}

/// A function the model may call.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    /// JSON schema of the arguments object.
    pub parameters: Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolChoice {
    Auto,
    None,
}

#[derive(Debug, Clone)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolSpec>,
    pub tool_choice: ToolChoice,
}

impl ChatRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
            tool_choice: ToolChoice::Auto,
        }
    }

    pub fn with_tools(mut self, tools: Vec<ToolSpec>) -> Self {
        self.tools = tools;
        self
    }

    pub fn with_tool_choice(mut self, choice: ToolChoice) -> Self {
        self.tool_choice = choice;
        self
    }
}

#[derive(Debug, Clone)]
pub struct ChatReply {
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub finish_reason: Option<String>,
}

/// A chat-completion backend.
#[async_trait]
pub trait ChatModel: Send + Sync {
    fn model_name(&self) -> &str;

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply>;
}

// ============ Mistral ============

pub struct MistralChat {
    client: ApiClient,
    model: String,
    temperature: Option<f32>,
}

impl MistralChat {
    pub fn new(client: ApiClient, config: &MistralConfig) -> Self {
        Self {
            client,
            model: config.chat_model.clone(),
            temperature: config.temperature,
        }
    }
}

#[async_trait]
impl ChatModel for MistralChat {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: &ChatRequest) -> Result<ChatReply> {
        let body = build_chat_body(&self.model, self.temperature, request);
        tracing::debug!(
            model = %self.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "chat completion request"
        );
        let json = self.client.post_json("/v1/chat/completions", &body).await?;
        parse_chat_response(&json)
    }
}

fn build_chat_body(model: &str, temperature: Option<f32>, request: &ChatRequest) -> Value {
    let mut body = serde_json::json!({
        "model": model,
        "messages": request.messages.iter().map(ChatMessage::to_wire).collect::<Vec<_>>(),
    });
    if !request.tools.is_empty() {
        body["tools"] = request
            .tools
            .iter()
            .map(|t| {
                serde_json::json!({
                    "type": "function",
                    "function": {
                        "name": t.name,
                        "description": t.description,
                        "parameters": t.parameters,
                    }
                })
            })
            .collect();
        body["tool_choice"] = Value::String(
            match request.tool_choice {
                ToolChoice::Auto => "auto",
                ToolChoice::None => "none",
            }
            .to_string(),
        );
    }
    if let Some(t) = temperature {
        body["temperature"] = serde_json::json!(t);
    }
    body
}

/// Read `choices[0].message` from a chat-completion response.
fn parse_chat_response(json: &Value) -> Result<ChatReply> {
    let choice = json
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|c| c.first())
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing choices"))?;

    let message = choice
        .get("message")
        .ok_or_else(|| anyhow::anyhow!("Invalid chat response: missing message"))?;

    let content = message_text(message.get("content"));

    let mut tool_calls = Vec::new();
    if let Some(calls) = message.get("tool_calls").and_then(|c| c.as_array()) {
        for (i, call) in calls.iter().enumerate() {
            let function = call
                .get("function")
                .ok_or_else(|| anyhow::anyhow!("Invalid tool call: missing function"))?;
            let name = function
                .get("name")
                .and_then(|n| n.as_str())
                .ok_or_else(|| anyhow::anyhow!("Invalid tool call: missing name"))?;
            // Arguments arrive either as a JSON string or as an inline object.
            let arguments = match function.get("arguments") {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => "{}".to_string(),
            };
            let id = call
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| format!("call_{}", i));
            tool_calls.push(ToolCall {
                id,
                name: name.to_string(),
                arguments,
            });
        }
    }

    Ok(ChatReply {
        content,
        tool_calls,
        finish_reason: choice
            .get("finish_reason")
            .and_then(|f| f.as_str())
            .map(str::to_string),
    })
}

/// Content is either a string or a list of `{type: "text", text}` chunks.
fn message_text(content: Option<&Value>) -> String {
    match content {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_plain_reply() {
        let reply = parse_chat_response(&json!({
            "choices": [{
                "message": { "role": "assistant", "content": "Hello" },
                "finish_reason": "stop"
            }]
        }))
        .unwrap();
        assert_eq!(reply.content, "Hello");
        assert!(reply.tool_calls.is_empty());
        assert_eq!(reply.finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn parses_tool_calls_with_string_and_object_arguments() {
        let reply = parse_chat_response(&json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [
                        {"id": "abc", "function": {"name": "web_search", "arguments": "{\"query\":\"Acme\"}"}},
                        {"function": {"name": "web_search", "arguments": {"query": "Beta"}}}
                    ]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();
        assert_eq!(reply.content, "");
        assert_eq!(reply.tool_calls.len(), 2);
        assert_eq!(reply.tool_calls[0].id, "abc");
        assert_eq!(reply.tool_calls[0].arguments, "{\"query\":\"Acme\"}");
        assert_eq!(reply.tool_calls[1].id, "call_1");
        assert_eq!(reply.tool_calls[1].arguments, "{\"query\":\"Beta\"}");
    }

    #[test]
    fn chunked_content_is_joined() {
        let reply = parse_chat_response(&json!({
            "choices": [{"message": {"content": [
                {"type": "text", "text": "Hel"},
                {"type": "text", "text": "lo"}
            ]}}]
        }))
        .unwrap();
        assert_eq!(reply.content, "Hello");
    }

    #[test]
    fn missing_choices_is_an_error() {
        assert!(parse_chat_response(&json!({"object": "error"})).is_err());
    }

    #[test]
    fn request_body_includes_tools_only_when_present() {
        let plain = ChatRequest::new(vec![ChatMessage::user("hi")]);
        let body = build_chat_body("m", None, &plain);
        assert!(body.get("tools").is_none());
        assert!(body.get("temperature").is_none());

        let with_tools = ChatRequest::new(vec![ChatMessage::user("hi")])
            .with_tools(vec![ToolSpec {
                name: "web_search".into(),
                description: "search".into(),
                parameters: json!({"type": "object"}),
            }])
            .with_tool_choice(ToolChoice::None);
        let body = build_chat_body("m", Some(0.2), &with_tools);
        assert_eq!(body["tools"][0]["function"]["name"], "web_search");
        assert_eq!(body["tool_choice"], "none");
        assert!(body["temperature"].is_number());
    }

    #[test]
    fn tool_messages_carry_call_id() {
        let call = ToolCall {
            id: "c1".into(),
            name: "web_search".into(),
            arguments: "{}".into(),
        };
        let assistant = ChatMessage::assistant("", vec![call.clone()]).to_wire();
        assert_eq!(assistant["tool_calls"][0]["id"], "c1");
        assert_eq!(assistant["tool_calls"][0]["type"], "function");

        let result = ChatMessage::tool_result(&call, "found").to_wire();
        assert_eq!(result["role"], "tool");
        assert_eq!(result["tool_call_id"], "c1");
        assert_eq!(result["name"], "web_search");
    }

    #[test]
    fn missing_api_key_env_is_reported() {
        let config = MistralConfig {
            api_key_env: "CARD_INTAKE_TEST_UNSET_KEY".to_string(),
            ..MistralConfig::default()
        };
        let err = ApiClient::from_config(&config).err().unwrap();
        assert!(err.to_string().contains("CARD_INTAKE_TEST_UNSET_KEY"));
    }
}
