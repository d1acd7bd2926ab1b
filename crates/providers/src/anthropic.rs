//! Anthropic-native adapter.
//!
//! Implements the Messages API: system prompt in the top-level `system`
//! field, tool use and tool results as content blocks, image blocks for
//! multimodal tool results, and the count-tokens endpoint with a char/4
//! fallback. Parallel tool use is disabled so the model emits at most one
//! non-proposal call per response.

use parking_lot::RwLock;
use serde_json::Value;

use voco_domain::error::{Error, Result};
use voco_domain::message::{ChatMessage, ContentPart, ToolCall, ToolContent};
use voco_domain::tool::ToolDefinition;

use crate::traits::{estimate_tokens, ChatModel, ChatOutcome};

const ANTHROPIC_VERSION: &str = "2023-06-01";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AnthropicModel {
    base_url: String,
    api_key: String,
    model: String,
    max_output_tokens: u32,
    tools: RwLock<Vec<ToolDefinition>>,
    client: reqwest::Client,
}

impl AnthropicModel {
    pub fn new(
        base_url: &str,
        api_key: String,
        model: String,
        max_output_tokens: u32,
        request_timeout_secs: u64,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            model,
            max_output_tokens,
            tools: RwLock::new(Vec::new()),
            client,
        })
    }

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .header("Content-Type", "application/json")
    }

    fn build_body(&self, system_prompt: &str, messages: &[ChatMessage]) -> Value {
        let api_messages: Vec<Value> = messages.iter().filter_map(message_to_anthropic).collect();

        let mut body = serde_json::json!({
            "model": self.model,
            "max_tokens": self.max_output_tokens,
            "messages": api_messages,
        });

        if !system_prompt.is_empty() {
            body["system"] = Value::String(system_prompt.to_string());
        }

        let tools = self.tools.read();
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(tool_to_anthropic).collect());
            body["tool_choice"] = serde_json::json!({
                "type": "auto",
                "disable_parallel_tool_use": true,
            });
        }

        body
    }
}

#[async_trait::async_trait]
impl ChatModel for AnthropicModel {
    async fn invoke(&self, system_prompt: &str, messages: &[ChatMessage]) -> Result<ChatOutcome> {
        let url = format!("{}/v1/messages", self.base_url);
        let body = self.build_body(system_prompt, messages);

        let resp = self
            .authed_post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Model {
                model: self.model.clone(),
                message: format!("request failed: {e}"),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(match status.as_u16() {
                401 | 403 => Error::AuthExpired(format!("HTTP {status}: {text}")),
                429 | 529 => Error::Overloaded(format!("HTTP {status}: {text}")),
                _ => Error::Model {
                    model: self.model.clone(),
                    message: format!("HTTP {status}: {text}"),
                },
            });
        }

        let body: Value = resp
            .json()
            .await
            .map_err(|e| Error::Model {
                model: self.model.clone(),
                message: format!("malformed response: {e}"),
            })?;
        parse_response(&body)
    }

    fn rebind_tools(&self, tools: Vec<ToolDefinition>) {
        *self.tools.write() = tools;
    }

    async fn count_tokens(&self, system_prompt: &str, messages: &[ChatMessage]) -> u32 {
        let url = format!("{}/v1/messages/count_tokens", self.base_url);
        let mut body = self.build_body(system_prompt, messages);
        if let Some(obj) = body.as_object_mut() {
            obj.remove("max_tokens");
            obj.remove("tool_choice");
        }

        let native = async {
            let resp = self.authed_post(&url).json(&body).send().await.ok()?;
            if !resp.status().is_success() {
                return None;
            }
            let value: Value = resp.json().await.ok()?;
            value.get("input_tokens").and_then(|t| t.as_u64())
        }
        .await;

        match native {
            Some(tokens) => tokens as u32,
            None => {
                tracing::debug!(model = %self.model, "native token counter unavailable, estimating");
                estimate_tokens(system_prompt, messages)
            }
        }
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn message_to_anthropic(msg: &ChatMessage) -> Option<Value> {
    match msg {
        ChatMessage::Human { text } => Some(serde_json::json!({
            "role": "user",
            "content": text,
        })),
        ChatMessage::System { text } => {
            // Mid-log notifications travel as user text; the Messages API
            // only accepts a system prompt at the top level.
            Some(serde_json::json!({
                "role": "user",
                "content": [{ "type": "text", "text": text }],
            }))
        }
        ChatMessage::Assistant { text, tool_calls } => {
            let mut content: Vec<Value> = Vec::new();
            if !text.is_empty() {
                content.push(serde_json::json!({ "type": "text", "text": text }));
            }
            for tc in tool_calls {
                content.push(serde_json::json!({
                    "type": "tool_use",
                    "id": tc.call_id,
                    "name": tc.name,
                    "input": tc.args,
                }));
            }
            if content.is_empty() {
                return None;
            }
            Some(serde_json::json!({
                "role": "assistant",
                "content": content,
            }))
        }
        ChatMessage::Tool { call_id, content } => {
            let result_content: Value = match content {
                ToolContent::Text(t) => Value::String(t.clone()),
                ToolContent::Parts(parts) => Value::Array(
                    parts
                        .iter()
                        .map(|p| match p {
                            ContentPart::Text { text } => serde_json::json!({
                                "type": "text",
                                "text": text,
                            }),
                            ContentPart::Image { data, media_type } => serde_json::json!({
                                "type": "image",
                                "source": {
                                    "type": "base64",
                                    "media_type": media_type,
                                    "data": data,
                                }
                            }),
                        })
                        .collect(),
                ),
            };
            Some(serde_json::json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": call_id,
                    "content": result_content,
                }],
            }))
        }
    }
}

fn tool_to_anthropic(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "name": tool.name,
        "description": tool.description,
        "input_schema": tool.parameters,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_response(body: &Value) -> Result<ChatOutcome> {
    let empty = Vec::new();
    let content = body
        .get("content")
        .and_then(|c| c.as_array())
        .unwrap_or(&empty);

    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<ToolCall> = Vec::new();

    for block in content {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(text) = block.get("text").and_then(|t| t.as_str()) {
                    text_parts.push(text);
                }
            }
            Some("tool_use") => {
                tool_calls.push(ToolCall {
                    name: block
                        .get("name")
                        .and_then(|n| n.as_str())
                        .unwrap_or_default()
                        .to_string(),
                    args: block.get("input").cloned().unwrap_or(Value::Null),
                    call_id: block
                        .get("id")
                        .and_then(|i| i.as_str())
                        .unwrap_or_default()
                        .to_string(),
                });
            }
            _ => {}
        }
    }

    let usage = body.get("usage");
    let input_tokens = usage
        .and_then(|u| u.get("input_tokens"))
        .and_then(|t| t.as_u64())
        .unwrap_or(0) as u32;
    let output_tokens = usage
        .and_then(|u| u.get("output_tokens"))
        .and_then(|t| t.as_u64())
        .unwrap_or(0) as u32;

    Ok(ChatOutcome {
        text: text_parts.join("\n"),
        tool_calls,
        input_tokens,
        output_tokens,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
