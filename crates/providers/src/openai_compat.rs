//! OpenAI-compatible adapter.
//!
//! Used for DashScope (Qwen models through its compatible-mode endpoint),
//! OpenAI itself, and any other endpoint that follows the chat completions
//! contract.

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use crate::util::{from_reqwest, send_json};
use mcx_domain::config::ModelConfig;
use mcx_domain::error::{Error, Result};
use mcx_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition, Usage, RAW_ARGUMENTS_KEY};
use serde_json::Value;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Adapter struct
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An LLM provider adapter for any OpenAI-compatible API endpoint.
pub struct OpenAiCompatProvider {
    id: String,
    base_url: String,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
}

impl OpenAiCompatProvider {
    pub fn from_config(cfg: &ModelConfig) -> Result<Self> {
        if cfg.api_key.trim().is_empty() {
            return Err(Error::Auth(format!("{}: no API key configured", cfg.provider)));
        }

        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            id: cfg.provider.to_string(),
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            client,
        })
    }

    // ── Internal helpers ───────────────────────────────────────────

    fn authed_post(&self, url: &str) -> reqwest::RequestBuilder {
        self.client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
    }

    fn build_chat_body(&self, req: &ChatRequest) -> Value {
        let messages: Vec<Value> = req.messages.iter().flat_map(msg_to_openai).collect();

        let mut body = serde_json::json!({
            "model": req.model.clone().unwrap_or_else(|| self.model.clone()),
            "messages": messages,
            "max_tokens": req.max_tokens.unwrap_or(self.max_tokens),
        });

        if !req.tools.is_empty() {
            let tools: Vec<Value> = req.tools.iter().map(tool_to_openai).collect();
            body["tools"] = Value::Array(tools);
        }
        if let Some(temp) = req.temperature {
            body["temperature"] = serde_json::json!(temp);
        }
        body
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Message serialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn role_to_str(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    }
}

/// One internal message may become several wire messages: a tool-result
/// message carrying N results expands to N `tool` messages.
fn msg_to_openai(msg: &Message) -> Vec<Value> {
    match msg.role {
        Role::Tool => tool_results_to_openai(msg),
        Role::Assistant => vec![assistant_to_openai(msg)],
        _ => vec![serde_json::json!({
            "role": role_to_str(msg.role),
            "content": msg.content.extract_all_text(),
        })],
    }
}

fn assistant_to_openai(msg: &Message) -> Value {
    let mut obj = serde_json::json!({ "role": "assistant" });
    let mut text_parts: Vec<&str> = Vec::new();
    let mut tool_calls: Vec<Value> = Vec::new();

    match &msg.content {
        MessageContent::Text(t) => text_parts.push(t),
        MessageContent::Parts(parts) => {
            for part in parts {
                match part {
                    ContentPart::Text { text } => text_parts.push(text),
                    ContentPart::ToolUse { id, name, input } => {
                        tool_calls.push(serde_json::json!({
                            "id": id,
                            "type": "function",
                            "function": {
                                "name": name,
                                "arguments": input.to_string(),
                            }
                        }));
                    }
                    ContentPart::ToolResult { .. } => {}
                }
            }
        }
    }

    obj["content"] = if text_parts.is_empty() {
        Value::Null
    } else {
        Value::String(text_parts.join("\n"))
    };
    if !tool_calls.is_empty() {
        obj["tool_calls"] = Value::Array(tool_calls);
    }
    obj
}

fn tool_results_to_openai(msg: &Message) -> Vec<Value> {
    match &msg.content {
        MessageContent::Parts(parts) => parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => Some(serde_json::json!({
                    "role": "tool",
                    "tool_call_id": tool_use_id,
                    "content": content,
                })),
                _ => None,
            })
            .collect(),
        MessageContent::Text(t) => vec![serde_json::json!({
            "role": "tool",
            "tool_call_id": "",
            "content": t,
        })],
    }
}

fn tool_to_openai(tool: &ToolDefinition) -> Value {
    serde_json::json!({
        "type": "function",
        "function": {
            "name": tool.name,
            "description": tool.description,
            "parameters": tool.parameters,
        }
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Response deserialization helpers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_chat_response(provider: &str, body: &Value) -> Result<ChatResponse> {
    let choice = body
        .get("choices")
        .and_then(|c| c.as_array())
        .and_then(|a| a.first())
        .ok_or_else(|| Error::Provider {
            provider: provider.into(),
            message: "no choices in response".into(),
        })?;

    let message = choice.get("message").ok_or_else(|| Error::Provider {
        provider: provider.into(),
        message: "no message in choice".into(),
    })?;

    let content = message
        .get("content")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();

    let finish_reason = choice
        .get("finish_reason")
        .and_then(|v| v.as_str())
        .map(String::from);

    let model = body
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or("unknown")
        .to_string();

    Ok(ChatResponse {
        content,
        tool_calls: parse_openai_tool_calls(message),
        usage: body.get("usage").and_then(parse_openai_usage),
        model,
        finish_reason,
    })
}

fn parse_openai_tool_calls(message: &Value) -> Vec<ToolCall> {
    let Some(arr) = message.get("tool_calls").and_then(|v| v.as_array()) else {
        return Vec::new();
    };
    arr.iter()
        .filter_map(|tc| {
            let call_id = tc.get("id")?.as_str()?.to_string();
            let func = tc.get("function")?;
            let tool_name = func.get("name")?.as_str()?.to_string();
            let arguments = match func.get("arguments") {
                Some(Value::String(s)) if s.trim().is_empty() => Value::Object(Default::default()),
                Some(Value::String(s)) => serde_json::from_str(s)
                    .unwrap_or_else(|_| serde_json::json!({ RAW_ARGUMENTS_KEY: s })),
                Some(other) => other.clone(),
                None => Value::Object(Default::default()),
            };
            Some(ToolCall {
                call_id,
                tool_name,
                arguments,
            })
        })
        .collect()
}

fn parse_openai_usage(v: &Value) -> Option<Usage> {
    Some(Usage {
        prompt_tokens: v.get("prompt_tokens")?.as_u64()? as u32,
        completion_tokens: v.get("completion_tokens")?.as_u64()? as u32,
        total_tokens: v.get("total_tokens")?.as_u64()? as u32,
    })
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Trait implementation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[async_trait::async_trait]
impl LlmProvider for OpenAiCompatProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.build_chat_body(req);

        tracing::debug!(provider = %self.id, url = %url, tools = req.tools.len(), "openai_compat chat request");

        let resp = send_json(&self.id, self.authed_post(&url), &body).await?;
        parse_chat_response(&self.id, &resp)
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcx_domain::config::{ProviderKind, ToolProtocol};
    use serde_json::json;

    fn provider() -> OpenAiCompatProvider {
        OpenAiCompatProvider::from_config(&ModelConfig {
            provider: ProviderKind::DashScope,
            model: "qwen-turbo".into(),
            api_key: "sk-test".into(),
            max_tokens: 1000,
            base_url: ProviderKind::DashScope.default_base_url().into(),
            tool_protocol: ToolProtocol::Native,
        })
        .unwrap()
    }

    fn call(id: &str, name: &str, args: Value) -> ToolCall {
        ToolCall {
            call_id: id.into(),
            tool_name: name.into(),
            arguments: args,
        }
    }

    #[test]
    fn tool_results_expand_into_one_message_per_call() {
        let req = ChatRequest {
            messages: vec![
                Message::user("add and multiply"),
                Message::assistant_tool_use(
                    "",
                    &[call("c1", "add", json!({ "a": 1, "b": 2 })), call("c2", "multiply", json!({ "a": 3, "b": 4 }))],
                ),
                Message::tool_results([
                    ("c1".to_string(), "3".to_string(), false),
                    ("c2".to_string(), "12".to_string(), false),
                ]),
            ],
            ..Default::default()
        };
        let body = provider().build_chat_body(&req);
        let msgs = body["messages"].as_array().unwrap();

        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[1]["content"], Value::Null);
        assert_eq!(msgs[1]["tool_calls"][1]["function"]["name"], "multiply");
        assert_eq!(msgs[1]["tool_calls"][0]["function"]["arguments"], r#"{"a":1,"b":2}"#);
        assert_eq!(msgs[2]["role"], "tool");
        assert_eq!(msgs[2]["tool_call_id"], "c1");
        assert_eq!(msgs[3]["tool_call_id"], "c2");
        assert_eq!(msgs[3]["content"], "12");
    }

    #[test]
    fn body_uses_configured_model_and_budget() {
        let req = ChatRequest {
            messages: vec![Message::system("sys"), Message::user("hi")],
            tools: vec![ToolDefinition {
                name: "add".into(),
                description: "Add two numbers".into(),
                parameters: json!({ "type": "object" }),
            }],
            temperature: Some(0.2),
            ..Default::default()
        };
        let body = provider().build_chat_body(&req);
        assert_eq!(body["model"], "qwen-turbo");
        assert_eq!(body["max_tokens"], 1000);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["tools"][0]["type"], "function");
        assert_eq!(body["tools"][0]["function"]["name"], "add");
        assert!(body["temperature"].as_f64().is_some());
    }

    #[test]
    fn parse_tool_calls_and_usage() {
        let body = json!({
            "model": "qwen-turbo",
            "choices": [{
                "index": 0,
                "finish_reason": "tool_calls",
                "message": {
                    "role": "assistant",
                    "content": "",
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": { "name": "square_root", "arguments": "{\"number\": 15}" }
                    }]
                }
            }],
            "usage": { "prompt_tokens": 50, "completion_tokens": 10, "total_tokens": 60 }
        });
        let resp = parse_chat_response("dashscope", &body).unwrap();
        assert_eq!(resp.tool_calls, vec![call("call_1", "square_root", json!({ "number": 15 }))]);
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(resp.usage.unwrap().total_tokens, 60);
    }

    #[test]
    fn malformed_arguments_are_kept_raw() {
        let message = json!({
            "tool_calls": [
                { "id": "a", "function": { "name": "add", "arguments": "{a: 1" } },
                { "id": "b", "function": { "name": "ping", "arguments": "" } }
            ]
        });
        let calls = parse_openai_tool_calls(&message);
        assert_eq!(calls[0].arguments[RAW_ARGUMENTS_KEY], "{a: 1");
        assert_eq!(calls[1].arguments, json!({}));
    }

    #[test]
    fn empty_choices_is_a_provider_error() {
        let err = parse_chat_response("dashscope", &json!({ "choices": [] })).unwrap_err();
        assert!(err.to_string().contains("no choices"));
    }
}
