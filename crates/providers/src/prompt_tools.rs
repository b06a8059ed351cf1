//! Text-based tool calling for models without a native tool API.
//!
//! The catalog is described in a system message and the model is asked to
//! answer with `TOOL_CALL: <tool_name> {json arguments}` lines. Those lines
//! are parsed back into [`ToolCall`]s so the session loop works the same as
//! with native tool calling.

use std::sync::Arc;

use crate::traits::{ChatRequest, ChatResponse, LlmProvider};
use mcx_domain::error::Result;
use mcx_domain::tool::{ContentPart, Message, MessageContent, Role, ToolCall, ToolDefinition, RAW_ARGUMENTS_KEY};
use serde_json::Value;

/// Prefix that marks a tool call line in the model's text.
pub const TOOL_CALL_PREFIX: &str = "TOOL_CALL:";

const TOOL_RESULT_PREFIX: &str = "Tool result:";

/// Wraps another provider and emulates tool calling through plain text.
pub struct PromptToolProvider {
    inner: Arc<dyn LlmProvider>,
}

impl PromptToolProvider {
    pub fn new(inner: Arc<dyn LlmProvider>) -> Self {
        Self { inner }
    }

    fn rewrite_request(&self, req: &ChatRequest) -> ChatRequest {
        let mut messages = Vec::with_capacity(req.messages.len() + 1);
        let leading_system = req.messages.iter().take_while(|m| m.role == Role::System).count();
        messages.extend(req.messages[..leading_system].iter().cloned());
        if !req.tools.is_empty() {
            messages.push(Message::system(render_catalog(&req.tools)));
        }
        messages.extend(req.messages[leading_system..].iter().map(to_plain_text));

        ChatRequest {
            messages,
            tools: Vec::new(),
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            model: req.model.clone(),
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Outgoing: catalog and history as text
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Describe the tools and the calling convention.
pub fn render_catalog(tools: &[ToolDefinition]) -> String {
    let mut out = String::from("Available tools:\n");
    for tool in tools {
        out.push_str(&format!("- {}: {}", tool.name, tool.description));
        let params: Vec<&str> = tool
            .parameters
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
            .unwrap_or_default();
        if !params.is_empty() {
            out.push_str(&format!(" (parameters: {})", params.join(", ")));
        }
        out.push('\n');
    }
    out.push_str(&format!(
        "\nTo use a tool, reply with one line per call: {TOOL_CALL_PREFIX} tool_name {{\"param1\": \"value1\", \"param2\": \"value2\"}}"
    ));
    out
}

fn tool_call_line(name: &str, input: &Value) -> String {
    format!("{TOOL_CALL_PREFIX} {name} {input}")
}

/// Flatten tool-use and tool-result parts into text the model can read.
fn to_plain_text(msg: &Message) -> Message {
    let MessageContent::Parts(parts) = &msg.content else {
        return match msg.role {
            Role::Tool => Message::user(format!("{TOOL_RESULT_PREFIX} {}", msg.content.extract_all_text())),
            _ => msg.clone(),
        };
    };

    let lines: Vec<String> = parts
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => text.clone(),
            ContentPart::ToolUse { name, input, .. } => tool_call_line(name, input),
            ContentPart::ToolResult { content, is_error, .. } if *is_error => {
                format!("{TOOL_RESULT_PREFIX} (error) {content}")
            }
            ContentPart::ToolResult { content, .. } => format!("{TOOL_RESULT_PREFIX} {content}"),
        })
        .collect();
    let text = lines.join("\n");

    match msg.role {
        Role::Tool => Message::user(text),
        Role::Assistant => Message::assistant(text),
        Role::System => Message::system(text),
        Role::User => Message::user(text),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Incoming: TOOL_CALL lines
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Split the model's text into the remaining prose and the requested calls.
pub fn parse_tool_calls(text: &str) -> (String, Vec<ToolCall>) {
    let mut prose = Vec::new();
    let mut calls = Vec::new();

    for line in text.lines() {
        match line.trim().strip_prefix(TOOL_CALL_PREFIX).and_then(parse_call_line) {
            Some(call) => calls.push(call),
            None => prose.push(line),
        }
    }

    (prose.join("\n").trim().to_string(), calls)
}

fn parse_call_line(rest: &str) -> Option<ToolCall> {
    let rest = rest.trim();
    let (name, raw_args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return None;
    }

    let arguments = if raw_args.is_empty() {
        Value::Object(Default::default())
    } else {
        serde_json::from_str(raw_args).unwrap_or_else(|_| {
            let mut raw = serde_json::Map::new();
            raw.insert(RAW_ARGUMENTS_KEY.to_string(), Value::String(raw_args.to_string()));
            Value::Object(raw)
        })
    };

    Some(ToolCall {
        call_id: format!("call_{}", uuid::Uuid::new_v4().simple()),
        tool_name: name.to_string(),
        arguments,
    })
}

#[async_trait::async_trait]
impl LlmProvider for PromptToolProvider {
    async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
        let rewritten = self.rewrite_request(req);
        let mut resp = self.inner.chat(&rewritten).await?;

        let (content, calls) = parse_tool_calls(&resp.content);
        if !calls.is_empty() {
            tracing::debug!(provider = %self.inner.provider_id(), calls = calls.len(), "parsed text tool calls");
            resp.content = content;
            resp.tool_calls = calls;
            resp.finish_reason = Some("tool_calls".into());
        }
        Ok(resp)
    }

    fn provider_id(&self) -> &str {
        self.inner.provider_id()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    /// Records the request it receives and answers with fixed text.
    struct Echo {
        reply: String,
        seen: Mutex<Vec<ChatRequest>>,
    }

    #[async_trait::async_trait]
    impl LlmProvider for Echo {
        async fn chat(&self, req: &ChatRequest) -> Result<ChatResponse> {
            self.seen.lock().unwrap().push(req.clone());
            Ok(ChatResponse {
                content: self.reply.clone(),
                model: "echo".into(),
                ..Default::default()
            })
        }

        fn provider_id(&self) -> &str {
            "echo"
        }
    }

    fn square_root() -> ToolDefinition {
        ToolDefinition {
            name: "square_root".into(),
            description: "Square root of a number".into(),
            parameters: json!({
                "type": "object",
                "properties": { "number": { "type": "number" } },
                "required": ["number"]
            }),
        }
    }

    #[test]
    fn parses_call_lines_and_keeps_prose() {
        let (prose, calls) = parse_tool_calls("Let me compute that.\nTOOL_CALL: square_root {\"number\": 15}\n");
        assert_eq!(prose, "Let me compute that.");
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].tool_name, "square_root");
        assert_eq!(calls[0].arguments, json!({ "number": 15 }));
        assert!(calls[0].call_id.starts_with("call_"));
    }

    #[test]
    fn several_calls_get_distinct_ids() {
        let (_, calls) = parse_tool_calls("  TOOL_CALL: add {\"a\": 1, \"b\": 2}\nTOOL_CALL: ping");
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].tool_name, "ping");
        assert_eq!(calls[1].arguments, json!({}));
        assert_ne!(calls[0].call_id, calls[1].call_id);
    }

    #[test]
    fn malformed_json_is_kept_raw() {
        let (_, calls) = parse_tool_calls("TOOL_CALL: add {a: 1}");
        assert_eq!(calls[0].arguments, json!({ "_raw": "{a: 1}" }));
    }

    #[test]
    fn bare_prefix_is_prose() {
        let (prose, calls) = parse_tool_calls("TOOL_CALL:");
        assert!(calls.is_empty());
        assert_eq!(prose, "TOOL_CALL:");
    }

    #[test]
    fn catalog_lists_tools_and_parameters() {
        let text = render_catalog(&[square_root()]);
        assert!(text.contains("- square_root: Square root of a number (parameters: number)"));
        assert!(text.contains("TOOL_CALL: tool_name"));
    }

    #[tokio::test]
    async fn wraps_inner_provider() {
        let echo = Arc::new(Echo {
            reply: "TOOL_CALL: square_root {\"number\": 15}".into(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = PromptToolProvider::new(echo.clone());

        let call = ToolCall {
            call_id: "c0".into(),
            tool_name: "square_root".into(),
            arguments: json!({ "number": 4 }),
        };
        let req = ChatRequest {
            messages: vec![
                Message::system("be brief"),
                Message::user("root of 4?"),
                Message::assistant_tool_use("", std::slice::from_ref(&call)),
                Message::tool_result("c0", "2"),
                Message::user("and 15?"),
            ],
            tools: vec![square_root()],
            ..Default::default()
        };

        let resp = provider.chat(&req).await.unwrap();
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].arguments, json!({ "number": 15 }));
        assert_eq!(resp.content, "");
        assert_eq!(resp.finish_reason.as_deref(), Some("tool_calls"));
        assert_eq!(provider.provider_id(), "echo");

        let seen = echo.seen.lock().unwrap();
        let sent = &seen[0];
        assert!(sent.tools.is_empty());
        assert_eq!(sent.messages.len(), 6);
        assert_eq!(sent.messages[0], Message::system("be brief"));
        assert_eq!(sent.messages[1].role, Role::System);
        assert!(sent.messages[1].content.extract_all_text().contains("square_root"));
        assert_eq!(sent.messages[3], Message::assistant("TOOL_CALL: square_root {\"number\":4}"));
        assert_eq!(sent.messages[4], Message::user("Tool result: 2"));
    }

    #[tokio::test]
    async fn plain_answers_pass_through() {
        let echo = Arc::new(Echo {
            reply: "The answer is 3.87".into(),
            seen: Mutex::new(Vec::new()),
        });
        let provider = PromptToolProvider::new(echo);
        let resp = provider
            .chat(&ChatRequest {
                messages: vec![Message::user("hi")],
                ..Default::default()
            })
            .await
            .unwrap();
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.content, "The answer is 3.87");
    }
}
