//! Model session: one conversation, one provider, one set of MCP servers.
//!
//! Each query runs the tool loop: call the model, dispatch whatever tools it
//! asks for, feed the results back, and repeat until the model answers
//! without tools or the round limit is hit.

use std::sync::Arc;

use mcx_domain::config::GlobalSettings;
use mcx_domain::error::Result;
use mcx_domain::tool::{Message, Usage};
use mcx_mcp_client::{McpManager, ToolOutcome};
use mcx_providers::{ChatRequest, LlmProvider};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Conversation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Ordered message history of a session. Lives in memory only.
#[derive(Debug, Clone, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    fn push(&mut self, msg: Message) {
        self.messages.push(msg);
    }

    fn truncate(&mut self, len: usize) {
        self.messages.truncate(len);
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Turn report
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// What one query produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnReport {
    /// The model's final text. May be empty when the round limit was hit.
    pub answer: String,
    /// Every dispatched call, in the order the model requested them.
    pub tool_calls: Vec<ToolOutcome>,
    /// Number of tool rounds executed.
    pub rounds: u32,
    pub usage: Usage,
    pub limit_reached: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// ChatSession
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ChatSession {
    provider: Arc<dyn LlmProvider>,
    manager: McpManager,
    conversation: Conversation,
    max_tool_rounds: u32,
}

impl ChatSession {
    pub fn new(provider: Arc<dyn LlmProvider>, manager: McpManager, settings: &GlobalSettings) -> Self {
        Self {
            provider,
            manager,
            conversation: Conversation::default(),
            max_tool_rounds: settings.max_tool_rounds,
        }
    }

    pub fn manager(&self) -> &McpManager {
        &self.manager
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn max_tool_rounds(&self) -> u32 {
        self.max_tool_rounds
    }

    /// Answer one user query.
    ///
    /// Tool failures are handed to the model as error results. A provider
    /// error ends the query and restores the conversation to what it was
    /// before the query started.
    pub async fn ask(&mut self, query: &str) -> Result<TurnReport> {
        let checkpoint = self.conversation.len();
        self.conversation.push(Message::user(query));

        match self.run_tool_loop().await {
            Ok(report) => Ok(report),
            Err(e) => {
                tracing::warn!(provider = %self.provider.provider_id(), error = %e, "query failed, conversation rolled back");
                self.conversation.truncate(checkpoint);
                Err(e)
            }
        }
    }

    async fn run_tool_loop(&mut self) -> Result<TurnReport> {
        let catalog = self.manager.registry().catalog();
        let mut report = TurnReport::default();

        loop {
            let req = ChatRequest {
                messages: self.conversation.messages().to_vec(),
                tools: catalog.clone(),
                ..Default::default()
            };
            let resp = self.provider.chat(&req).await?;
            if let Some(u) = &resp.usage {
                report.usage.add(u);
            }

            if resp.tool_calls.is_empty() {
                if !resp.content.is_empty() {
                    self.conversation.push(Message::assistant(resp.content.clone()));
                }
                report.answer = resp.content;
                return Ok(report);
            }

            if report.rounds >= self.max_tool_rounds {
                tracing::warn!(rounds = report.rounds, "tool round limit reached, stopping");
                report.answer = resp.content;
                report.limit_reached = true;
                return Ok(report);
            }

            report.rounds += 1;
            tracing::debug!(round = report.rounds, calls = resp.tool_calls.len(), "tool round");

            self.conversation
                .push(Message::assistant_tool_use(&resp.content, &resp.tool_calls));
            let outcomes = self.manager.dispatcher().dispatch_all(&resp.tool_calls).await;
            self.conversation.push(Message::tool_results(
                outcomes
                    .iter()
                    .map(|o| (o.call_id.clone(), o.content.clone(), o.is_error)),
            ));
            report.tool_calls.extend(outcomes);
        }
    }

    /// Shut down every server connection.
    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
    }
}
