//! Tool-call dispatch: resolve the owner, validate arguments, forward, and
//! turn whatever happens into a [`ToolOutcome`].

use std::time::Duration;

use serde_json::Value;

use crate::error::McpError;
use crate::manager::McpManager;
use crate::protocol::ToolCallResult;
use crate::registry::ToolEntry;
use mcx_domain::tool::ToolCall;

/// What happened to one tool call. Failures are outcomes too: the model is
/// told about them instead of the query being aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolOutcome {
    pub call_id: String,
    pub tool_name: String,
    /// Owning server, when the tool was found.
    pub server: Option<String>,
    pub arguments: Value,
    pub content: String,
    pub is_error: bool,
}

impl ToolOutcome {
    fn failed(call: &ToolCall, server: Option<String>, err: &McpError) -> Self {
        Self {
            call_id: call.call_id.clone(),
            tool_name: call.tool_name.clone(),
            server,
            arguments: call.arguments.clone(),
            content: format!("Error: {err}"),
            is_error: true,
        }
    }
}

/// A call whose tool has been resolved and whose arguments satisfy the
/// tool's schema. Only these are forwarded to a server.
#[derive(Debug, Clone)]
pub struct ValidatedCall<'a> {
    entry: &'a ToolEntry,
    arguments: Value,
}

impl<'a> ValidatedCall<'a> {
    pub fn new(entry: &'a ToolEntry, arguments: Value) -> Result<Self, McpError> {
        entry
            .schema
            .check(&arguments)
            .map_err(|reason| McpError::InvalidArguments {
                tool: entry.name.clone(),
                reason,
            })?;
        let arguments = match arguments {
            Value::Null => Value::Object(Default::default()),
            other => other,
        };
        Ok(Self { entry, arguments })
    }

    pub fn tool(&self) -> &str {
        &self.entry.name
    }

    pub fn server(&self) -> &str {
        &self.entry.server
    }

    pub fn arguments(&self) -> &Value {
        &self.arguments
    }
}

/// Routes tool calls to the servers that own them.
pub struct Dispatcher<'a> {
    manager: &'a McpManager,
    timeout: Duration,
}

impl<'a> Dispatcher<'a> {
    pub(crate) fn new(manager: &'a McpManager, timeout: Duration) -> Self {
        Self { manager, timeout }
    }

    /// Resolve the owning server and validate the arguments.
    pub fn resolve(&self, call: &ToolCall) -> Result<ValidatedCall<'a>, McpError> {
        let entry = self
            .manager
            .registry()
            .get(&call.tool_name)
            .ok_or_else(|| McpError::ToolNotFound(call.tool_name.clone()))?;
        ValidatedCall::new(entry, call.arguments.clone())
    }

    /// Forward a validated call to its owner. The tool timeout covers the
    /// call itself, not the wait behind earlier calls to the same server.
    pub async fn forward(&self, call: &ValidatedCall<'_>) -> Result<ToolCallResult, McpError> {
        self.manager
            .call_tool_within(call.server(), call.tool(), call.arguments.clone(), self.timeout)
            .await
    }

    /// Resolve, validate and forward one call. Never fails: every error
    /// becomes an outcome with `is_error` set.
    pub async fn dispatch(&self, call: &ToolCall) -> ToolOutcome {
        let validated = match self.resolve(call) {
            Ok(v) => v,
            Err(e) => {
                let server = self.manager.registry().get(&call.tool_name).map(|t| t.server.clone());
                tracing::warn!(tool = %call.tool_name, error = %e, "tool call rejected");
                return ToolOutcome::failed(call, server, &e);
            }
        };

        tracing::debug!(tool = %call.tool_name, server = %validated.server(), "dispatching tool call");
        let server = Some(validated.server().to_string());
        match self.forward(&validated).await {
            Ok(result) => {
                if result.is_error {
                    tracing::debug!(tool = %call.tool_name, "tool reported an error");
                }
                ToolOutcome {
                    call_id: call.call_id.clone(),
                    tool_name: call.tool_name.clone(),
                    server,
                    arguments: validated.arguments,
                    content: result.joined_text(),
                    is_error: result.is_error,
                }
            }
            Err(e) => {
                tracing::warn!(tool = %call.tool_name, error = %e, "tool call failed");
                ToolOutcome::failed(call, server, &e)
            }
        }
    }

    /// Dispatch every call concurrently; outcomes are in request order.
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolOutcome> {
        futures_util::future::join_all(calls.iter().map(|c| self.dispatch(c))).await
    }
}
