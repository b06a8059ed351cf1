//! A live connection to one MCP server.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::error::McpError;
use crate::protocol::{self, Implementation, InitializeResult, McpToolDef, ToolCallParams, ToolCallResult, ToolsListResult};
use crate::transport::McpTransport;
use mcx_domain::config::ServerDescriptor;

/// Result of a successful handshake.
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub server_info: Option<Implementation>,
    pub tools: Vec<McpToolDef>,
}

/// Perform the MCP handshake over `transport`: `initialize`, then
/// `notifications/initialized`, then `tools/list`.
pub async fn handshake(server: &str, transport: &dyn McpTransport) -> Result<Handshake, McpError> {
    let params = serde_json::to_value(protocol::initialize_params())
        .map_err(|e| McpError::Protocol(format!("failed to serialize initialize params: {e}")))?;

    let init: InitializeResult = match transport.send_request("initialize", Some(params)).await?.into_result() {
        Ok(value) => serde_json::from_value(value).unwrap_or_else(|e| {
            tracing::warn!(server, error = %e, "malformed initialize result, continuing without server info");
            InitializeResult::default()
        }),
        Err(err) => return Err(McpError::Protocol(format!("initialize failed: {err}"))),
    };

    if !init.protocol_version.is_empty() && init.protocol_version != protocol::PROTOCOL_VERSION {
        tracing::debug!(
            server,
            server_version = %init.protocol_version,
            "MCP server negotiated a different protocol version"
        );
    }

    transport.send_notification("notifications/initialized").await?;

    let tools = match transport.send_request("tools/list", None).await?.into_result() {
        Ok(value) => serde_json::from_value::<ToolsListResult>(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/list result: {e}")))?
            .tools,
        Err(err) => return Err(McpError::Protocol(format!("tools/list failed: {err}"))),
    };

    Ok(Handshake {
        server_info: init.server_info,
        tools,
    })
}

/// An initialized server: its descriptor, the tools it advertised and the
/// transport used to reach it.
///
/// `call_lock` admits one `tools/call` at a time, so a call's time bound
/// starts when it reaches the server rather than when it starts queueing.
pub struct ServerConnection {
    descriptor: ServerDescriptor,
    server_info: Option<Implementation>,
    tools: Vec<McpToolDef>,
    transport: Box<dyn McpTransport>,
    call_lock: Mutex<()>,
}

impl ServerConnection {
    pub fn new(descriptor: ServerDescriptor, handshake: Handshake, transport: Box<dyn McpTransport>) -> Self {
        Self {
            descriptor,
            server_info: handshake.server_info,
            tools: handshake.tools,
            transport,
            call_lock: Mutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn description(&self) -> &str {
        &self.descriptor.description
    }

    pub fn descriptor(&self) -> &ServerDescriptor {
        &self.descriptor
    }

    /// Name and version the server reported during `initialize`.
    pub fn server_info(&self) -> Option<&Implementation> {
        self.server_info.as_ref()
    }

    pub fn tools(&self) -> &[McpToolDef] {
        &self.tools
    }

    pub fn is_alive(&self) -> bool {
        self.transport.is_alive()
    }

    /// Call a tool on this server.
    pub async fn call_tool(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        let _turn = self.call_lock.lock().await;
        self.send_call(tool_name, arguments).await
    }

    /// Call a tool, giving up after `timeout`. The clock starts once earlier
    /// calls to this server have finished.
    pub async fn call_tool_within(
        &self,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<ToolCallResult, McpError> {
        let _turn = self.call_lock.lock().await;
        match tokio::time::timeout(timeout, self.send_call(tool_name, arguments)).await {
            Ok(result) => result,
            Err(_) => Err(McpError::ToolTimeout {
                tool: tool_name.to_string(),
                timeout,
            }),
        }
    }

    async fn send_call(&self, tool_name: &str, arguments: Value) -> Result<ToolCallResult, McpError> {
        if !self.transport.is_alive() {
            return Err(McpError::ServerDown(self.name().to_string()));
        }

        let params = serde_json::to_value(ToolCallParams {
            name: tool_name.to_string(),
            arguments,
        })
        .map_err(|e| McpError::Protocol(format!("failed to serialize tools/call params: {e}")))?;

        let value = self
            .transport
            .send_request("tools/call", Some(params))
            .await?
            .into_result()
            .map_err(|err| McpError::Protocol(format!("tools/call failed: {err}")))?;

        serde_json::from_value::<ToolCallResult>(value)
            .map_err(|e| McpError::Protocol(format!("failed to parse tools/call result: {e}")))
    }

    pub async fn shutdown(&self) {
        tracing::info!(server = %self.name(), "shutting down MCP server");
        self.transport.shutdown().await;
    }
}

impl std::fmt::Debug for ServerConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerConnection")
            .field("name", &self.descriptor.name)
            .field("tools", &self.tools.len())
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeServer, FakeTransport};
    use serde_json::json;

    #[tokio::test]
    async fn handshake_sends_initialize_then_notification_then_list() {
        let server = FakeServer::new("calculator").tool("add", json!({ "type": "object" }));
        let transport = FakeTransport::new(server);
        let hs = handshake("calculator", &transport).await.unwrap();

        assert_eq!(hs.tools.len(), 1);
        assert_eq!(hs.server_info.unwrap().name, "calculator");
        assert_eq!(
            transport.methods(),
            vec!["initialize", "notifications/initialized", "tools/list"]
        );
    }

    #[tokio::test]
    async fn initialize_error_fails_handshake() {
        let server = FakeServer::new("broken").fail_initialize();
        let transport = FakeTransport::new(server);
        let err = handshake("broken", &transport).await.unwrap_err();
        assert!(err.to_string().contains("initialize failed"));
    }

    #[tokio::test]
    async fn malformed_initialize_result_still_lists_tools() {
        let server = FakeServer::new("calculator")
            .malformed_initialize()
            .tool("add", json!({ "type": "object" }));
        let transport = FakeTransport::new(server);
        let hs = handshake("calculator", &transport).await.unwrap();

        assert!(hs.server_info.is_none());
        assert_eq!(hs.tools.len(), 1);
        assert_eq!(
            transport.methods(),
            vec!["initialize", "notifications/initialized", "tools/list"]
        );
    }

    #[tokio::test]
    async fn call_tool_forwards_name_and_arguments() {
        let server = FakeServer::new("calculator")
            .tool("add", json!({ "type": "object" }))
            .respond("add", |args| {
                let sum = args["a"].as_f64().unwrap_or(0.0) + args["b"].as_f64().unwrap_or(0.0);
                Ok(sum.to_string())
            });
        let transport = FakeTransport::new(server);
        let hs = handshake("calculator", &transport).await.unwrap();
        let conn = ServerConnection::new(
            ServerDescriptor::from_script("calculator.py"),
            hs,
            Box::new(transport),
        );

        let result = conn.call_tool("add", json!({ "a": 2, "b": 3 })).await.unwrap();
        assert_eq!(result.joined_text(), "5");
        assert!(!result.is_error);
    }

    #[tokio::test(start_paused = true)]
    async fn queued_call_gets_its_full_time_bound() {
        let server = FakeServer::new("calculator")
            .tool("add", json!({ "type": "object" }))
            .respond("add", |_| Ok("ok".into()))
            .slow_calls(Duration::from_secs(3));
        let transport = FakeTransport::new(server);
        let hs = handshake("calculator", &transport).await.unwrap();
        let conn = ServerConnection::new(
            ServerDescriptor::from_script("calculator.py"),
            hs,
            Box::new(transport),
        );

        let start = tokio::time::Instant::now();
        let bound = Duration::from_secs(5);
        let (first, second) = tokio::join!(
            conn.call_tool_within("add", json!({}), bound),
            conn.call_tool_within("add", json!({}), bound),
        );

        assert_eq!(first.unwrap().joined_text(), "ok");
        assert_eq!(second.unwrap().joined_text(), "ok");
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn call_over_its_bound_times_out() {
        let server = FakeServer::new("calculator")
            .tool("add", json!({ "type": "object" }))
            .slow_calls(Duration::from_secs(60));
        let transport = FakeTransport::new(server);
        let hs = handshake("calculator", &transport).await.unwrap();
        let conn = ServerConnection::new(
            ServerDescriptor::from_script("calculator.py"),
            hs,
            Box::new(transport),
        );

        let err = conn
            .call_tool_within("add", json!({}), Duration::from_secs(2))
            .await
            .unwrap_err();
        assert!(matches!(err, McpError::ToolTimeout { ref tool, .. } if tool == "add"));
    }

    #[tokio::test]
    async fn call_on_dead_server_is_rejected() {
        let transport = FakeTransport::new(FakeServer::new("calculator"));
        let hs = handshake("calculator", &transport).await.unwrap();
        let conn = ServerConnection::new(
            ServerDescriptor::from_script("calculator.py"),
            hs,
            Box::new(transport),
        );
        conn.shutdown().await;
        let err = conn.call_tool("add", json!({})).await.unwrap_err();
        assert!(matches!(err, McpError::ServerDown(name) if name == "calculator"));
    }
}
