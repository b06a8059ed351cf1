//! MCP manager: connects every enabled server, keeps the live connections
//! and the tool registry built from them.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Semaphore;

use crate::connection::{handshake, ServerConnection};
use crate::dispatch::Dispatcher;
use crate::error::McpError;
use crate::protocol::ToolCallResult;
use crate::registry::ToolRegistry;
use crate::retry::RetryPolicy;
use crate::transport::{McpTransport, StdioTransport};
use mcx_domain::config::{GlobalSettings, ServerDescriptor};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Connector
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Launches the process behind a descriptor and returns a transport to it.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn launch(&self, server: &ServerDescriptor) -> Result<Box<dyn McpTransport>, McpError>;
}

/// Launches servers as child processes speaking MCP over stdio.
#[derive(Debug, Clone)]
pub struct StdioConnector {
    request_timeout: Duration,
}

impl StdioConnector {
    /// `request_timeout` bounds each request/response cycle.
    pub fn new(request_timeout: Duration) -> Self {
        Self { request_timeout }
    }
}

#[async_trait]
impl Connector for StdioConnector {
    async fn launch(&self, server: &ServerDescriptor) -> Result<Box<dyn McpTransport>, McpError> {
        let transport = StdioTransport::spawn(server, self.request_timeout).map_err(|e| McpError::Launch {
            server: server.name.clone(),
            message: e.to_string(),
        })?;
        Ok(Box::new(transport))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// McpManager
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An enabled server that could not be connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreachableServer {
    pub name: String,
    pub description: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Holds every live server connection and the registry built from them.
pub struct McpManager {
    connections: Vec<ServerConnection>,
    unreachable: Vec<UnreachableServer>,
    registry: ToolRegistry,
    tool_timeout: Duration,
}

impl McpManager {
    /// A manager with no servers.
    pub fn empty() -> Self {
        Self {
            connections: Vec::new(),
            unreachable: Vec::new(),
            registry: ToolRegistry::default(),
            tool_timeout: GlobalSettings::default().tool_timeout(),
        }
    }

    /// Connect every enabled server in `servers`.
    ///
    /// At most `concurrent_connections` handshakes run at once. Servers that
    /// fail every attempt are recorded as unreachable and skipped; the only
    /// error returned is a tool-name conflict under the `fail` policy.
    pub async fn connect_all(
        servers: &[ServerDescriptor],
        settings: &GlobalSettings,
        connector: &dyn Connector,
    ) -> Result<Self, McpError> {
        let policy = RetryPolicy::from_settings(settings);
        let limiter = Semaphore::new(settings.concurrent_connections.max(1));
        let timeout = settings.connection_timeout();

        let enabled: Vec<&ServerDescriptor> = servers.iter().filter(|s| s.enabled).collect();
        for skipped in servers.iter().filter(|s| !s.enabled) {
            tracing::debug!(server = %skipped.name, "server disabled, skipping");
        }

        let futs = enabled.iter().map(|server| {
            let limiter = &limiter;
            let policy = &policy;
            async move {
                let _permit = limiter.acquire().await;
                connect_with_retry(server, connector, policy, timeout).await
            }
        });
        // join_all keeps input order, so results follow configuration order.
        let results = futures_util::future::join_all(futs).await;

        let mut connections = Vec::new();
        let mut unreachable = Vec::new();
        for result in results {
            match result {
                Ok(conn) => connections.push(conn),
                Err(down) => unreachable.push(down),
            }
        }

        let registry = match ToolRegistry::build(
            connections.iter().map(|c| (c.name(), c.tools())),
            settings.on_tool_conflict,
        ) {
            Ok(registry) => registry,
            Err(e) => {
                let shutdowns: Vec<_> = connections.iter().map(|c| c.shutdown()).collect();
                futures_util::future::join_all(shutdowns).await;
                return Err(e);
            }
        };

        if connections.is_empty() && !enabled.is_empty() {
            tracing::warn!("no MCP server could be reached, continuing without tools");
        } else {
            tracing::info!(
                servers = connections.len(),
                unreachable = unreachable.len(),
                tools = registry.len(),
                "MCP manager ready"
            );
        }

        Ok(Self {
            connections,
            unreachable,
            registry,
            tool_timeout: settings.tool_timeout(),
        })
    }

    /// Live connections in configuration order.
    pub fn connections(&self) -> &[ServerConnection] {
        &self.connections
    }

    pub fn connection(&self, name: &str) -> Option<&ServerConnection> {
        self.connections.iter().find(|c| c.name() == name)
    }

    pub fn unreachable(&self) -> &[UnreachableServer] {
        &self.unreachable
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Dispatcher routing tool calls through this manager's registry.
    pub fn dispatcher(&self) -> Dispatcher<'_> {
        Dispatcher::new(self, self.tool_timeout)
    }

    /// Call a tool on a specific server.
    pub async fn call_tool(
        &self,
        server: &str,
        tool_name: &str,
        arguments: Value,
    ) -> Result<ToolCallResult, McpError> {
        let conn = self
            .connection(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
        conn.call_tool(tool_name, arguments).await
    }

    /// Call a tool on a specific server, bounded by `timeout` once the
    /// server is free to take the call.
    pub async fn call_tool_within(
        &self,
        server: &str,
        tool_name: &str,
        arguments: Value,
        timeout: Duration,
    ) -> Result<ToolCallResult, McpError> {
        let conn = self
            .connection(server)
            .ok_or_else(|| McpError::ServerNotFound(server.to_string()))?;
        conn.call_tool_within(tool_name, arguments, timeout).await
    }

    pub fn server_count(&self) -> usize {
        self.connections.len()
    }

    pub fn tool_count(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Shut down every connection concurrently.
    pub async fn shutdown(&self) {
        let futs: Vec<_> = self.connections.iter().map(|c| c.shutdown()).collect();
        futures_util::future::join_all(futs).await;
    }
}

async fn connect_with_retry(
    server: &ServerDescriptor,
    connector: &dyn Connector,
    policy: &RetryPolicy,
    timeout: Duration,
) -> Result<ServerConnection, UnreachableServer> {
    let mut attempts = 0u32;
    loop {
        attempts += 1;
        tracing::info!(server = %server.name, attempt = attempts, "connecting to MCP server");

        match connect_once(server, connector, timeout).await {
            Ok(conn) => {
                tracing::info!(
                    server = %server.name,
                    tools = conn.tools().len(),
                    "MCP server connected"
                );
                return Ok(conn);
            }
            Err(e) => {
                tracing::warn!(server = %server.name, attempt = attempts, error = %e, "connection attempt failed");
                if !policy.can_retry(attempts) {
                    return Err(UnreachableServer {
                        name: server.name.clone(),
                        description: server.description.clone(),
                        attempts,
                        last_error: e.to_string(),
                    });
                }
                tokio::time::sleep(policy.delay_after(attempts - 1)).await;
            }
        }
    }
}

async fn connect_once(
    server: &ServerDescriptor,
    connector: &dyn Connector,
    timeout: Duration,
) -> Result<ServerConnection, McpError> {
    let transport = connector.launch(server).await?;

    let outcome = tokio::time::timeout(timeout, handshake(&server.name, transport.as_ref())).await;
    match outcome {
        Ok(Ok(hs)) => Ok(ServerConnection::new(server.clone(), hs, transport)),
        Ok(Err(e)) => {
            transport.shutdown().await;
            Err(e)
        }
        Err(_) => {
            transport.shutdown().await;
            Err(McpError::ConnectTimeout {
                server: server.name.clone(),
                timeout,
            })
        }
    }
}
