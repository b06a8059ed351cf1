use std::time::Duration;

use crate::transport::TransportError;

/// Errors specific to MCP operations.
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("MCP transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("MCP protocol error: {0}")]
    Protocol(String),

    #[error("failed to launch MCP server '{server}': {message}")]
    Launch { server: String, message: String },

    #[error("MCP server '{server}' did not complete the handshake within {timeout:?}")]
    ConnectTimeout { server: String, timeout: Duration },

    #[error("MCP server not found: {0}")]
    ServerNotFound(String),

    #[error("MCP server is down: {0}")]
    ServerDown(String),

    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("tool '{tool}' did not answer within {timeout:?}")]
    ToolTimeout { tool: String, timeout: Duration },

    #[error("invalid arguments for tool '{tool}': {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("tool '{tool}' is provided by both '{kept}' and '{rejected}'")]
    ToolConflict {
        tool: String,
        kept: String,
        rejected: String,
    },
}

impl From<McpError> for mcx_domain::error::Error {
    fn from(e: McpError) -> Self {
        match e {
            McpError::ConnectTimeout { .. } | McpError::ToolTimeout { .. } => mcx_domain::error::Error::Timeout(e.to_string()),
            other => mcx_domain::error::Error::Other(other.to_string()),
        }
    }
}
