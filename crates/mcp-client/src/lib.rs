//! `mcx-mcp-client`: MCP (Model Context Protocol) client for mcx.
//!
//! This crate provides:
//! - JSON-RPC 2.0 protocol types for communicating with MCP servers.
//! - A stdio transport that spawns child processes and talks over stdin/stdout.
//! - An `McpManager` that connects many servers concurrently (with retries),
//!   builds the aggregate tool registry and shuts everything down.
//! - A `Dispatcher` that validates tool calls and routes them to the owning
//!   server.
//!
//! # Usage
//!
//! ```rust,ignore
//! use mcx_mcp_client::{McpManager, StdioConnector};
//!
//! let connector = StdioConnector::new(config.settings.tool_timeout());
//! let manager = McpManager::connect_all(&config.servers, &config.settings, &connector).await?;
//!
//! for (tool, server) in manager.registry().listing() {
//!     println!("{tool} -> {server}");
//! }
//!
//! let outcomes = manager.dispatcher().dispatch_all(&tool_calls).await;
//! manager.shutdown().await;
//! ```

pub mod connection;
pub mod dispatch;
pub mod error;
pub mod manager;
pub mod protocol;
pub mod registry;
pub mod retry;
pub mod schema;
pub mod transport;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use connection::ServerConnection;
pub use dispatch::{Dispatcher, ToolOutcome, ValidatedCall};
pub use error::McpError;
pub use manager::{Connector, McpManager, StdioConnector, UnreachableServer};
pub use protocol::McpToolDef;
pub use registry::{ToolConflict, ToolEntry, ToolRegistry};
pub use retry::RetryPolicy;
pub use schema::ToolSchema;
