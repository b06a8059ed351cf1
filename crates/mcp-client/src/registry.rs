//! Aggregate tool registry: which server owns which tool name.

use std::collections::HashMap;

use crate::error::McpError;
use crate::protocol::McpToolDef;
use crate::schema::ToolSchema;
use mcx_domain::config::ConflictPolicy;
use mcx_domain::tool::ToolDefinition;

/// A tool as the rest of the client sees it.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEntry {
    pub name: String,
    pub description: String,
    pub schema: ToolSchema,
    /// Name of the server that owns this tool.
    pub server: String,
}

impl ToolEntry {
    pub fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name.clone(),
            description: self.description.clone(),
            parameters: self.schema.as_value().clone(),
        }
    }
}

/// A tool name advertised by more than one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConflict {
    pub tool: String,
    /// The server that owns the name.
    pub kept: String,
    /// The server whose definition was ignored.
    pub rejected: String,
}

/// Tool name → owning server, built once after connecting.
#[derive(Debug, Clone, Default)]
pub struct ToolRegistry {
    entries: Vec<ToolEntry>,
    index: HashMap<String, usize>,
    conflicts: Vec<ToolConflict>,
}

impl ToolRegistry {
    /// Build from `(server name, tools)` pairs given in configuration order.
    ///
    /// Under [`ConflictPolicy::FirstWins`] the first server to advertise a
    /// name owns it and later duplicates are recorded as conflicts. Under
    /// [`ConflictPolicy::Fail`] the first duplicate is returned as an error.
    /// A server repeating one of its own tools is not a conflict; the repeat
    /// is dropped under either policy.
    pub fn build<'a, I>(servers: I, policy: ConflictPolicy) -> Result<Self, McpError>
    where
        I: IntoIterator<Item = (&'a str, &'a [McpToolDef])>,
    {
        let mut registry = Self::default();

        for (server, tools) in servers {
            for tool in tools {
                if let Some(&existing) = registry.index.get(&tool.name) {
                    if registry.entries[existing].server == server {
                        tracing::warn!(
                            server,
                            tool = %tool.name,
                            "server lists the same tool twice, keeping the first definition"
                        );
                        continue;
                    }
                    let conflict = ToolConflict {
                        tool: tool.name.clone(),
                        kept: registry.entries[existing].server.clone(),
                        rejected: server.to_string(),
                    };
                    if policy == ConflictPolicy::Fail {
                        return Err(McpError::ToolConflict {
                            tool: conflict.tool,
                            kept: conflict.kept,
                            rejected: conflict.rejected,
                        });
                    }
                    tracing::warn!(
                        tool = %conflict.tool,
                        kept = %conflict.kept,
                        rejected = %conflict.rejected,
                        "duplicate tool name, keeping the first server's definition"
                    );
                    registry.conflicts.push(conflict);
                    continue;
                }

                registry.index.insert(tool.name.clone(), registry.entries.len());
                registry.entries.push(ToolEntry {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    schema: ToolSchema::new(tool.input_schema.clone()),
                    server: server.to_string(),
                });
            }
        }

        Ok(registry)
    }

    pub fn get(&self, name: &str) -> Option<&ToolEntry> {
        self.index.get(name).map(|&i| &self.entries[i])
    }

    /// Entries in registration order (configuration order, then the order
    /// each server listed its tools).
    pub fn entries(&self) -> &[ToolEntry] {
        &self.entries
    }

    /// The catalog handed to the model.
    pub fn catalog(&self) -> Vec<ToolDefinition> {
        self.entries.iter().map(ToolEntry::definition).collect()
    }

    /// `(tool, server)` pairs sorted by tool name.
    pub fn listing(&self) -> Vec<(&str, &str)> {
        let mut rows: Vec<(&str, &str)> = self
            .entries
            .iter()
            .map(|e| (e.name.as_str(), e.server.as_str()))
            .collect();
        rows.sort_unstable();
        rows
    }

    pub fn conflicts(&self) -> &[ToolConflict] {
        &self.conflicts
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of tools owned by `server`.
    pub fn owned_by(&self, server: &str) -> usize {
        self.entries.iter().filter(|e| e.server == server).count()
    }
}
