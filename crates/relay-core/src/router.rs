//! Tool routing across server connections
//!
//! The router owns the active connection set and the aggregated tool
//! catalog. It answers one question: which connection does a named tool
//! belong to, and it forwards invocations there verbatim. No retries and no
//! timeouts of its own; transport failures propagate as-is.

use std::collections::HashMap;

use serde_json::Value;

use relay_mcp::client::ToolCallResult;

use crate::connection::ServerConnection;
use crate::error::{Error, Result};

/// One catalog entry: a tool and the server connection that owns it.
///
/// Built fresh on every catalog refresh, never persisted.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    /// Parameter schema, presented to the model verbatim
    pub input_schema: Value,
    /// Identifier of the owning server
    pub server: String,
}

/// Maps tool identifiers to owning connections and dispatches invocations
pub struct ToolRouter {
    connections: Vec<ServerConnection>,
    catalog: HashMap<String, ToolDescriptor>,
}

impl ToolRouter {
    pub fn new(connections: Vec<ServerConnection>) -> Self {
        Self {
            connections,
            catalog: HashMap::new(),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connections(&self) -> impl Iterator<Item = &ServerConnection> {
        self.connections.iter()
    }

    /// Snapshot of the aggregated catalog, sorted by tool name
    pub fn catalog(&self) -> Vec<ToolDescriptor> {
        let mut tools: Vec<ToolDescriptor> = self.catalog.values().cloned().collect();
        tools.sort_by(|a, b| a.name.cmp(&b.name));
        tools
    }

    /// Rebuild the aggregated catalog from every active connection.
    ///
    /// A server answering tools/list with "method not found" exposes zero
    /// tools; any other failure skips that connection's tools. Identifiers
    /// are assumed globally unique; on a collision the later connection
    /// wins ownership.
    pub async fn refresh_catalog(&mut self) {
        let mut catalog: HashMap<String, ToolDescriptor> = HashMap::new();

        for connection in &self.connections {
            let tools = match connection.list_tools().await {
                Ok(tools) => tools,
                Err(e) if e.is_method_not_found() => {
                    tracing::debug!(server = connection.name(), "server exposes no tools");
                    Vec::new()
                }
                Err(e) => {
                    tracing::warn!(
                        server = connection.name(),
                        error = %e,
                        "failed to list tools, skipping server"
                    );
                    continue;
                }
            };

            for tool in tools {
                let descriptor = ToolDescriptor {
                    name: tool.name.clone(),
                    description: tool.description,
                    input_schema: tool.input_schema,
                    server: connection.name().to_string(),
                };
                if let Some(previous) = catalog.insert(tool.name.clone(), descriptor) {
                    tracing::warn!(
                        tool = %tool.name,
                        previous_owner = %previous.server,
                        new_owner = connection.name(),
                        "duplicate tool identifier, later server wins"
                    );
                }
            }
        }

        tracing::info!(
            tool_count = catalog.len(),
            server_count = self.connections.len(),
            "tool catalog refreshed"
        );
        self.catalog = catalog;
    }

    /// Forward one tool invocation to the owning connection.
    ///
    /// Fails with `ToolNotFound` for identifiers absent from the catalog and
    /// `RouteNotFound` when the catalog references a connection that is no
    /// longer active. The connection's result is returned verbatim.
    pub async fn dispatch(&self, tool: &str, arguments: Value) -> Result<ToolCallResult> {
        let descriptor = self
            .catalog
            .get(tool)
            .ok_or_else(|| Error::ToolNotFound(tool.to_string()))?;

        let connection = self
            .connections
            .iter()
            .find(|c| c.name() == descriptor.server)
            .ok_or_else(|| Error::RouteNotFound {
                tool: tool.to_string(),
                server: descriptor.server.clone(),
            })?;

        tracing::debug!(tool = %tool, server = %descriptor.server, "dispatching tool call");

        connection
            .call_tool(tool, arguments)
            .await
            .map_err(|e| Error::Transport(e.to_string()))
    }

    /// Disconnect every connection and drop the catalog
    pub async fn shutdown(&mut self) {
        for connection in self.connections.drain(..) {
            connection.disconnect().await;
        }
        self.catalog.clear();
    }
}
