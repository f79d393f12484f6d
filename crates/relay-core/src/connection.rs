//! MCP server connection lifecycle
//!
//! A `ServerConnection` is an initialized session with one remote server.
//! Connections are created sequentially at session start and torn down at
//! session end; a server that fails to connect is excluded from the active
//! set rather than failing the session.

use relay_mcp::client::{ClientInfo, McpClient, McpError, ServerInfo, ToolCallResult};
use relay_mcp::transport::{HttpTransport, StdioTransport, Transport};
use relay_mcp::{McpResource, McpTool};

use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};

/// An established session with one MCP server
pub struct ServerConnection {
    name: String,
    client: McpClient<Box<dyn Transport>>,
    server_info: ServerInfo,
}

impl ServerConnection {
    /// Connect to a configured server and perform the initialize handshake
    pub async fn connect(name: &str, config: &ServerConfig) -> Result<Self> {
        let transport: Box<dyn Transport> = if let Some(url) = &config.url {
            Box::new(HttpTransport::new(url.clone()))
        } else if let Some(command) = &config.command {
            let env: Vec<(String, String)> = config
                .env
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            Box::new(StdioTransport::spawn(command, &config.args, &env).await?)
        } else {
            return Err(Error::Config(format!(
                "server '{}' has neither a command nor a url",
                name
            )));
        };

        let mut client = McpClient::new(transport);
        let server_info = client
            .initialize(ClientInfo {
                name: "relay".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
            })
            .await
            .map_err(|e| Error::Transport(e.to_string()))?;

        tracing::info!(
            server = name,
            remote_name = %server_info.name,
            remote_version = %server_info.version,
            "connected to MCP server"
        );

        Ok(Self {
            name: name.to_string(),
            client,
            server_info,
        })
    }

    /// Wrap an already-initialized client (used by tests)
    #[cfg(test)]
    pub(crate) fn from_client(name: &str, client: McpClient<Box<dyn Transport>>) -> Self {
        Self {
            name: name.to_string(),
            client,
            server_info: ServerInfo {
                name: name.to_string(),
                version: String::new(),
            },
        }
    }

    /// Configured identifier of this server
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name and version the server reported during initialize
    pub fn server_info(&self) -> &ServerInfo {
        &self.server_info
    }

    pub async fn list_tools(&self) -> std::result::Result<Vec<McpTool>, McpError> {
        self.client.list_tools().await
    }

    pub async fn list_resources(&self) -> std::result::Result<Vec<McpResource>, McpError> {
        self.client.list_resources().await
    }

    pub async fn call_tool(
        &self,
        tool: &str,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolCallResult, McpError> {
        self.client.call_tool(tool, arguments).await
    }

    /// Tear down the underlying transport; failures are logged, not surfaced
    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            tracing::warn!(server = %self.name, error = %e, "error closing connection");
        }
    }
}

/// Establish connections to every enabled server, sequentially.
///
/// A connection failure excludes that server from the active set; it is
/// never fatal here. The caller decides what an empty result means.
pub async fn connect_all(config: &Config) -> Vec<ServerConnection> {
    let mut connections = Vec::new();

    for (name, server) in &config.servers {
        if !server.enabled {
            tracing::debug!(server = %name, "skipping disabled server");
            continue;
        }

        match ServerConnection::connect(name, server).await {
            Ok(connection) => connections.push(connection),
            Err(e) => {
                tracing::warn!(server = %name, error = %e, "failed to connect, excluding server");
            }
        }
    }

    connections
}
