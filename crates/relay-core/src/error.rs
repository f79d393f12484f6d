//! Error types for Relay Core

use thiserror::Error;

/// Result type alias using the Relay Error
pub type Result<T> = std::result::Result<T, Error>;

/// Relay error types
#[derive(Error, Debug)]
pub enum Error {
    #[error("tool not found: {0}")]
    ToolNotFound(String),

    #[error("no route for tool '{tool}': server '{server}' is not connected")]
    RouteNotFound { tool: String, server: String },

    #[error("invalid tool arguments: {0}")]
    ArgumentParse(String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("no MCP servers are reachable")]
    NoActiveConnections,

    #[error("provider error: {0}")]
    Provider(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Stable machine-readable kind, used in tool-result error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Error::ToolNotFound(_) => "tool_not_found",
            Error::RouteNotFound { .. } => "route_not_found",
            Error::ArgumentParse(_) => "invalid_arguments",
            Error::Transport(_) => "transport_failure",
            Error::NoActiveConnections => "no_active_connections",
            Error::Provider(_) => "provider_failure",
            Error::Config(_) => "config_error",
            Error::Io(_) => "io_error",
            Error::Serialization(_) => "serialization_error",
        }
    }
}

impl From<relay_mcp::client::McpError> for Error {
    fn from(e: relay_mcp::client::McpError) -> Self {
        Error::Transport(e.to_string())
    }
}
