//! MCP client

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::protocol::{methods, JsonRpcRequest, JsonRpcResponse, RequestId};
use crate::transport::Transport;
use crate::{McpResource, McpTool, ServerCapabilities, PROTOCOL_VERSION};

/// Client side of one MCP server session
pub struct McpClient<T: Transport> {
    transport: Arc<Mutex<T>>,
    request_id: AtomicI64,
    server_capabilities: Option<ServerCapabilities>,
}

impl<T: Transport> McpClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
            request_id: AtomicI64::new(1),
            server_capabilities: None,
        }
    }

    fn next_id(&self) -> RequestId {
        RequestId::Number(self.request_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Perform the initialize handshake and record server capabilities
    pub async fn initialize(&mut self, client_info: ClientInfo) -> Result<ServerInfo, McpError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {
                "name": client_info.name,
                "version": client_info.version
            }
        });

        let result = self.request(methods::INITIALIZE, Some(params)).await?;
        let init: InitializeResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;

        self.server_capabilities = Some(init.capabilities);

        // The handshake completes with an initialized notification
        let notification = serde_json::json!({
            "jsonrpc": "2.0",
            "method": methods::INITIALIZED
        });
        let mut transport = self.transport.lock().await;
        transport
            .send(notification)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        Ok(ServerInfo {
            name: init.server_info.name,
            version: init.server_info.version,
        })
    }

    /// Capabilities reported by the server, if initialized
    pub fn server_capabilities(&self) -> Option<&ServerCapabilities> {
        self.server_capabilities.as_ref()
    }

    /// List the tools the server exposes
    pub async fn list_tools(&self) -> Result<Vec<McpTool>, McpError> {
        let result = self.request(methods::TOOLS_LIST, None).await?;
        let listing: ToolsListResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
        Ok(listing.tools)
    }

    /// List the resources the server exposes
    pub async fn list_resources(&self) -> Result<Vec<McpResource>, McpError> {
        let result = self.request(methods::RESOURCES_LIST, None).await?;
        let listing: ResourcesListResult =
            serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))?;
        Ok(listing.resources)
    }

    /// Invoke a named tool with the given arguments
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: serde_json::Value,
    ) -> Result<ToolCallResult, McpError> {
        let params = serde_json::json!({
            "name": name,
            "arguments": arguments
        });

        let result = self.request(methods::TOOLS_CALL, Some(params)).await?;
        serde_json::from_value(result).map_err(|e| McpError::Protocol(e.to_string()))
    }

    /// Tear down the transport
    pub async fn disconnect(&self) -> Result<(), McpError> {
        let mut transport = self.transport.lock().await;
        transport
            .close()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))
    }

    /// Send one request and unwrap the JSON-RPC envelope
    async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<serde_json::Value, McpError> {
        let mut request = JsonRpcRequest::new(self.next_id(), method);
        if let Some(params) = params {
            request = request.with_params(params);
        }
        let request_value =
            serde_json::to_value(&request).map_err(|e| McpError::Protocol(e.to_string()))?;

        let mut transport = self.transport.lock().await;
        transport
            .send(request_value)
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?;

        let response_value = transport
            .receive()
            .await
            .map_err(|e| McpError::Transport(e.to_string()))?
            .ok_or_else(|| McpError::Transport("connection closed".to_string()))?;

        let response: JsonRpcResponse = serde_json::from_value(response_value)
            .map_err(|e| McpError::Protocol(e.to_string()))?;

        match (response.result, response.error) {
            (Some(result), _) => Ok(result),
            (None, Some(error)) => Err(McpError::Server {
                code: error.code,
                message: error.message,
            }),
            (None, None) => Err(McpError::Protocol("empty response".to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, Clone)]
pub struct ServerInfo {
    pub name: String,
    pub version: String,
}

#[derive(Debug, serde::Deserialize)]
struct InitializeResult {
    #[serde(rename = "protocolVersion")]
    #[allow(dead_code)]
    protocol_version: String,
    #[serde(default)]
    capabilities: ServerCapabilities,
    #[serde(rename = "serverInfo")]
    server_info: ServerInfoInner,
}

#[derive(Debug, serde::Deserialize)]
struct ServerInfoInner {
    name: String,
    #[serde(default)]
    version: String,
}

#[derive(Debug, serde::Deserialize)]
struct ToolsListResult {
    #[serde(default)]
    tools: Vec<McpTool>,
}

#[derive(Debug, serde::Deserialize)]
struct ResourcesListResult {
    #[serde(default)]
    resources: Vec<McpResource>,
}

/// Result of a tools/call invocation
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ContentItem>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Flatten all text content items into one string
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter(|item| item.content_type == "text")
            .filter_map(|item| item.text.as_deref())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: Option<String>,
}

/// MCP client errors
#[derive(Debug, thiserror::Error)]
pub enum McpError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("server error ({code}): {message}")]
    Server { code: i64, message: String },
}

impl McpError {
    /// True when the server rejected the request as an unknown method
    pub fn is_method_not_found(&self) -> bool {
        matches!(
            self,
            McpError::Server { code, .. }
                if *code == crate::protocol::error_codes::METHOD_NOT_FOUND
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::Transport;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::io;

    /// Transport that replays scripted responses and records what was sent
    struct ScriptedTransport {
        sent: Vec<Value>,
        responses: VecDeque<Value>,
    }

    impl ScriptedTransport {
        fn new(responses: Vec<Value>) -> Self {
            Self {
                sent: Vec::new(),
                responses: responses.into(),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, message: Value) -> io::Result<()> {
            self.sent.push(message);
            Ok(())
        }

        async fn receive(&mut self) -> io::Result<Option<Value>> {
            Ok(self.responses.pop_front())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn list_tools_parses_listing() {
        let transport = ScriptedTransport::new(vec![json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "tools": [
                    {"name": "search", "description": "Web search", "inputSchema": {"type": "object"}}
                ]
            }
        })]);
        let client = McpClient::new(transport);

        let tools = client.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search");
    }

    #[tokio::test]
    async fn call_tool_unwraps_result() {
        let transport = ScriptedTransport::new(vec![json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "content": [{"type": "text", "text": "42"}],
                "isError": false
            }
        })]);
        let client = McpClient::new(transport);

        let result = client.call_tool("search", json!({"q": "answer"})).await.unwrap();
        assert!(!result.is_error);
        assert_eq!(result.text(), "42");
    }

    #[tokio::test]
    async fn server_error_preserves_code() {
        let transport = ScriptedTransport::new(vec![json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": -32601, "message": "Method not found"}
        })]);
        let client = McpClient::new(transport);

        let err = client.list_tools().await.unwrap_err();
        assert!(err.is_method_not_found());
    }

    #[tokio::test]
    async fn closed_connection_is_transport_error() {
        let transport = ScriptedTransport::new(vec![]);
        let client = McpClient::new(transport);

        let err = client.list_tools().await.unwrap_err();
        assert!(matches!(err, McpError::Transport(_)));
    }
}
