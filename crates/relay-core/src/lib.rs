//! Relay core - tool routing and session orchestration
//!
//! The two central pieces are [`router::ToolRouter`], which tracks which MCP
//! server owns which tool and dispatches invocations, and
//! [`session::Orchestrator`], which drives the conversational tool-call loop
//! against a model provider.

pub mod config;
pub mod connection;
pub mod error;
pub mod provider;
pub mod router;
pub mod session;

pub use error::{Error, Result};

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted transports and canned JSON-RPC responses shared by the
    //! router and session tests.

    use std::collections::VecDeque;
    use std::io;

    use async_trait::async_trait;
    use serde_json::{json, Value};

    use relay_mcp::client::McpClient;
    use relay_mcp::transport::Transport;

    use crate::connection::ServerConnection;

    /// Transport that replays scripted responses in order
    pub(crate) struct ScriptedTransport {
        responses: VecDeque<Value>,
    }

    impl ScriptedTransport {
        pub(crate) fn new(responses: Vec<Value>) -> Self {
            Self {
                responses: responses.into(),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&mut self, _message: Value) -> io::Result<()> {
            Ok(())
        }

        async fn receive(&mut self) -> io::Result<Option<Value>> {
            Ok(self.responses.pop_front())
        }

        async fn close(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    /// A connection whose server replies with the given responses in order
    pub(crate) fn scripted_connection(name: &str, responses: Vec<Value>) -> ServerConnection {
        let transport: Box<dyn Transport> = Box::new(ScriptedTransport::new(responses));
        ServerConnection::from_client(name, McpClient::new(transport))
    }

    /// A tools/list response listing the given (name, description) pairs
    pub(crate) fn tools_response(tools: &[(&str, &str)]) -> Value {
        let tools: Vec<Value> = tools
            .iter()
            .map(|(name, description)| {
                json!({
                    "name": name,
                    "description": description,
                    "inputSchema": {"type": "object"}
                })
            })
            .collect();
        json!({"jsonrpc": "2.0", "id": 1, "result": {"tools": tools}})
    }

    /// A successful tools/call response with one text content item
    pub(crate) fn call_response(text: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "result": {
                "content": [{"type": "text", "text": text}],
                "isError": false
            }
        })
    }

    /// A JSON-RPC error response
    pub(crate) fn error_response(code: i64, message: &str) -> Value {
        json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": {"code": code, "message": message}
        })
    }
}
