//! Model provider abstraction
//!
//! Defines the conversation message types and the `ModelProvider` seam the
//! orchestrator talks through. The production implementation is
//! `GenAIProvider`; tests substitute scripted providers.

mod genai_provider;

pub use genai_provider::{GenAIProvider, ProviderType};

use async_trait::async_trait;

use crate::error::Result;
use crate::router::ToolDescriptor;

/// One entry in the conversation history.
///
/// The sequence is append-only for the duration of a session and never
/// persisted across sessions.
#[derive(Debug, Clone)]
pub enum Message {
    System(String),
    User(String),
    Assistant(String),
    /// The model's tool-call request turn, kept verbatim so the follow-up
    /// request is well-formed
    AssistantToolCalls {
        content: Option<String>,
        calls: Vec<ToolCallRequest>,
    },
    /// Outcome of one tool call, correlated by call id
    ToolResult { call_id: String, content: String },
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::System(content.into())
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::User(content.into())
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::Assistant(content.into())
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::ToolResult {
            call_id: call_id.into(),
            content: content.into(),
        }
    }

    /// Role label for logging
    pub fn role(&self) -> &'static str {
        match self {
            Self::System(_) => "system",
            Self::User(_) => "user",
            Self::Assistant(_) | Self::AssistantToolCalls { .. } => "assistant",
            Self::ToolResult { .. } => "tool",
        }
    }
}

/// A model-issued request to invoke one tool
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCallRequest {
    /// Call id used to correlate the tool result
    pub id: String,
    /// Tool identifier from the catalog
    pub name: String,
    /// Raw argument payload exactly as issued by the model; parsing is the
    /// orchestrator's job
    pub arguments: String,
}

/// What the model returned: final text, tool calls, or both
#[derive(Debug, Clone, Default)]
pub struct CompletionResult {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCallRequest>,
}

impl CompletionResult {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    pub fn text(&self) -> String {
        self.content.clone().unwrap_or_default()
    }
}

/// Trait for model providers
#[async_trait]
pub trait ModelProvider: Send + Sync {
    /// Provider name (e.g. "anthropic", "openai")
    fn name(&self) -> &str;

    /// Send the ordered history, optionally with the tool catalog formatted
    /// as callable declarations, and return the model's reply.
    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<CompletionResult>;
}
