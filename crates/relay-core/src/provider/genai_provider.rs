//! GenAI-based model provider implementation
//!
//! Uses the genai framework so one code path covers every hosted provider.
//! Completions run over the streaming API and are accumulated locally; tool
//! calls arrive as complete chunks within the stream.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use genai::chat::{ChatMessage, ChatRequest, ChatStreamEvent, Tool, ToolCall, ToolResponse};
use genai::resolver::{AuthData, AuthResolver};
use genai::Client;
use genai::WebConfig;
use serde::{Deserialize, Serialize};

use super::{CompletionResult, Message, ModelProvider, ToolCallRequest};
use crate::error::{Error, Result};
use crate::router::ToolDescriptor;

/// Supported hosted providers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderType {
    OpenAI,
    Anthropic,
    Gemini,
    Groq,
    DeepSeek,
    Ollama,
}

impl ProviderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "openai",
            ProviderType::Anthropic => "anthropic",
            ProviderType::Gemini => "gemini",
            ProviderType::Groq => "groq",
            ProviderType::DeepSeek => "deepseek",
            ProviderType::Ollama => "ollama",
        }
    }

    /// Default model when the config does not pin one
    pub fn default_model(&self) -> &'static str {
        match self {
            ProviderType::OpenAI => "gpt-4o",
            ProviderType::Anthropic => "claude-sonnet-4-20250514",
            ProviderType::Gemini => "gemini-2.0-flash",
            ProviderType::Groq => "llama-3.3-70b-versatile",
            ProviderType::DeepSeek => "deepseek-chat",
            ProviderType::Ollama => "llama3.2",
        }
    }
}

impl std::fmt::Display for ProviderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openai" => Ok(ProviderType::OpenAI),
            "anthropic" => Ok(ProviderType::Anthropic),
            "gemini" | "google" => Ok(ProviderType::Gemini),
            "groq" => Ok(ProviderType::Groq),
            "deepseek" => Ok(ProviderType::DeepSeek),
            "ollama" => Ok(ProviderType::Ollama),
            _ => Err(format!("unknown provider: {}", s)),
        }
    }
}

/// Provider implementation backed by genai
pub struct GenAIProvider {
    client: Client,
    provider_type: ProviderType,
    model: String,
}

impl GenAIProvider {
    /// Timeout for model API requests
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

    fn web_config() -> WebConfig {
        WebConfig::default()
            .with_timeout(Self::REQUEST_TIMEOUT)
            .with_connect_timeout(Duration::from_secs(30))
    }

    /// Create a provider; without an explicit key genai resolves credentials
    /// from the provider's conventional environment variable.
    pub fn new(provider_type: ProviderType, api_key: Option<&str>, model: Option<&str>) -> Self {
        let mut builder = Client::builder().with_web_config(Self::web_config());

        if let Some(key) = api_key {
            let key = key.to_string();
            let auth_resolver = AuthResolver::from_resolver_fn(
                move |_model_iden| -> std::result::Result<Option<AuthData>, genai::resolver::Error> {
                    Ok(Some(AuthData::from_single(key.clone())))
                },
            );
            builder = builder.with_auth_resolver(auth_resolver);
        }

        Self {
            client: builder.build(),
            provider_type,
            model: model
                .filter(|m| !m.is_empty())
                .unwrap_or(provider_type.default_model())
                .to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn provider_type(&self) -> ProviderType {
        self.provider_type
    }

    fn to_chat_request(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDescriptor]>,
    ) -> ChatRequest {
        let mut chat_req = ChatRequest::default();

        for msg in messages {
            match msg {
                Message::System(text) => {
                    chat_req = chat_req.append_message(ChatMessage::system(text));
                }
                Message::User(text) => {
                    chat_req = chat_req.append_message(ChatMessage::user(text));
                }
                Message::Assistant(text) => {
                    chat_req = chat_req.append_message(ChatMessage::assistant(text));
                }
                Message::AssistantToolCalls { calls, .. } => {
                    // genai folds a Vec<ToolCall> into a single assistant
                    // message, which is what OpenAI-style APIs require
                    let tool_calls: Vec<ToolCall> = calls
                        .iter()
                        .map(|call| ToolCall {
                            call_id: call.id.clone(),
                            fn_name: call.name.clone(),
                            fn_arguments: serde_json::from_str(&call.arguments)
                                .unwrap_or(serde_json::Value::Null),
                            thought_signatures: None,
                        })
                        .collect();
                    chat_req = chat_req.append_message(tool_calls);
                }
                Message::ToolResult { call_id, content } => {
                    chat_req = chat_req
                        .append_message(ToolResponse::new(call_id.clone(), content.clone()));
                }
            }
        }

        if let Some(descriptors) = tools {
            let genai_tools: Vec<Tool> = descriptors
                .iter()
                .map(|d| {
                    Tool::new(&d.name)
                        .with_description(&d.description)
                        .with_schema(d.input_schema.clone())
                })
                .collect();
            chat_req = chat_req.with_tools(genai_tools);
        }

        chat_req
    }
}

#[async_trait]
impl ModelProvider for GenAIProvider {
    fn name(&self) -> &str {
        self.provider_type.as_str()
    }

    async fn complete(
        &self,
        messages: &[Message],
        tools: Option<&[ToolDescriptor]>,
    ) -> Result<CompletionResult> {
        let chat_req = self.to_chat_request(messages, tools);

        tracing::debug!(
            model = %self.model,
            message_count = messages.len(),
            tool_count = tools.map(|t| t.len()).unwrap_or(0),
            "sending model request"
        );

        let stream_res = self
            .client
            .exec_chat_stream(&self.model, chat_req, None)
            .await
            .map_err(|e| {
                tracing::error!(error = ?e, model = %self.model, "model request failed");
                Error::Provider(format!("genai error: {:?}", e))
            })?;

        let mut content = String::new();
        let mut tool_calls: Vec<ToolCallRequest> = Vec::new();
        let mut stream = stream_res.stream;

        while let Some(event) = stream.next().await {
            match event {
                Ok(ChatStreamEvent::Chunk(chunk)) => {
                    content.push_str(&chunk.content);
                }
                Ok(ChatStreamEvent::ReasoningChunk(_)) => {
                    // Reasoning traces are not part of the visible reply
                }
                Ok(ChatStreamEvent::ToolCallChunk(tc)) => {
                    // Each chunk carries one complete tool call
                    let tool_call = tc.tool_call;
                    tool_calls.push(ToolCallRequest {
                        id: tool_call.call_id,
                        name: tool_call.fn_name,
                        arguments: tool_call.fn_arguments.to_string(),
                    });
                }
                Ok(ChatStreamEvent::End(_)) => {
                    break;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(error = ?e, model = %self.model, "model stream error");
                    return Err(Error::Provider(format!("genai stream error: {:?}", e)));
                }
            }
        }

        Ok(CompletionResult {
            content: if content.is_empty() {
                None
            } else {
                Some(content)
            },
            tool_calls,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_type_parses_aliases() {
        assert_eq!("google".parse::<ProviderType>().unwrap(), ProviderType::Gemini);
        assert_eq!("Anthropic".parse::<ProviderType>().unwrap(), ProviderType::Anthropic);
        assert!("wat".parse::<ProviderType>().is_err());
    }

    #[test]
    fn empty_model_falls_back_to_default() {
        let provider = GenAIProvider::new(ProviderType::OpenAI, None, Some(""));
        assert_eq!(provider.model(), ProviderType::OpenAI.default_model());
    }
}
