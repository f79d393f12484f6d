//! Session orchestration
//!
//! Owns the conversation history and drives the request/response cycle:
//! send history plus tool catalog to the model, dispatch any requested tool
//! calls through the router, feed the outcomes back, and ask the model for a
//! final answer. Tool resolution is single-level per user turn: the
//! follow-up response never triggers another tool round.

use std::sync::Arc;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::provider::{CompletionResult, Message, ModelProvider, ToolCallRequest};
use crate::router::ToolRouter;

/// System prompt used when the caller does not supply one
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are Relay, a helpful assistant. You can call tools \
     provided by connected MCP servers; use them when they help answer the user's question, and \
     summarize their results in plain language.";

/// Reply shown when a model request fails; the session keeps running
const APOLOGY: &str =
    "Sorry, I ran into a problem talking to the model. Please try again.";

/// What happened to one dispatched tool call, for display
#[derive(Debug, Clone)]
pub struct DispatchRecord {
    pub call_id: String,
    pub tool: String,
    pub ok: bool,
}

/// Result of one user turn
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    /// The assistant's final answer for this turn
    pub reply: String,
    /// Tool calls dispatched while producing the answer, in request order
    pub dispatches: Vec<DispatchRecord>,
}

/// Drives the conversational tool-call loop for one chat session
pub struct Orchestrator {
    provider: Arc<dyn ModelProvider>,
    router: ToolRouter,
    history: Vec<Message>,
}

impl Orchestrator {
    /// Create a session over the given router.
    ///
    /// Fails with `NoActiveConnections` when no servers are connected; this
    /// is the only condition that prevents the loop from starting.
    pub fn new(
        provider: Arc<dyn ModelProvider>,
        router: ToolRouter,
        system_prompt: impl Into<String>,
    ) -> Result<Self> {
        if router.connection_count() == 0 {
            return Err(Error::NoActiveConnections);
        }

        Ok(Self {
            provider,
            router,
            history: vec![Message::system(system_prompt.into())],
        })
    }

    pub fn router(&self) -> &ToolRouter {
        &self.router
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Process one user turn.
    ///
    /// Model failures never escape: they degrade to an apology reply
    /// appended as the assistant's turn, and the session continues.
    pub async fn run_turn(&mut self, input: &str) -> TurnOutcome {
        self.history.push(Message::user(input));

        let catalog = self.router.catalog();
        let tools = if catalog.is_empty() {
            None
        } else {
            Some(catalog.as_slice())
        };

        let first = match self.provider.complete(&self.history, tools).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "model request failed");
                return self.apologize(Vec::new());
            }
        };

        if !first.has_tool_calls() {
            let reply = first.text();
            self.history.push(Message::assistant(reply.clone()));
            return TurnOutcome {
                reply,
                dispatches: Vec::new(),
            };
        }

        let CompletionResult {
            content,
            tool_calls,
        } = first;

        // Strictly sequential dispatch; result order must match request
        // order, and one failing call never aborts its siblings.
        let mut results: Vec<Message> = Vec::with_capacity(tool_calls.len());
        let mut dispatches: Vec<DispatchRecord> = Vec::with_capacity(tool_calls.len());
        for call in &tool_calls {
            let (payload, ok) = self.execute_call(call).await;
            dispatches.push(DispatchRecord {
                call_id: call.id.clone(),
                tool: call.name.clone(),
                ok,
            });
            results.push(Message::tool_result(call.id.clone(), payload));
        }

        // The assistant's tool-call request precedes its results in history
        // so the follow-up request is well-formed.
        self.history.push(Message::AssistantToolCalls {
            content,
            calls: tool_calls,
        });
        self.history.extend(results);

        // Exactly one follow-up request, without the tool catalog. Should
        // the model ask for more tools here, it gets no further round.
        let followup = match self.provider.complete(&self.history, None).await {
            Ok(result) => result,
            Err(e) => {
                tracing::error!(error = %e, "follow-up model request failed");
                return self.apologize(dispatches);
            }
        };

        let reply = followup.text();
        self.history.push(Message::assistant(reply.clone()));
        TurnOutcome { reply, dispatches }
    }

    /// Dispatch one call and render its outcome as a tool-result payload.
    ///
    /// Every failure mode (argument parse, not-found, route, transport)
    /// becomes a serialized error object; nothing escapes the batch.
    async fn execute_call(&self, call: &ToolCallRequest) -> (String, bool) {
        let raw = call.arguments.trim();
        let parsed: std::result::Result<Value, _> =
            serde_json::from_str(if raw.is_empty() { "{}" } else { raw });

        let arguments = match parsed {
            Ok(value) => value,
            Err(e) => {
                let err = Error::ArgumentParse(e.to_string());
                tracing::warn!(tool = %call.name, error = %err, "malformed tool arguments");
                return (error_payload(&err), false);
            }
        };

        match self.router.dispatch(&call.name, arguments).await {
            Ok(result) => {
                let ok = !result.is_error;
                let payload = serde_json::to_string(&result)
                    .unwrap_or_else(|e| error_payload(&Error::Serialization(e)));
                (payload, ok)
            }
            Err(e) => {
                tracing::warn!(tool = %call.name, error = %e, "tool dispatch failed");
                (error_payload(&e), false)
            }
        }
    }

    fn apologize(&mut self, dispatches: Vec<DispatchRecord>) -> TurnOutcome {
        self.history.push(Message::assistant(APOLOGY));
        TurnOutcome {
            reply: APOLOGY.to_string(),
            dispatches,
        }
    }

    /// Orderly teardown of every open connection
    pub async fn shutdown(&mut self) {
        self.router.shutdown().await;
    }
}

/// Serialized error object carried in a tool-result message
fn error_payload(err: &Error) -> String {
    serde_json::json!({
        "error": {
            "kind": err.kind(),
            "message": err.to_string(),
        }
    })
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{call_response, scripted_connection, tools_response};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Provider that replays scripted completions and records whether each
    /// request carried a tool catalog
    struct MockProvider {
        responses: Mutex<VecDeque<Result<CompletionResult>>>,
        requests_with_tools: Mutex<Vec<bool>>,
    }

    impl MockProvider {
        fn new(responses: Vec<Result<CompletionResult>>) -> Arc<Self> {
            Arc::new(Self {
                responses: Mutex::new(responses.into()),
                requests_with_tools: Mutex::new(Vec::new()),
            })
        }

        fn call_count(&self) -> usize {
            self.requests_with_tools.lock().unwrap().len()
        }

        fn tools_attached(&self) -> Vec<bool> {
            self.requests_with_tools.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModelProvider for MockProvider {
        fn name(&self) -> &str {
            "mock"
        }

        async fn complete(
            &self,
            _messages: &[Message],
            tools: Option<&[crate::router::ToolDescriptor]>,
        ) -> Result<CompletionResult> {
            self.requests_with_tools.lock().unwrap().push(tools.is_some());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CompletionResult::default()))
        }
    }

    fn text(content: &str) -> Result<CompletionResult> {
        Ok(CompletionResult {
            content: Some(content.to_string()),
            tool_calls: Vec::new(),
        })
    }

    fn tool_calls(calls: Vec<(&str, &str, &str)>) -> Result<CompletionResult> {
        Ok(CompletionResult {
            content: None,
            tool_calls: calls
                .into_iter()
                .map(|(id, name, arguments)| ToolCallRequest {
                    id: id.to_string(),
                    name: name.to_string(),
                    arguments: arguments.to_string(),
                })
                .collect(),
        })
    }

    /// Router over one scripted server exposing `search`, plus the scripted
    /// tools/call responses that follow the catalog listing
    async fn search_router(call_responses: Vec<serde_json::Value>) -> ToolRouter {
        let mut responses = vec![tools_response(&[("search", "Web search")])];
        responses.extend(call_responses);
        let connection = scripted_connection("serverA", responses);
        let mut router = ToolRouter::new(vec![connection]);
        router.refresh_catalog().await;
        router
    }

    fn tool_results(history: &[Message]) -> Vec<(&str, &str)> {
        history
            .iter()
            .filter_map(|m| match m {
                Message::ToolResult { call_id, content } => {
                    Some((call_id.as_str(), content.as_str()))
                }
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn zero_connections_refuses_to_start() {
        let provider = MockProvider::new(vec![]);
        let result = Orchestrator::new(provider, ToolRouter::new(vec![]), DEFAULT_SYSTEM_PROMPT);
        assert!(matches!(result, Err(Error::NoActiveConnections)));
    }

    #[tokio::test]
    async fn plain_text_reply_issues_no_followup() {
        let provider = MockProvider::new(vec![text("Hello")]);
        let router = search_router(vec![]).await;
        let mut orchestrator =
            Orchestrator::new(provider.clone(), router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("hi").await;

        assert_eq!(outcome.reply, "Hello");
        assert!(outcome.dispatches.is_empty());
        assert_eq!(provider.call_count(), 1);
        assert!(matches!(
            orchestrator.history().last(),
            Some(Message::Assistant(content)) if content == "Hello"
        ));
    }

    #[tokio::test]
    async fn tool_call_round_trip_issues_one_followup() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![("call_1", "search", r#"{"q": "answer"}"#)]),
            text("It is 42"),
        ]);
        let router = search_router(vec![call_response(r#"{ "result": 42 }"#)]).await;
        let mut orchestrator =
            Orchestrator::new(provider.clone(), router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("what is the answer?").await;

        assert_eq!(outcome.reply, "It is 42");
        assert_eq!(outcome.dispatches.len(), 1);
        assert!(outcome.dispatches[0].ok);
        assert_eq!(outcome.dispatches[0].call_id, "call_1");

        // Exactly one follow-up, issued without the tool catalog
        assert_eq!(provider.call_count(), 2);
        assert_eq!(provider.tools_attached(), vec![true, false]);

        // Exactly one tool-result, referencing the originating call id and
        // carrying the serialized result
        let results = tool_results(orchestrator.history());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].0, "call_1");
        assert!(results[0].1.contains("42"));
    }

    #[tokio::test]
    async fn assistant_tool_call_message_precedes_results() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![("abc", "search", "{}")]),
            text("done"),
        ]);
        let router = search_router(vec![call_response("ok")]).await;
        let mut orchestrator =
            Orchestrator::new(provider, router, DEFAULT_SYSTEM_PROMPT).unwrap();

        orchestrator.run_turn("go").await;

        let history = orchestrator.history();
        let call_pos = history
            .iter()
            .position(|m| matches!(m, Message::AssistantToolCalls { .. }))
            .unwrap();
        let result_pos = history
            .iter()
            .position(|m| matches!(m, Message::ToolResult { call_id, .. } if call_id == "abc"))
            .unwrap();
        assert!(call_pos < result_pos);
    }

    #[tokio::test]
    async fn failing_call_does_not_abort_batch() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![
                ("c1", "search", r#"{"q": "one"}"#),
                ("c2", "nope", "{}"),
                ("c3", "search", r#"{"q": "three"}"#),
            ]),
            text("summary"),
        ]);
        let router = search_router(vec![call_response("one"), call_response("three")]).await;
        let mut orchestrator =
            Orchestrator::new(provider.clone(), router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("batch").await;

        assert_eq!(outcome.reply, "summary");
        assert_eq!(outcome.dispatches.len(), 3);
        assert!(outcome.dispatches[0].ok);
        assert!(!outcome.dispatches[1].ok);
        assert!(outcome.dispatches[2].ok);

        // One result per call, preserving request order
        let results = tool_results(orchestrator.history());
        assert_eq!(
            results.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec!["c1", "c2", "c3"]
        );
        assert!(results[0].1.contains("one"));
        assert!(results[1].1.contains("tool_not_found"));
        assert!(results[2].1.contains("three"));

        // The batch still got its single follow-up
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn malformed_arguments_become_error_payload() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![("c1", "search", "{not json")]),
            text("noted"),
        ]);
        let router = search_router(vec![]).await;
        let mut orchestrator =
            Orchestrator::new(provider.clone(), router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("go").await;

        assert_eq!(outcome.reply, "noted");
        assert!(!outcome.dispatches[0].ok);
        let results = tool_results(orchestrator.history());
        assert_eq!(results.len(), 1);
        assert!(results[0].1.contains("invalid_arguments"));
    }

    #[tokio::test]
    async fn empty_arguments_payload_means_no_arguments() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![("c1", "search", "")]),
            text("ok"),
        ]);
        let router = search_router(vec![call_response("found")]).await;
        let mut orchestrator =
            Orchestrator::new(provider, router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("go").await;
        assert!(outcome.dispatches[0].ok);
    }

    #[tokio::test]
    async fn model_failure_degrades_to_apology() {
        let provider = MockProvider::new(vec![
            Err(Error::Provider("boom".to_string())),
            text("recovered"),
        ]);
        let router = search_router(vec![]).await;
        let mut orchestrator =
            Orchestrator::new(provider.clone(), router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("hi").await;
        assert_eq!(outcome.reply, APOLOGY);
        assert!(matches!(
            orchestrator.history().last(),
            Some(Message::Assistant(content)) if content == APOLOGY
        ));

        // The loop keeps going after the apology
        let next = orchestrator.run_turn("again").await;
        assert_eq!(next.reply, "recovered");
    }

    #[tokio::test]
    async fn followup_failure_apologizes_but_keeps_dispatches() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![("c1", "search", "{}")]),
            Err(Error::Provider("boom".to_string())),
        ]);
        let router = search_router(vec![call_response("found")]).await;
        let mut orchestrator =
            Orchestrator::new(provider, router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("go").await;
        assert_eq!(outcome.reply, APOLOGY);
        assert_eq!(outcome.dispatches.len(), 1);
    }

    #[tokio::test]
    async fn followup_tool_calls_get_no_further_round() {
        let provider = MockProvider::new(vec![
            tool_calls(vec![("c1", "search", "{}")]),
            Ok(CompletionResult {
                content: Some("partial".to_string()),
                tool_calls: vec![ToolCallRequest {
                    id: "c2".to_string(),
                    name: "search".to_string(),
                    arguments: "{}".to_string(),
                }],
            }),
        ]);
        let router = search_router(vec![call_response("found")]).await;
        let mut orchestrator =
            Orchestrator::new(provider.clone(), router, DEFAULT_SYSTEM_PROMPT).unwrap();

        let outcome = orchestrator.run_turn("go").await;

        // Single-level resolution: the second round of tool calls is not
        // dispatched and no third model request is made
        assert_eq!(outcome.reply, "partial");
        assert_eq!(outcome.dispatches.len(), 1);
        assert_eq!(provider.call_count(), 2);
    }
}
