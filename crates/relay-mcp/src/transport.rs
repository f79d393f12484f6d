//! MCP transport layer implementations

use std::collections::VecDeque;
use std::io;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};

use crate::protocol;

/// Transport trait for MCP communication
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, message: Value) -> io::Result<()>;
    async fn receive(&mut self) -> io::Result<Option<Value>>;
    async fn close(&mut self) -> io::Result<()>;
}

#[async_trait]
impl Transport for Box<dyn Transport> {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        (**self).send(message).await
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        (**self).receive().await
    }

    async fn close(&mut self) -> io::Result<()> {
        (**self).close().await
    }
}

/// Stdio transport for subprocess servers, newline-framed JSON
pub struct StdioTransport {
    child: Child,
    reader: Option<BufReader<tokio::process::ChildStdout>>,
}

impl StdioTransport {
    pub async fn spawn(
        command: &str,
        args: &[String],
        env: &[(String, String)],
    ) -> io::Result<Self> {
        let mut cmd = Command::new(command);
        cmd.args(args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::inherit());
        for (key, value) in env {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn()?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| io::Error::other("failed to capture server stdout"))?;

        Ok(Self {
            child,
            reader: Some(BufReader::new(stdout)),
        })
    }
}

#[async_trait]
impl Transport for StdioTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        let stdin = self
            .child
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::other("server stdin not available"))?;

        let json = serde_json::to_string(&message)?;
        stdin.write_all(json.as_bytes()).await?;
        stdin.write_all(b"\n").await?;
        stdin.flush().await?;

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| io::Error::other("server stdout not available"))?;

        loop {
            let mut line = String::new();
            let n = reader.read_line(&mut line).await?;
            if n == 0 {
                return Ok(None);
            }
            if line.trim().is_empty() {
                continue;
            }

            let value: Value = serde_json::from_str(&line)?;

            // Server-initiated notifications are not answers to anything we
            // sent; skip them while waiting for a response.
            if protocol::is_notification(&value) {
                tracing::debug!(method = ?value.get("method"), "skipping server notification");
                continue;
            }

            return Ok(Some(value));
        }
    }

    async fn close(&mut self) -> io::Result<()> {
        self.reader = None;
        self.child.kill().await?;
        Ok(())
    }
}

/// HTTP transport: each message is POSTed to the server endpoint and the
/// response body is queued for `receive`. Covers the request/response mode
/// of streamable HTTP; SSE push channels are not supported.
pub struct HttpTransport {
    url: String,
    client: reqwest::Client,
    pending: VecDeque<Value>,
}

impl HttpTransport {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            pending: VecDeque::new(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&mut self, message: Value) -> io::Result<()> {
        // Notifications get no response body worth queueing
        let expects_response = !protocol::is_notification(&message);

        let response = self
            .client
            .post(&self.url)
            .json(&message)
            .send()
            .await
            .map_err(io::Error::other)?;

        if expects_response {
            let body: Value = response.json().await.map_err(io::Error::other)?;
            self.pending.push_back(body);
        }

        Ok(())
    }

    async fn receive(&mut self) -> io::Result<Option<Value>> {
        Ok(self.pending.pop_front())
    }

    async fn close(&mut self) -> io::Result<()> {
        self.pending.clear();
        Ok(())
    }
}
