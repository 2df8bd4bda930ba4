//! Remote sandbox execution.
//!
//! Each call opens an ephemeral sandbox, streams the execution's
//! stdout/stderr events as they are produced, and closes the sandbox on
//! every exit path. A fault raised *inside* the executed code is
//! informational: `run` still returns `Ok`, with the fault rendered into
//! stderr and flagged on the outcome. Only transport/service failures are
//! `Err`.

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::ServiceConfig;
use crate::errors::SandboxError;

/// Captured output of one sandboxed execution.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExecutionOutcome {
    pub stdout: String,
    pub stderr: String,
    /// Set when the executed code itself raised/faulted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs untrusted code and captures its output streams.
#[async_trait]
pub trait CodeRunner: Send + Sync {
    async fn run(&self, code: &str) -> Result<ExecutionOutcome, SandboxError>;
}

/// Client for the remote sandbox service.
pub struct SandboxExecutor {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SandboxExecutor {
    pub fn new(client: reqwest::Client, config: &ServiceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    /// Open a sandbox, execute the code, and close the sandbox regardless of
    /// how execution went.
    pub async fn run_code(&self, code: &str) -> Result<ExecutionOutcome, SandboxError> {
        let sandbox_id = self.open().await?;
        let result = self.execute(&sandbox_id, code).await;

        // The sandbox is closed on every path; a close failure must not
        // shadow the execution result.
        if let Err(err) = self.close(&sandbox_id).await {
            warn!(sandbox_id = %sandbox_id, error = %err, "failed to close sandbox");
        }

        result
    }

    async fn open(&self) -> Result<String, SandboxError> {
        let response = self
            .client
            .post(format!("{}/sandboxes", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(SandboxError::Transport)?;

        let created: CreatedSandbox = Self::check(response)
            .await?
            .json()
            .await
            .map_err(SandboxError::Transport)?;
        Ok(created.sandbox_id)
    }

    async fn execute(&self, sandbox_id: &str, code: &str) -> Result<ExecutionOutcome, SandboxError> {
        let response = self
            .client
            .post(format!("{}/sandboxes/{}/execute", self.base_url, sandbox_id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&ExecuteRequest { code })
            .send()
            .await
            .map_err(SandboxError::Transport)?;

        let response = Self::check(response).await?;

        // The body is a newline-delimited JSON event stream, drained
        // incrementally as the remote environment produces output.
        let mut collector = OutcomeCollector::default();
        let mut stream = response.bytes_stream();
        let mut buffer = Vec::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(SandboxError::Transport)?;
            buffer.extend_from_slice(&chunk);
            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                collector.ingest_line(&String::from_utf8_lossy(&line));
            }
        }
        // A final event without a trailing newline still counts.
        if !buffer.is_empty() {
            collector.ingest_line(&String::from_utf8_lossy(&buffer));
        }

        Ok(collector.into_outcome())
    }

    async fn close(&self, sandbox_id: &str) -> Result<(), SandboxError> {
        let response = self
            .client
            .delete(format!("{}/sandboxes/{}", self.base_url, sandbox_id))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
            .map_err(SandboxError::Transport)?;

        Self::check(response).await.map(|_| ())
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, SandboxError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(SandboxError::Service { status: status.as_u16(), message })
    }
}

#[async_trait]
impl CodeRunner for SandboxExecutor {
    async fn run(&self, code: &str) -> Result<ExecutionOutcome, SandboxError> {
        self.run_code(code).await
    }
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Serialize)]
struct ExecuteRequest<'a> {
    code: &'a str,
}

#[derive(Deserialize)]
struct CreatedSandbox {
    sandbox_id: String,
}

/// One event from the execution stream. Unknown event types are ignored.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ExecutionEvent {
    Stdout {
        text: String,
    },
    Stderr {
        text: String,
    },
    Error {
        name: String,
        message: String,
        #[serde(default)]
        traceback: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

/// Accumulates streamed events into an `ExecutionOutcome`.
#[derive(Debug, Default)]
struct OutcomeCollector {
    stdout: Vec<String>,
    stderr: Vec<String>,
    fault: Option<(String, String, Option<String>)>,
}

impl OutcomeCollector {
    fn ingest_line(&mut self, line: &str) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<ExecutionEvent>(line) {
            Ok(ExecutionEvent::Stdout { text }) => self.stdout.push(text),
            Ok(ExecutionEvent::Stderr { text }) => self.stderr.push(text),
            Ok(ExecutionEvent::Error { name, message, traceback }) => {
                self.fault = Some((name, message, traceback));
            }
            Ok(ExecutionEvent::Unknown) => {}
            Err(err) => warn!(error = %err, "unparseable sandbox event line"),
        }
    }

    fn into_outcome(self) -> ExecutionOutcome {
        let mut stderr_parts = self.stderr;
        let error = self.fault.map(|(name, message, traceback)| {
            // The fault is attached to stderr so callers always see it in
            // the captured output, and flagged separately on the outcome.
            stderr_parts.push(traceback.unwrap_or_else(|| format!("{name}: {message}")));
            format!("{name}: {message}")
        });

        ExecutionOutcome {
            stdout: self.stdout.join("\n"),
            stderr: stderr_parts.join("\n"),
            error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(lines: &[&str]) -> ExecutionOutcome {
        let mut collector = OutcomeCollector::default();
        for line in lines {
            collector.ingest_line(line);
        }
        collector.into_outcome()
    }

    #[test]
    fn test_clean_execution() {
        let outcome = collect(&[r#"{"type": "stdout", "text": "hi"}"#]);
        assert_eq!(outcome.stdout, "hi");
        assert_eq!(outcome.stderr, "");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_stdout_fragments_join_with_newlines() {
        let outcome = collect(&[
            r#"{"type": "stdout", "text": "one"}"#,
            r#"{"type": "stderr", "text": "warning"}"#,
            r#"{"type": "stdout", "text": "two"}"#,
        ]);
        assert_eq!(outcome.stdout, "one\ntwo");
        assert_eq!(outcome.stderr, "warning");
    }

    #[test]
    fn test_fault_is_informational_and_lands_in_stderr() {
        let outcome = collect(&[
            r#"{"type": "error", "name": "ValueError", "message": "x"}"#,
        ]);
        assert_eq!(outcome.stdout, "");
        assert!(outcome.stderr.contains("ValueError"));
        assert_eq!(outcome.error.as_deref(), Some("ValueError: x"));
    }

    #[test]
    fn test_fault_keeps_stdout_captured_before_it() {
        let outcome = collect(&[
            r#"{"type": "stdout", "text": "partial"}"#,
            r#"{"type": "error", "name": "ZeroDivisionError", "message": "division by zero", "traceback": "Traceback (most recent call last):\n  ZeroDivisionError: division by zero"}"#,
        ]);
        assert_eq!(outcome.stdout, "partial");
        assert!(outcome.stderr.contains("ZeroDivisionError"));
        assert!(outcome.stderr.starts_with("Traceback"));
        assert!(outcome.error.is_some());
    }

    #[test]
    fn test_unknown_and_garbled_events_are_skipped() {
        let outcome = collect(&[
            r#"{"type": "heartbeat"}"#,
            "not json at all",
            "",
            r#"{"type": "stdout", "text": "still here"}"#,
        ]);
        assert_eq!(outcome.stdout, "still here");
        assert!(outcome.error.is_none());
    }

    #[test]
    fn test_fault_appends_after_existing_stderr() {
        let outcome = collect(&[
            r#"{"type": "stderr", "text": "warning: deprecated"}"#,
            r#"{"type": "error", "name": "RuntimeError", "message": "boom"}"#,
        ]);
        assert_eq!(outcome.stderr, "warning: deprecated\nRuntimeError: boom");
    }
}
