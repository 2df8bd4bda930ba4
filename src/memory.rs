//! Remote memory store gateway.
//!
//! Persists role-tagged interaction pairs keyed by a user identity and reads
//! them back as one newline-joined context string. The gateway itself
//! propagates errors; the best-effort "log and carry on" policy lives at the
//! call sites that want it (the pipeline and the read surface), so a degraded
//! memory subsystem stays visible to operators.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::config::ServiceConfig;
use crate::errors::MemoryError;

/// Durable per-user interaction storage.
#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// All stored entries for a user, newline-joined in store order.
    /// Zero entries yields an empty string, not an error.
    async fn fetch(&self, user_id: &str) -> Result<String, MemoryError>;

    /// Append one request/response interaction, tagged with the operation
    /// that produced it.
    async fn append(
        &self,
        user_id: &str,
        user_input: &str,
        assistant_response: &str,
        operation: Option<&str>,
    ) -> Result<(), MemoryError>;

    /// Erase all entries for a user.
    async fn clear(&self, user_id: &str) -> Result<(), MemoryError>;
}

/// REST client for the remote memory service.
pub struct MemoryGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MemoryGateway {
    pub fn new(client: reqwest::Client, config: &ServiceConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        }
    }

    fn memories_url(&self) -> String {
        format!("{}/v1/memories", self.base_url)
    }

    async fn check(response: reqwest::Response) -> Result<reqwest::Response, MemoryError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "failed to read error body".to_string());
        Err(MemoryError::Service { status: status.as_u16(), message })
    }
}

#[async_trait]
impl MemoryStore for MemoryGateway {
    async fn fetch(&self, user_id: &str) -> Result<String, MemoryError> {
        let response = self
            .client
            .get(self.memories_url())
            .header("Authorization", format!("Token {}", self.api_key))
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(MemoryError::Transport)?;

        let entries: Vec<StoredMemory> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(MemoryError::Transport)?;

        Ok(join_entries(&entries))
    }

    async fn append(
        &self,
        user_id: &str,
        user_input: &str,
        assistant_response: &str,
        operation: Option<&str>,
    ) -> Result<(), MemoryError> {
        let body = AppendRequest {
            messages: vec![
                MemoryMessage { role: "user", content: user_input.to_string() },
                MemoryMessage { role: "assistant", content: assistant_response.to_string() },
            ],
            user_id: user_id.to_string(),
            metadata: json!({
                "operation": operation,
                "recorded_at": Utc::now().to_rfc3339(),
            }),
        };

        let response = self
            .client
            .post(self.memories_url())
            .header("Authorization", format!("Token {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(MemoryError::Transport)?;

        Self::check(response).await.map(|_| ())
    }

    async fn clear(&self, user_id: &str) -> Result<(), MemoryError> {
        let response = self
            .client
            .delete(self.memories_url())
            .header("Authorization", format!("Token {}", self.api_key))
            .query(&[("user_id", user_id)])
            .send()
            .await
            .map_err(MemoryError::Transport)?;

        Self::check(response).await.map(|_| ())
    }
}

/// One stored entry as the service returns it. Extra fields are ignored.
#[derive(Debug, Deserialize)]
pub struct StoredMemory {
    pub content: String,
}

#[derive(Serialize)]
struct MemoryMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct AppendRequest {
    messages: Vec<MemoryMessage>,
    user_id: String,
    metadata: serde_json::Value,
}

/// Concatenate entry contents in retrieval order.
fn join_entries(entries: &[StoredMemory]) -> String {
    entries
        .iter()
        .map(|entry| entry.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
