//! Chat-completion clients for the generation and feedback passes.
//!
//! One `ChatClient` talks to an OpenAI-style `/chat/completions` endpoint;
//! `GenerationClient` and `FeedbackClient` wrap it with their respective
//! prompts. Both return the *raw* completion text — fenced-block extraction
//! is the caller's concern, which lets the same transport serve the
//! "explanation + code" and "refine this code" shapes.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::errors::GenerationError;

/// Fixed system instruction establishing the assistant's role and output shape.
const MODIFIER_SYSTEM_PROMPT: &str = "You are an AI code modifier. Provide a short explanation \
     followed by the complete modified code in a single fenced code block.";

/// System instruction for the second-pass refinement.
const REVIEWER_SYSTEM_PROMPT: &str = "You are an AI code reviewer. Improve the code you are \
     given (correctness, clarity, error handling) and return a short explanation followed by \
     the complete improved code in a single fenced code block.";

// ── Seams for the orchestrator ────────────────────────────────────────

/// First-pass generation: code + request (+ optional memory context) → raw response text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(
        &self,
        code: &str,
        request: &str,
        memory_context: Option<&str>,
    ) -> Result<String, GenerationError>;
}

/// Second-pass refinement: generated code → raw critique/refinement text.
#[async_trait]
pub trait Reviewer: Send + Sync {
    async fn critique(&self, code: &str) -> Result<String, GenerationError>;
}

// ── Transport ─────────────────────────────────────────────────────────

/// Client for an OpenAI-style chat-completion endpoint.
pub struct ChatClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl ChatClient {
    /// The `client` is expected to carry the deployment-wide request timeout.
    pub fn new(client: reqwest::Client, config: &LlmConfig) -> Self {
        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }

    /// Send a message list and return the first choice's content.
    pub async fn complete(&self, messages: Vec<ChatMessage>) -> Result<String, GenerationError> {
        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&body)
            .send()
            .await
            .map_err(GenerationError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "failed to read error body".to_string());
            return Err(GenerationError::Service {
                status: status.as_u16(),
                message: service_error_message(&body_text),
            });
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(GenerationError::Transport)?;

        parsed
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.is_empty())
            .ok_or(GenerationError::EmptyCompletion)
    }
}

/// Pull the human-readable message out of an OpenAI-style error body,
/// falling back to the raw body when it isn't that shape.
fn service_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorResponse>(body)
        .map(|wrapper| wrapper.error.message)
        .unwrap_or_else(|_| body.to_string())
}

// ── Wire types ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: &'static str,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: "system", content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: "user", content: content.into() }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

// ── Prompt construction ───────────────────────────────────────────────

/// Build the message list for a generation call.
///
/// The memory system message is included only when the context is non-empty,
/// and the user message embeds the code and request verbatim.
pub(crate) fn generation_messages(
    code: &str,
    request: &str,
    memory_context: Option<&str>,
) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(3);
    if let Some(context) = memory_context
        && !context.trim().is_empty()
    {
        messages.push(ChatMessage::system(format!(
            "Use the following memory of the user's past requests for context:\n{context}"
        )));
    }
    messages.push(ChatMessage::system(MODIFIER_SYSTEM_PROMPT));
    messages.push(ChatMessage::user(format!(
        "Here is the code:\n{code}\n\nPlease {request}."
    )));
    messages
}

/// Build the message list for a feedback call.
pub(crate) fn feedback_messages(code: &str) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(REVIEWER_SYSTEM_PROMPT),
        ChatMessage::user(format!("Here is the code:\n{code}")),
    ]
}

// ── Clients ───────────────────────────────────────────────────────────

/// First-pass generation client.
pub struct GenerationClient {
    chat: Arc<ChatClient>,
}

impl GenerationClient {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Generator for GenerationClient {
    async fn generate(
        &self,
        code: &str,
        request: &str,
        memory_context: Option<&str>,
    ) -> Result<String, GenerationError> {
        self.chat
            .complete(generation_messages(code, request, memory_context))
            .await
    }
}

/// Second-pass feedback client. Same transport and error contract as
/// generation, different prompt.
pub struct FeedbackClient {
    chat: Arc<ChatClient>,
}

impl FeedbackClient {
    pub fn new(chat: Arc<ChatClient>) -> Self {
        Self { chat }
    }
}

#[async_trait]
impl Reviewer for FeedbackClient {
    async fn critique(&self, code: &str) -> Result<String, GenerationError> {
        self.chat.complete(feedback_messages(code)).await
    }
}
