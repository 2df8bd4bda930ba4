use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::errors::{MemoryError, PipelineError, SandboxError};
use crate::memory::MemoryStore;
use crate::pipeline::Orchestrator;
use crate::sandbox::CodeRunner;
use crate::session::SessionStore;

/// Header carrying the signed session identity in both directions.
const SESSION_HEADER: HeaderName = HeaderName::from_static("x-session-id");

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: Orchestrator,
    pub memory: Arc<dyn MemoryStore>,
    pub runner: Arc<dyn CodeRunner>,
    pub sessions: SessionStore,
}

pub type SharedState = Arc<AppState>;

// ── Request/response payload types ────────────────────────────────────

#[derive(Deserialize)]
pub struct ModifyCodeRequest {
    #[serde(default)]
    pub initial_code: Option<String>,
    #[serde(default)]
    pub modification_request: String,
}

#[derive(Serialize)]
pub struct ModifyCodeResponse {
    pub ai_response: String,
    pub generated_code: String,
}

#[derive(Deserialize)]
pub struct RunCodeRequest {
    #[serde(default)]
    pub code: String,
}

#[derive(Serialize)]
pub struct MemoryContextResponse {
    pub memory_context: String,
}

#[derive(Deserialize)]
pub struct AddMemoryRequest {
    #[serde(default)]
    pub user_input: String,
    #[serde(default)]
    pub ai_response: String,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    /// Request rejected before any external call.
    BadRequest(String),
    /// The model responded but produced nothing usable.
    Unprocessable(String),
    /// A remote collaborator failed or returned an error.
    BadGateway(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unprocessable(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(serde_json::json!({"error": message}))).into_response()
    }
}

impl From<PipelineError> for ApiError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::NoCodeProduced => ApiError::Unprocessable(err.to_string()),
            PipelineError::Generation(inner) => ApiError::BadGateway(inner.to_string()),
        }
    }
}

impl From<SandboxError> for ApiError {
    fn from(err: SandboxError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

impl From<MemoryError> for ApiError {
    fn from(err: MemoryError) -> Self {
        ApiError::BadGateway(err.to_string())
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/modify_code", post(modify_code))
        .route("/run_code", post(run_code))
        .route("/get_memory", get(get_memory))
        .route("/add_memory", post(add_memory))
        .route("/reset", post(reset_session))
        .route("/health", get(health_check))
}

// ── Helpers ───────────────────────────────────────────────────────────

fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-session-id").and_then(|value| value.to_str().ok())
}

/// Serialize a payload and stamp the session token on the response.
fn json_with_session<T: Serialize>(token: &str, payload: T) -> Response {
    let mut response = Json(payload).into_response();
    if let Ok(value) = HeaderValue::from_str(token) {
        response.headers_mut().insert(SESSION_HEADER, value);
    }
    response
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn modify_code(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<ModifyCodeRequest>,
) -> Result<Response, ApiError> {
    let token = state.sessions.resolve(session_token(&headers));

    if req.modification_request.trim().is_empty() {
        return Err(ApiError::BadRequest("modification_request is required".to_string()));
    }

    // Follow-up requests may omit the code and operate on the session's
    // current artifact.
    let seed_code = match req.initial_code.filter(|code| !code.trim().is_empty()) {
        Some(code) => code,
        None => state.sessions.current_code(&token).ok_or_else(|| {
            ApiError::BadRequest(
                "initial_code is required when the session has no prior code".to_string(),
            )
        })?,
    };

    let outcome = state
        .orchestrator
        .run_cycle(&token, &seed_code, &req.modification_request)
        .await?;

    // Only a completed cycle overwrites the session's artifact.
    state.sessions.commit_cycle(
        &token,
        &req.modification_request,
        &outcome.response_text,
        &outcome.code,
    );

    Ok(json_with_session(
        &token,
        ModifyCodeResponse {
            ai_response: outcome.response_text,
            generated_code: outcome.code,
        },
    ))
}

async fn run_code(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<RunCodeRequest>,
) -> Result<Response, ApiError> {
    let token = state.sessions.resolve(session_token(&headers));

    if req.code.trim().is_empty() {
        return Err(ApiError::BadRequest("code is required".to_string()));
    }

    let outcome = state.runner.run(&req.code).await?;
    Ok(json_with_session(&token, outcome))
}

async fn get_memory(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = state.sessions.resolve(session_token(&headers));

    // The read surface degrades to an empty context rather than failing.
    let memory_context = match state.memory.fetch(&token).await {
        Ok(context) => context,
        Err(err) => {
            warn!(error = %err, "memory fetch failed, returning empty context");
            String::new()
        }
    };

    Ok(json_with_session(&token, MemoryContextResponse { memory_context }))
}

async fn add_memory(
    State(state): State<SharedState>,
    headers: HeaderMap,
    Json(req): Json<AddMemoryRequest>,
) -> Result<Response, ApiError> {
    let token = state.sessions.resolve(session_token(&headers));

    if req.user_input.trim().is_empty() || req.ai_response.trim().is_empty() {
        return Err(ApiError::BadRequest(
            "user_input and ai_response are required".to_string(),
        ));
    }

    // Unlike pipeline persistence, this surface exists to write memory, so a
    // store failure is reported instead of swallowed.
    state
        .memory
        .append(&token, &req.user_input, &req.ai_response, Some("add_memory"))
        .await?;

    Ok(json_with_session(&token, MessageResponse { message: "Memory added.".to_string() }))
}

async fn reset_session(
    State(state): State<SharedState>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = state.sessions.resolve(session_token(&headers));

    if let Err(err) = state.memory.clear(&token).await {
        warn!(error = %err, "failed to clear remote memory during reset");
    }
    state.sessions.reset(&token);

    // A reset hands back a brand-new identity.
    let fresh = state.sessions.issue();
    Ok(json_with_session(&fresh, MessageResponse { message: "Session reset.".to_string() }))
}
