//! HTTP server assembly.
//!
//! Wires the remote collaborators (chat completion, memory store, sandbox)
//! and the session store into the axum router and runs it with graceful
//! shutdown. All outbound calls share one timeout-bounded reqwest client.

pub mod api;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::info;

use crate::config::Config;
use crate::llm::{ChatClient, FeedbackClient, GenerationClient};
use crate::memory::MemoryGateway;
use crate::pipeline::Orchestrator;
use crate::sandbox::SandboxExecutor;
use crate::session::SessionStore;

use api::{AppState, SharedState};

/// Listener configuration for the service.
pub struct ServerConfig {
    pub port: u16,
    /// Binds on all interfaces and relaxes CORS for local UI development.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080, dev_mode: false }
    }
}

/// Build the application state from runtime configuration.
pub fn build_state(config: &Config) -> Result<SharedState> {
    let http = reqwest::Client::builder()
        .timeout(config.request_timeout)
        .build()
        .context("Failed to build HTTP client")?;

    let chat = Arc::new(ChatClient::new(http.clone(), &config.llm));
    let memory = Arc::new(MemoryGateway::new(http.clone(), &config.memory));

    let orchestrator = Orchestrator::new(
        Arc::new(GenerationClient::new(chat.clone())),
        Arc::new(FeedbackClient::new(chat)),
        memory.clone(),
        config.feedback_enabled,
    );

    Ok(Arc::new(AppState {
        orchestrator,
        memory,
        runner: Arc::new(SandboxExecutor::new(http, &config.sandbox)),
        sessions: SessionStore::new(config.session_secret.clone()),
    }))
}

/// Build the full application router.
pub fn build_router(state: SharedState) -> Router {
    api::api_router().with_state(state)
}

/// Start the service and block until shutdown.
pub async fn start_server(config: Config, server: ServerConfig) -> Result<()> {
    let state = build_state(&config)?;
    let mut app = build_router(state);

    if server.dev_mode {
        app = app.layer(CorsLayer::permissive());
    }

    let host = if server.dev_mode { "0.0.0.0" } else { "127.0.0.1" };
    let addr = format!("{}:{}", host, server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!(addr = %listener.local_addr()?, "tailor listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    info!("shutting down");
}
