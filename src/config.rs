use std::time::Duration;

use anyhow::{Context, Result, anyhow};

/// Runtime configuration for the Tailor service.
///
/// Everything is environment-sourced (a `.env` file is honored via dotenvy
/// before this is read). The sampling parameters are deployment constants,
/// never taken from request payloads.
#[derive(Debug, Clone)]
pub struct Config {
    pub llm: LlmConfig,
    pub memory: ServiceConfig,
    pub sandbox: ServiceConfig,
    /// Secret used to sign session identity tokens.
    pub session_secret: String,
    /// Bound applied to every outbound call (generation, feedback, memory, sandbox).
    pub request_timeout: Duration,
    /// Whether the second-pass feedback stage of the pipeline runs at all.
    pub feedback_enabled: bool,
}

/// Chat-completion endpoint settings.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Settings for a keyed remote service (memory store, sandbox).
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub api_key: String,
    pub base_url: String,
}

const DEFAULT_LLM_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LLM_MODEL: &str = "gpt-4o";
const DEFAULT_MEMORY_BASE_URL: &str = "https://api.mem0.ai";
const DEFAULT_SANDBOX_BASE_URL: &str = "https://api.e2b.dev";
const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_TEMPERATURE: f32 = 0.3;
const DEFAULT_MAX_TOKENS: u32 = 1024;

impl Config {
    /// Load configuration from process environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    ///
    /// Tests pass closures here instead of mutating the process environment.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let required = |key: &str| {
            get(key)
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow!("{} is not set", key))
        };

        let timeout_secs = match get("TAILOR_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .with_context(|| format!("TAILOR_REQUEST_TIMEOUT_SECS is not a number: {raw:?}"))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        let feedback_enabled = match get("TAILOR_FEEDBACK_ENABLED") {
            Some(raw) => parse_bool(&raw)
                .ok_or_else(|| anyhow!("TAILOR_FEEDBACK_ENABLED is not a boolean: {raw:?}"))?,
            None => true,
        };

        Ok(Self {
            llm: LlmConfig {
                api_key: required("TAILOR_LLM_API_KEY")?,
                base_url: get("TAILOR_LLM_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_LLM_BASE_URL.to_string()),
                model: get("TAILOR_LLM_MODEL").unwrap_or_else(|| DEFAULT_LLM_MODEL.to_string()),
                temperature: DEFAULT_TEMPERATURE,
                max_tokens: DEFAULT_MAX_TOKENS,
            },
            memory: ServiceConfig {
                api_key: required("TAILOR_MEMORY_API_KEY")?,
                base_url: get("TAILOR_MEMORY_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_MEMORY_BASE_URL.to_string()),
            },
            sandbox: ServiceConfig {
                api_key: required("TAILOR_SANDBOX_API_KEY")?,
                base_url: get("TAILOR_SANDBOX_BASE_URL")
                    .unwrap_or_else(|| DEFAULT_SANDBOX_BASE_URL.to_string()),
            },
            session_secret: required("TAILOR_SESSION_SECRET")?,
            request_timeout: Duration::from_secs(timeout_secs),
            feedback_enabled,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
