//! Typed error hierarchy for the Tailor service.
//!
//! Four top-level enums cover the four subsystems:
//! - `GenerationError` — chat-completion client failures (generation and feedback)
//! - `MemoryError` — remote memory store failures
//! - `SandboxError` — remote sandbox transport/service failures
//! - `PipelineError` — modify-code cycle failures
//!
//! An execution-level fault inside sandboxed code is deliberately *not* an
//! error here: it is carried as data on `ExecutionOutcome` (see `sandbox`).

use thiserror::Error;

/// Errors from the chat-completion clients (generation and feedback passes).
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("chat completion request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("chat service returned {status}: {message}")]
    Service { status: u16, message: String },

    #[error("chat completion carried no content")]
    EmptyCompletion,
}

/// Errors from the remote memory store.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("memory store returned {status}: {message}")]
    Service { status: u16, message: String },
}

/// Errors reaching or driving the remote sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("sandbox request failed: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("sandbox service returned {status}: {message}")]
    Service { status: u16, message: String },
}

/// Errors from a single modify-code cycle.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("no code block found in model response")]
    NoCodeProduced,

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generation_error_service_carries_status_and_message() {
        let err = GenerationError::Service {
            status: 429,
            message: "rate limited".to_string(),
        };
        match &err {
            GenerationError::Service { status, message } => {
                assert_eq!(*status, 429);
                assert_eq!(message, "rate limited");
            }
            _ => panic!("Expected Service variant"),
        }
        assert!(err.to_string().contains("429"));
        assert!(err.to_string().contains("rate limited"));
    }

    #[test]
    fn pipeline_error_converts_from_generation_error() {
        let inner = GenerationError::EmptyCompletion;
        let err: PipelineError = inner.into();
        match &err {
            PipelineError::Generation(GenerationError::EmptyCompletion) => {}
            _ => panic!("Expected PipelineError::Generation(EmptyCompletion)"),
        }
    }

    #[test]
    fn pipeline_error_no_code_is_distinct_from_generation() {
        let err = PipelineError::NoCodeProduced;
        assert!(matches!(err, PipelineError::NoCodeProduced));
        assert!(err.to_string().contains("no code block"));
    }

    #[test]
    fn memory_error_service_message_passes_through() {
        let err = MemoryError::Service {
            status: 503,
            message: "store unavailable".to_string(),
        };
        assert!(err.to_string().contains("store unavailable"));
    }

    #[test]
    fn all_error_types_implement_std_error_trait() {
        fn assert_std_error<E: std::error::Error>(_: &E) {}
        assert_std_error(&GenerationError::EmptyCompletion);
        assert_std_error(&MemoryError::Service {
            status: 500,
            message: "x".into(),
        });
        assert_std_error(&SandboxError::Service {
            status: 500,
            message: "x".into(),
        });
        assert_std_error(&PipelineError::NoCodeProduced);
    }
}
