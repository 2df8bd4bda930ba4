//! Modify-code pipeline orchestration.
//!
//! One cycle walks `Idle → ContextLoaded → Generated → FeedbackApplied →
//! Persisted → Done`, with an error exit from any non-terminal state:
//!
//! 1. memory fetch — fails soft to an empty context, never aborts;
//! 2. generation + extraction — no usable code block is the one hard error;
//! 3. feedback (an optional, config-toggled stage of this same pipeline) —
//!    any failure degrades to the unrefined generated code;
//! 4. persistence — best-effort, logged and discarded here and only here;
//! 5. the outcome is returned; the *caller* commits the session's current
//!    code artifact, so a failed cycle leaves the previous artifact intact.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::errors::PipelineError;
use crate::extract::extract_code;
use crate::llm::{Generator, Reviewer};
use crate::memory::MemoryStore;

/// Result of a completed cycle.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// Full raw response text (explanation + fenced block) of whichever pass
    /// produced the final code.
    pub response_text: String,
    /// The extracted final code artifact.
    pub code: String,
}

#[derive(Debug, Clone, Copy)]
enum CycleState {
    Idle,
    ContextLoaded,
    Generated,
    FeedbackApplied,
    Persisted,
}

/// Sequences memory, generation, feedback, and persistence for one user.
pub struct Orchestrator {
    generator: Arc<dyn Generator>,
    reviewer: Arc<dyn Reviewer>,
    memory: Arc<dyn MemoryStore>,
    feedback_enabled: bool,
}

impl Orchestrator {
    pub fn new(
        generator: Arc<dyn Generator>,
        reviewer: Arc<dyn Reviewer>,
        memory: Arc<dyn MemoryStore>,
        feedback_enabled: bool,
    ) -> Self {
        Self { generator, reviewer, memory, feedback_enabled }
    }

    /// Run one modify-code cycle for `user_id` against `code`.
    pub async fn run_cycle(
        &self,
        user_id: &str,
        code: &str,
        request: &str,
    ) -> Result<CycleOutcome, PipelineError> {
        let mut state = CycleState::Idle;
        debug!(?state, user_id, "starting modify-code cycle");

        // Context load never aborts the cycle: a degraded memory store just
        // means generating without continuity.
        let memory_context = match self.memory.fetch(user_id).await {
            Ok(context) => context,
            Err(err) => {
                warn!(user_id, error = %err, "memory fetch failed, proceeding without context");
                String::new()
            }
        };
        state = CycleState::ContextLoaded;
        debug!(?state, context_len = memory_context.len(), "loaded memory context");

        let context = (!memory_context.is_empty()).then_some(memory_context.as_str());
        let response = self.generator.generate(code, request, context).await?;
        let generated = extract_code(&response)
            .filter(|c| !c.is_empty())
            .ok_or(PipelineError::NoCodeProduced)?;
        state = CycleState::Generated;
        debug!(?state, code_len = generated.len(), "extracted generated code");

        let (final_response, final_code) = if self.feedback_enabled {
            self.apply_feedback(response, generated).await
        } else {
            (response, generated)
        };
        state = CycleState::FeedbackApplied;
        debug!(?state, "feedback stage complete");

        // Persistence is fire-and-forget toward the user, but the failure is
        // surfaced to operators at this single call site.
        if let Err(err) = self
            .memory
            .append(user_id, request, &final_response, Some("modify_code"))
            .await
        {
            warn!(user_id, error = %err, "failed to persist interaction to memory");
        }
        state = CycleState::Persisted;
        debug!(?state, "cycle complete");

        Ok(CycleOutcome { response_text: final_response, code: final_code })
    }

    /// Run the feedback pass; any failure keeps the generated code unchanged.
    async fn apply_feedback(&self, response: String, code: String) -> (String, String) {
        match self.reviewer.critique(&code).await {
            Ok(review) => match extract_code(&review).filter(|c| !c.is_empty()) {
                Some(refined) => (review, refined),
                None => {
                    warn!("feedback pass returned no code block, keeping generated code");
                    (response, code)
                }
            },
            Err(err) => {
                warn!(error = %err, "feedback pass failed, keeping generated code");
                (response, code)
            }
        }
    }
}
