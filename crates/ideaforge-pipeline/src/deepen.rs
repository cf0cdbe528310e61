//! The deepening path: single-provider elaboration of one persisted idea.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use ideaforge_core::{
    DeepeningRecord, DeepeningRepository, Error, IdeaRepository, NewDeepeningRecord,
    ResponseStatus, Result, SessionRepository, SessionStatus,
};
use ideaforge_inference::{issues_to_message, parse_deepening, prompts, ProviderRegistry};

use crate::research::ResearchEngine;

/// One deepening invocation request.
#[derive(Debug, Clone)]
pub struct DeepeningRequest {
    pub session_id: Uuid,
    pub idea_id: Uuid,
    /// Provider name; the default adapter when absent.
    pub provider: Option<String>,
    pub depth_level: i16,
}

/// Deepening support for the research engine.
pub struct DeepeningEngine {
    sessions: Arc<dyn SessionRepository>,
    ideas: Arc<dyn IdeaRepository>,
    deepening: Arc<dyn DeepeningRepository>,
    registry: Arc<ProviderRegistry>,
}

impl DeepeningEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        ideas: Arc<dyn IdeaRepository>,
        deepening: Arc<dyn DeepeningRepository>,
        registry: Arc<ProviderRegistry>,
    ) -> Self {
        Self {
            sessions,
            ideas,
            deepening,
            registry,
        }
    }

    /// Borrow the repositories of an existing research engine.
    pub fn from_research(engine: &ResearchEngine, deepening: Arc<dyn DeepeningRepository>) -> Self {
        Self {
            sessions: engine.sessions.clone(),
            ideas: engine.ideas.clone(),
            deepening,
            registry: engine.registry.clone(),
        }
    }

    /// Deepen one idea at the requested depth level.
    ///
    /// Preconditions are checked before any provider call: the session and
    /// idea must exist, the idea must belong to the session, the session
    /// must be completed, and the depth level must be 1..=3. No record is
    /// written when a precondition fails.
    pub async fn deepen(&self, request: DeepeningRequest) -> Result<DeepeningRecord> {
        if !(1..=3).contains(&request.depth_level) {
            return Err(Error::InvalidInput(format!(
                "depth_level must be 1..3, got {}",
                request.depth_level
            )));
        }

        let session = self.sessions.get(request.session_id).await?;
        let idea = self.ideas.get(request.idea_id).await?;
        if idea.session_id != request.session_id {
            return Err(Error::IdeaSessionMismatch {
                idea_id: request.idea_id,
                session_id: request.session_id,
            });
        }
        if session.status != SessionStatus::Completed {
            return Err(Error::InvalidInput(format!(
                "session {} is {}, deepening requires a completed session",
                session.id, session.status
            )));
        }

        let adapter = self.registry.resolve_for_deepening(request.provider.as_deref())?;
        let system = prompts::deepening_system_prompt();
        let user =
            prompts::deepening_user_prompt(&idea, &session.problem_statement, request.depth_level);

        info!(
            session_id = %session.id,
            idea_id = %idea.id,
            provider = adapter.name(),
            depth_level = request.depth_level,
            "Dispatching deepening call"
        );

        let base_record = |status: ResponseStatus| NewDeepeningRecord {
            session_id: session.id,
            idea_id: idea.id,
            provider: adapter.name().to_string(),
            depth_level: request.depth_level,
            prompt_used: user.clone(),
            result: None,
            prompt_tokens: None,
            completion_tokens: None,
            latency_ms: None,
            status,
        };

        let completion = match adapter.call(&system, &user).await {
            Ok(completion) => completion,
            Err(failure) => {
                warn!(
                    idea_id = %idea.id,
                    provider = adapter.name(),
                    error = %failure,
                    "Deepening provider call failed"
                );
                self.deepening
                    .insert(base_record(ResponseStatus::Failed))
                    .await?;
                return Err(adapter.failure_to_error(&failure));
            }
        };

        match parse_deepening(&completion.text) {
            Ok(payload) => {
                let record = NewDeepeningRecord {
                    result: Some(payload),
                    prompt_tokens: completion.prompt_tokens,
                    completion_tokens: completion.completion_tokens,
                    latency_ms: Some(completion.latency_ms),
                    ..base_record(ResponseStatus::Success)
                };
                self.deepening.insert(record).await
            }
            Err(issues) => {
                let message = issues_to_message(&issues);
                warn!(
                    idea_id = %idea.id,
                    provider = adapter.name(),
                    error = %message,
                    "Deepening output rejected"
                );
                let record = NewDeepeningRecord {
                    prompt_tokens: completion.prompt_tokens,
                    completion_tokens: completion.completion_tokens,
                    latency_ms: Some(completion.latency_ms),
                    ..base_record(ResponseStatus::Failed)
                };
                self.deepening.insert(record).await?;
                Err(Error::Parse {
                    message,
                    raw_text: completion.text,
                })
            }
        }
    }
}
