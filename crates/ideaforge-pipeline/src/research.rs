//! The research pipeline orchestrator.
//!
//! Turns a problem statement into a completed session: fan-out across
//! providers, validation, batched embedding, clustering and deduplication,
//! transactional persistence with a two-pass duplicate patch, and the final
//! ranked result.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ideaforge_cluster::SimilarityAnalysis;
use ideaforge_core::{
    ClusterSummary, DuplicateUpdate, Error, Idea, IdeaDraft, IdeaRepository, NewIdeaRow,
    ProviderStatus, RawCompletion, Result, SessionRepository, SessionStatus,
};
use ideaforge_inference::{
    issues_to_message, parse_research, prompts, EmbeddingClient, ProviderRegistry,
};

/// Similarity thresholds the pipeline runs with.
#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub cluster_threshold: f64,
    pub dedup_threshold: f64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            cluster_threshold: ideaforge_core::defaults::CLUSTER_THRESHOLD,
            dedup_threshold: ideaforge_core::defaults::DEDUP_THRESHOLD,
        }
    }
}

/// One research invocation request.
#[derive(Debug, Clone)]
pub struct ResearchRequest {
    pub problem_statement: String,
    pub metadata: JsonValue,
    /// Pre-created session to reuse (queue retries); a new session is
    /// created when absent.
    pub session_id: Option<Uuid>,
}

/// The completed result surfaced to callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub session_id: Uuid,
    pub status: SessionStatus,
    pub summary: ClusterSummary,
    pub unique_ideas: Vec<Idea>,
    pub provider_status: Vec<ProviderStatus>,
}

/// One validated provider success, ready for flattening.
struct ValidatedResponse {
    provider: String,
    model: String,
    response_id: Uuid,
    drafts: Vec<IdeaDraft>,
    latency_ms: i64,
}

/// An idea tagged with its provenance and flattened position.
struct FlattenedIdea {
    original_idx: usize,
    provider: String,
    response_id: Uuid,
    draft: IdeaDraft,
}

/// The research engine: orchestrates fan-out, validation, embedding,
/// clustering, and persistence for one session at a time.
pub struct ResearchEngine {
    pub(crate) sessions: Arc<dyn SessionRepository>,
    pub(crate) ideas: Arc<dyn IdeaRepository>,
    pub(crate) registry: Arc<ProviderRegistry>,
    pub(crate) embedder: Arc<EmbeddingClient>,
    pub(crate) settings: PipelineSettings,
}

impl ResearchEngine {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        ideas: Arc<dyn IdeaRepository>,
        registry: Arc<ProviderRegistry>,
        embedder: Arc<EmbeddingClient>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            sessions,
            ideas,
            registry,
            embedder,
            settings,
        }
    }

    /// Run the full research pipeline.
    ///
    /// Any failure after the session is `processing` flips it to `failed`
    /// best-effort before the error surfaces.
    pub async fn run_research(&self, request: ResearchRequest) -> Result<ResearchOutcome> {
        let session = match request.session_id {
            Some(id) => {
                let session = self.sessions.get(id).await?;
                match session.status {
                    // At-least-once retries of an already-finished session
                    // return the stored result instead of re-running.
                    SessionStatus::Completed => {
                        info!(session_id = %id, "Session already completed, returning stored result");
                        return self.stored_outcome(id).await;
                    }
                    SessionStatus::Failed => {
                        return Err(Error::InvalidInput(format!(
                            "session {id} already failed; start a new session"
                        )));
                    }
                    SessionStatus::Pending | SessionStatus::Processing => session,
                }
            }
            None => {
                self.sessions
                    .create(&request.problem_statement, request.metadata.clone())
                    .await?
            }
        };

        let session_id = session.id;
        self.sessions
            .update_status(session_id, SessionStatus::Processing)
            .await?;

        match self.run_processing(session_id, &session.problem_statement).await {
            Ok(outcome) => Ok(outcome),
            Err(primary) => {
                // Best effort: a secondary DB failure must not mask the
                // primary error.
                if let Err(secondary) = self
                    .sessions
                    .update_status(session_id, SessionStatus::Failed)
                    .await
                {
                    error!(
                        session_id = %session_id,
                        error = %secondary,
                        "Failed to flip session to failed"
                    );
                }
                Err(primary)
            }
        }
    }

    /// Steps 2-9: everything that runs while the session is `processing`.
    async fn run_processing(
        &self,
        session_id: Uuid,
        problem_statement: &str,
    ) -> Result<ResearchOutcome> {
        // Fan-out.
        let system = prompts::research_system_prompt();
        let user = prompts::research_user_prompt(problem_statement);
        let outcomes = self.registry.execute_all(&system, &user).await;
        info!(
            session_id = %session_id,
            provider_count = outcomes.len(),
            succeeded = outcomes.iter().filter(|o| o.is_success()).count(),
            "Fan-out complete"
        );

        // Partition, persist response rows, validate.
        let mut provider_status = Vec::with_capacity(outcomes.len());
        let mut validated: Vec<ValidatedResponse> = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok(completion) => {
                    match self
                        .persist_and_validate(session_id, &outcome.provider, &outcome.model, completion)
                        .await?
                    {
                        Ok(response) => {
                            provider_status.push(ProviderStatus {
                                provider: response.provider.clone(),
                                model: Some(response.model.clone()),
                                success: true,
                                error: None,
                                latency_ms: Some(response.latency_ms),
                                idea_count: response.drafts.len(),
                            });
                            validated.push(response);
                        }
                        Err(status) => provider_status.push(status),
                    }
                }
                Err(failure) => {
                    self.sessions
                        .save_provider_failure(
                            session_id,
                            &outcome.provider,
                            Some(&outcome.model),
                            &failure.to_string(),
                            None,
                        )
                        .await;
                    provider_status.push(ProviderStatus {
                        provider: outcome.provider,
                        model: Some(outcome.model),
                        success: false,
                        error: Some(failure.to_string()),
                        latency_ms: None,
                        idea_count: 0,
                    });
                }
            }
        }

        if validated.is_empty() {
            warn!(session_id = %session_id, "No provider produced usable ideas");
            self.sessions
                .update_status(session_id, SessionStatus::Failed)
                .await?;
            return Err(Error::AllProvidersFailed);
        }

        // Flatten in deterministic order: successes in fan-out report order,
        // ideas in adapter-returned order within each success.
        let mut flattened: Vec<FlattenedIdea> = Vec::new();
        for response in &validated {
            for draft in &response.drafts {
                flattened.push(FlattenedIdea {
                    original_idx: flattened.len(),
                    provider: response.provider.clone(),
                    response_id: response.response_id,
                    draft: draft.clone(),
                });
            }
        }

        // One batched embedding call for every idea, in order.
        let texts: Vec<String> = flattened
            .iter()
            .map(|idea| idea.draft.embedding_text())
            .collect();
        let embeddings = self.embedder.embed(&texts).await?;
        debug!(
            session_id = %session_id,
            idea_count = flattened.len(),
            "Embeddings generated"
        );

        // Similarity pipeline.
        let confidences: Vec<f64> = flattened
            .iter()
            .map(|idea| idea.draft.confidence_score)
            .collect();
        let analysis = ideaforge_cluster::analyze(
            &embeddings,
            &confidences,
            self.settings.cluster_threshold,
            self.settings.dedup_threshold,
        );

        // Persist ideas grouped per provider response, then patch duplicate
        // references through the originalIdx -> storedId mapping.
        let id_by_original_idx = self
            .persist_ideas(session_id, &flattened, &embeddings, &analysis)
            .await?;
        self.patch_duplicates(&analysis, &id_by_original_idx).await?;

        self.sessions
            .update_status(session_id, SessionStatus::Completed)
            .await?;

        let unique_ideas = self.ideas.unique_ranked(session_id).await?;
        info!(
            session_id = %session_id,
            total = analysis.summary.total_ideas,
            unique = analysis.summary.unique_ideas,
            duplicates = analysis.summary.duplicates,
            clusters = analysis.summary.clusters,
            "Research pipeline completed"
        );

        Ok(ResearchOutcome {
            session_id,
            status: SessionStatus::Completed,
            summary: analysis.summary,
            unique_ideas,
            provider_status,
        })
    }

    /// Persist one successful completion and validate its payload.
    ///
    /// Outer error: database failure (aborts the pipeline). Inner error: the
    /// provider's output failed validation, recorded as a per-provider
    /// failure status.
    async fn persist_and_validate(
        &self,
        session_id: Uuid,
        provider: &str,
        model: &str,
        completion: RawCompletion,
    ) -> Result<std::result::Result<ValidatedResponse, ProviderStatus>> {
        match parse_research(&completion.text) {
            Ok(output) => {
                let response_id = self
                    .sessions
                    .save_provider_success(session_id, provider, Some(model), &completion)
                    .await?;
                Ok(Ok(ValidatedResponse {
                    provider: provider.to_string(),
                    model: model.to_string(),
                    response_id,
                    drafts: output.ideas,
                    latency_ms: completion.latency_ms,
                }))
            }
            Err(issues) => {
                let message = format!("output validation failed: {}", issues_to_message(&issues));
                warn!(
                    session_id = %session_id,
                    provider,
                    error = %message,
                    "Provider output rejected"
                );
                self.sessions
                    .save_provider_failure(
                        session_id,
                        provider,
                        Some(model),
                        &message,
                        Some(&completion.text),
                    )
                    .await;
                Ok(Err(ProviderStatus {
                    provider: provider.to_string(),
                    model: Some(model.to_string()),
                    success: false,
                    error: Some(message),
                    latency_ms: Some(completion.latency_ms),
                    idea_count: 0,
                }))
            }
        }
    }

    /// Step 7: group enriched ideas by provider response and insert each
    /// group in one transaction, preserving original indices so inserted
    /// ids can be reverse-mapped.
    async fn persist_ideas(
        &self,
        session_id: Uuid,
        flattened: &[FlattenedIdea],
        embeddings: &[Vec<f32>],
        analysis: &SimilarityAnalysis,
    ) -> Result<BTreeMap<usize, Uuid>> {
        // BTreeMap keeps group iteration deterministic across runs.
        let mut groups: BTreeMap<Uuid, (String, Vec<usize>)> = BTreeMap::new();
        for idea in flattened {
            groups
                .entry(idea.response_id)
                .or_insert_with(|| (idea.provider.clone(), Vec::new()))
                .1
                .push(idea.original_idx);
        }

        let mut id_by_original_idx = BTreeMap::new();
        for (response_id, (provider, original_indices)) in groups {
            let rows: Vec<NewIdeaRow> = original_indices
                .iter()
                .map(|&idx| {
                    let flag = &analysis.flags[idx];
                    NewIdeaRow {
                        draft: flattened[idx].draft.clone(),
                        cluster_id: analysis.clusters[idx] as i32,
                        is_duplicate: flag.is_duplicate,
                        similarity_to_duplicate: flag.similarity,
                        embedding: Some(embeddings[idx].clone()),
                    }
                })
                .collect();

            let ids = self
                .ideas
                .save_ideas(session_id, response_id, &provider, &rows)
                .await?;
            for (&original_idx, id) in original_indices.iter().zip(ids) {
                id_by_original_idx.insert(original_idx, id);
            }
        }

        Ok(id_by_original_idx)
    }

    /// Step 8: translate `duplicate_of` indices to stored ids and patch.
    async fn patch_duplicates(
        &self,
        analysis: &SimilarityAnalysis,
        id_by_original_idx: &BTreeMap<usize, Uuid>,
    ) -> Result<()> {
        let mut updates = Vec::new();
        for (idx, flag) in analysis.flags.iter().enumerate() {
            let (Some(keeper_idx), Some(similarity)) = (flag.duplicate_of_idx, flag.similarity)
            else {
                continue;
            };
            let (Some(&idea_id), Some(&duplicate_of)) = (
                id_by_original_idx.get(&idx),
                id_by_original_idx.get(&keeper_idx),
            ) else {
                return Err(Error::Internal(format!(
                    "duplicate reference {idx}->{keeper_idx} missing stored id"
                )));
            };
            updates.push(DuplicateUpdate {
                idea_id,
                duplicate_of,
                similarity,
            });
        }

        self.ideas.update_duplicate_references(&updates).await
    }

    /// Rebuild the outcome of an already-completed session from storage.
    async fn stored_outcome(&self, session_id: Uuid) -> Result<ResearchOutcome> {
        let all = self.ideas.list_for_session(session_id, false).await?;
        let unique_ideas = self.ideas.unique_ranked(session_id).await?;

        let duplicates = all.iter().filter(|i| i.is_duplicate).count();
        let clusters = all
            .iter()
            .filter_map(|i| i.cluster_id)
            .collect::<std::collections::HashSet<_>>()
            .len();
        let summary = ClusterSummary {
            total_ideas: all.len(),
            unique_ideas: all.len() - duplicates,
            duplicates,
            clusters,
        };

        let responses = self.sessions.list_responses(session_id).await?;
        let provider_status = responses
            .into_iter()
            .map(|r| {
                let idea_count = all.iter().filter(|i| i.response_id == r.id).count();
                ProviderStatus {
                    provider: r.provider,
                    model: r.model,
                    success: r.status == ideaforge_core::ResponseStatus::Success,
                    error: r.error_message,
                    latency_ms: r.latency_ms,
                    idea_count,
                }
            })
            .collect();

        Ok(ResearchOutcome {
            session_id,
            status: SessionStatus::Completed,
            summary,
            unique_ideas,
            provider_status,
        })
    }
}
