//! Repository traits for ideaforge abstractions.
//!
//! These traits define the persistence seams the pipeline and worker operate
//! through, enabling Postgres implementations in production and in-memory
//! fakes in tests.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use uuid::Uuid;

use crate::backend::RawCompletion;
use crate::error::Result;
use crate::models::*;

// =============================================================================
// SESSION REPOSITORY
// =============================================================================

/// Request for listing sessions.
#[derive(Debug, Clone, Default)]
pub struct ListSessionsRequest {
    /// Page size, clamped to `1..=100` by the repository (default 20).
    pub limit: Option<i64>,
    /// Pagination offset, `>= 0`.
    pub offset: Option<i64>,
    /// Optional status filter.
    pub status: Option<SessionStatus>,
}

/// Response for listing sessions.
#[derive(Debug, Clone)]
pub struct ListSessionsResponse {
    pub sessions: Vec<Session>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

/// Repository for sessions and their provider response rows.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Create a new session in `pending`.
    async fn create(&self, problem_statement: &str, metadata: JsonValue) -> Result<Session>;

    /// Fetch a session by id. Soft-deleted sessions are still fetchable.
    async fn get(&self, id: Uuid) -> Result<Session>;

    /// List sessions, excluding soft-deleted ones.
    async fn list(&self, req: ListSessionsRequest) -> Result<ListSessionsResponse>;

    /// Update session status. Idempotent for equal status; non-monotonic
    /// transitions are rejected with `Error::InvalidInput`.
    async fn update_status(&self, id: Uuid, status: SessionStatus) -> Result<()>;

    /// Soft-delete a session (hidden from listings, subtree kept).
    async fn soft_delete(&self, id: Uuid) -> Result<()>;

    /// Persist a successful provider attempt; returns the response row id.
    async fn save_provider_success(
        &self,
        session_id: Uuid,
        provider: &str,
        model: Option<&str>,
        completion: &RawCompletion,
    ) -> Result<Uuid>;

    /// Persist a failed provider attempt. `raw_text` is kept when the
    /// failure happened after a response arrived (parse failures) so the
    /// offending output stays auditable. Never fails loudly: a secondary
    /// database error here is logged and swallowed.
    async fn save_provider_failure(
        &self,
        session_id: Uuid,
        provider: &str,
        model: Option<&str>,
        message: &str,
        raw_text: Option<&str>,
    );

    /// Most recent provider response row for a session, if any.
    async fn latest_response(&self, session_id: Uuid) -> Result<Option<ProviderResponse>>;

    /// All provider response rows for a session, oldest first.
    async fn list_responses(&self, session_id: Uuid) -> Result<Vec<ProviderResponse>>;
}

// =============================================================================
// IDEA REPOSITORY
// =============================================================================

/// One idea ready for insertion, with clustering attributes attached.
///
/// `duplicate_of` is intentionally absent: stored ids are unknown at first
/// insert, so duplicate references are patched in a second pass.
#[derive(Debug, Clone)]
pub struct NewIdeaRow {
    pub draft: IdeaDraft,
    pub cluster_id: i32,
    pub is_duplicate: bool,
    pub similarity_to_duplicate: Option<f64>,
    pub embedding: Option<Vec<f32>>,
}

/// Second-pass duplicate reference resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DuplicateUpdate {
    pub idea_id: Uuid,
    pub duplicate_of: Uuid,
    pub similarity: f64,
}

/// Repository for idea rows.
#[async_trait]
pub trait IdeaRepository: Send + Sync {
    /// Insert ideas for one provider response in a single transaction.
    ///
    /// Rows are inserted in input order and the returned ids preserve that
    /// order; the orchestrator relies on it to reverse-map original indices
    /// to stored ids.
    async fn save_ideas(
        &self,
        session_id: Uuid,
        response_id: Uuid,
        provider: &str,
        rows: &[NewIdeaRow],
    ) -> Result<Vec<Uuid>>;

    /// Patch `duplicate_of` references in one transaction.
    async fn update_duplicate_references(&self, updates: &[DuplicateUpdate]) -> Result<()>;

    /// Fetch one idea by id.
    async fn get(&self, id: Uuid) -> Result<Idea>;

    /// All ideas for a session, optionally only non-duplicates.
    async fn list_for_session(&self, session_id: Uuid, unique_only: bool) -> Result<Vec<Idea>>;

    /// Non-duplicate ideas ranked by `confidence DESC, novelty DESC`.
    async fn unique_ranked(&self, session_id: Uuid) -> Result<Vec<Idea>>;
}

// =============================================================================
// DEEPENING REPOSITORY
// =============================================================================

/// A deepening record ready for insertion.
#[derive(Debug, Clone)]
pub struct NewDeepeningRecord {
    pub session_id: Uuid,
    pub idea_id: Uuid,
    pub provider: String,
    pub depth_level: i16,
    pub prompt_used: String,
    pub result: Option<DeepeningPayload>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub latency_ms: Option<i64>,
    pub status: ResponseStatus,
}

/// Repository for deepening records.
#[async_trait]
pub trait DeepeningRepository: Send + Sync {
    /// Persist a deepening record.
    async fn insert(&self, record: NewDeepeningRecord) -> Result<DeepeningRecord>;

    /// All deepening records for an idea, newest first.
    async fn list_for_idea(&self, idea_id: Uuid) -> Result<Vec<DeepeningRecord>>;
}

// =============================================================================
// JOB REPOSITORY
// =============================================================================

/// Durable, at-least-once research work list.
#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Enqueue a job; returns the opaque job id.
    async fn enqueue(&self, payload: &JobPayload) -> Result<Uuid>;

    /// Claim the next runnable job (waiting or requeued-stalled, due now).
    /// At most one worker observes any given job as active.
    async fn claim_next(&self) -> Result<Option<Job>>;

    /// Record worker liveness for an active job.
    async fn heartbeat(&self, job_id: Uuid) -> Result<()>;

    /// Update job progress (0..=100).
    async fn update_progress(&self, job_id: Uuid, progress: i32) -> Result<()>;

    /// Mark a job completed with its result document.
    async fn complete(&self, job_id: Uuid, result: JsonValue) -> Result<()>;

    /// Record a failed attempt: reschedules with exponential backoff while
    /// attempts remain, otherwise marks the job failed.
    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()>;

    /// Requeue active jobs whose heartbeat is older than `stall_timeout`.
    /// Jobs that stall beyond the allowed count are failed instead.
    /// Returns the number of jobs touched.
    async fn recover_stalled(&self, stall_timeout: Duration) -> Result<u64>;

    /// Apply retention: completed jobs beyond 24h or the keep-count, failed
    /// jobs beyond 7 days. Returns the number of rows deleted.
    async fn cleanup(&self) -> Result<u64>;

    /// Fetch a job by id.
    async fn get(&self, job_id: Uuid) -> Result<Option<Job>>;

    /// Number of jobs currently waiting.
    async fn waiting_count(&self) -> Result<i64>;
}
