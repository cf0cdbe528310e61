//! Job handlers executed by the worker pool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::info;
use uuid::Uuid;

use ideaforge_core::{Job, JobPayload};
use ideaforge_pipeline::{ResearchEngine, ResearchRequest};

/// Progress callback type for job handlers.
pub type ProgressCallback = Box<dyn Fn(i32) + Send + Sync>;

/// Context provided to job handlers.
pub struct JobContext {
    /// The job being processed.
    pub job: Job,
    progress_callback: Option<ProgressCallback>,
}

impl JobContext {
    /// Create a new job context.
    pub fn new(job: Job) -> Self {
        Self {
            job,
            progress_callback: None,
        }
    }

    /// Set the progress callback.
    pub fn with_progress_callback<F>(mut self, callback: F) -> Self
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Report progress (0..=100) to the callback.
    pub fn report_progress(&self, percent: i32) {
        if let Some(ref callback) = self.progress_callback {
            callback(percent);
        }
    }

    /// The job's payload.
    pub fn payload(&self) -> &JobPayload {
        &self.job.payload
    }

    /// Pre-created session id, when the enqueuer reserved one.
    pub fn session_id(&self) -> Option<Uuid> {
        self.job.payload.session_id()
    }
}

/// Result of job execution.
#[derive(Debug)]
pub enum JobResult {
    /// Job completed successfully with its result document.
    Success(JsonValue),
    /// Job failed; the queue decides between retry and terminal failure.
    Failed(String),
}

/// Trait for job handlers.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Execute the job.
    async fn execute(&self, ctx: JobContext) -> JobResult;
}

/// Handler driving the research pipeline off the durable queue.
///
/// Jobs carrying a `metadata.sessionId` reuse that session, which makes
/// at-least-once redelivery idempotent at the persistence layer.
pub struct ResearchJobHandler {
    engine: Arc<ResearchEngine>,
}

impl ResearchJobHandler {
    pub fn new(engine: Arc<ResearchEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl JobHandler for ResearchJobHandler {
    async fn execute(&self, ctx: JobContext) -> JobResult {
        let request = ResearchRequest {
            problem_statement: ctx.payload().problem_statement.clone(),
            metadata: ctx.payload().metadata.clone(),
            session_id: ctx.session_id(),
        };

        info!(
            job_id = %ctx.job.id,
            session_id = ?request.session_id,
            "Running research job"
        );
        ctx.report_progress(10);

        match self.engine.run_research(request).await {
            Ok(outcome) => {
                ctx.report_progress(100);
                match serde_json::to_value(&outcome) {
                    Ok(result) => JobResult::Success(result),
                    Err(e) => JobResult::Failed(format!("result serialization failed: {e}")),
                }
            }
            Err(e) => JobResult::Failed(e.to_string()),
        }
    }
}

/// No-op handler for worker tests.
pub struct NoOpHandler;

#[async_trait]
impl JobHandler for NoOpHandler {
    async fn execute(&self, ctx: JobContext) -> JobResult {
        ctx.report_progress(50);
        ctx.report_progress(100);
        JobResult::Success(serde_json::json!({ "ok": true }))
    }
}
