//! Durable job queue implementation.
//!
//! A Postgres-backed, at-least-once work list. Claims use
//! `FOR UPDATE SKIP LOCKED` so at most one worker observes a job as active;
//! retries are scheduled by pushing `run_at` into the future with
//! exponential backoff; liveness is enforced by heartbeats plus a stalled
//! sweep rather than worker-side locks.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{info, warn};
use uuid::Uuid;

use ideaforge_core::{
    defaults, new_v7, Error, Job, JobPayload, JobRepository, JobState, Result,
};

const JOB_COLUMNS: &str = "id, session_id, payload, state, attempt, max_attempts, \
     stalled_count, progress, error_message, result, run_at, created_at, started_at, completed_at";

/// Retry and retention policy for the queue.
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    pub max_attempts: i32,
    pub backoff_base: Duration,
    pub max_stalled_count: i32,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: defaults::QUEUE_MAX_ATTEMPTS,
            backoff_base: Duration::from_millis(defaults::QUEUE_BACKOFF_BASE_MS),
            max_stalled_count: defaults::QUEUE_MAX_STALLED_COUNT,
        }
    }
}

impl JobQueueConfig {
    /// Backoff before retry `attempt` (1-based): `base * 2^(attempt-1)`.
    pub fn backoff_for(&self, attempt: i32) -> Duration {
        let exp = attempt.saturating_sub(1).clamp(0, 16) as u32;
        self.backoff_base * 2u32.pow(exp)
    }
}

/// PostgreSQL implementation of [`JobRepository`].
#[derive(Clone)]
pub struct PgJobRepository {
    pool: Pool<Postgres>,
    config: JobQueueConfig,
}

impl PgJobRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self::with_config(pool, JobQueueConfig::default())
    }

    pub fn with_config(pool: Pool<Postgres>, config: JobQueueConfig) -> Self {
        Self { pool, config }
    }

    fn parse_job_row(row: sqlx::postgres::PgRow) -> Result<Job> {
        let state: String = row.get("state");
        let payload: JsonValue = row.get("payload");
        let payload: JobPayload = serde_json::from_value(payload)
            .map_err(|e| Error::Job(format!("corrupt job payload: {e}")))?;

        Ok(Job {
            id: row.get("id"),
            payload,
            state: JobState::parse(&state).unwrap_or(JobState::Waiting),
            attempt: row.get("attempt"),
            max_attempts: row.get("max_attempts"),
            stalled_count: row.get("stalled_count"),
            progress: row.get("progress"),
            error_message: row.get("error_message"),
            result: row.get("result"),
            run_at: row.get("run_at"),
            created_at: row.get("created_at"),
            started_at: row.get("started_at"),
            completed_at: row.get("completed_at"),
        })
    }
}

#[async_trait]
impl JobRepository for PgJobRepository {
    async fn enqueue(&self, payload: &JobPayload) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO job_queue
                 (id, session_id, payload, state, attempt, max_attempts,
                  stalled_count, progress, run_at, created_at)
             VALUES ($1, $2, $3, $4, 0, $5, 0, 0, $6, $6)",
        )
        .bind(id)
        .bind(payload.session_id())
        .bind(serde_json::to_value(payload)?)
        .bind(JobState::Waiting.as_str())
        .bind(self.config.max_attempts)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(job_id = %id, "Enqueued research job");
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let now = Utc::now();

        // Both fresh (waiting) and sweeper-requeued (stalled) jobs are
        // claimable once due.
        let row = sqlx::query(&format!(
            "UPDATE job_queue
             SET state = $1, started_at = COALESCE(started_at, $2),
                 heartbeat_at = $2, attempt = attempt + 1
             WHERE id = (
                 SELECT id FROM job_queue
                 WHERE state IN ($3, $4) AND run_at <= $2
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {JOB_COLUMNS}"
        ))
        .bind(JobState::Active.as_str())
        .bind(now)
        .bind(JobState::Waiting.as_str())
        .bind(JobState::Stalled.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn heartbeat(&self, job_id: Uuid) -> Result<()> {
        sqlx::query("UPDATE job_queue SET heartbeat_at = $1 WHERE id = $2 AND state = $3")
            .bind(Utc::now())
            .bind(job_id)
            .bind(JobState::Active.as_str())
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, progress: i32) -> Result<()> {
        sqlx::query("UPDATE job_queue SET progress = $1 WHERE id = $2")
            .bind(progress.clamp(0, 100))
            .bind(job_id)
            .execute(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: JsonValue) -> Result<()> {
        sqlx::query(
            "UPDATE job_queue
             SET state = $1, completed_at = $2, result = $3, progress = 100
             WHERE id = $4",
        )
        .bind(JobState::Completed.as_str())
        .bind(Utc::now())
        .bind(&result)
        .bind(job_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(job_id = %job_id, "Job completed");
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let (attempt, max_attempts): (i32, i32) =
            sqlx::query_as("SELECT attempt, max_attempts FROM job_queue WHERE id = $1 FOR UPDATE")
                .bind(job_id)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?;

        if attempt < max_attempts {
            let delay = self.config.backoff_for(attempt);
            let run_at = now + chrono::Duration::from_std(delay).unwrap_or_default();
            sqlx::query(
                "UPDATE job_queue
                 SET state = $1, error_message = $2, run_at = $3, progress = 0
                 WHERE id = $4",
            )
            .bind(JobState::Waiting.as_str())
            .bind(error)
            .bind(run_at)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            warn!(
                job_id = %job_id,
                attempt,
                backoff_ms = delay.as_millis() as u64,
                error,
                "Job attempt failed, retry scheduled"
            );
        } else {
            sqlx::query(
                "UPDATE job_queue
                 SET state = $1, error_message = $2, completed_at = $3
                 WHERE id = $4",
            )
            .bind(JobState::Failed.as_str())
            .bind(error)
            .bind(now)
            .bind(job_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

            warn!(job_id = %job_id, attempt, error, "Job failed terminally");
        }

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    }

    async fn recover_stalled(&self, stall_timeout: Duration) -> Result<u64> {
        let cutoff =
            Utc::now() - chrono::Duration::from_std(stall_timeout).unwrap_or_default();

        // Jobs that already used their stall allowance are failed outright.
        let failed = sqlx::query(
            "UPDATE job_queue
             SET state = $1, error_message = 'job stalled: worker heartbeat lost',
                 completed_at = $2
             WHERE state = $3 AND heartbeat_at < $4 AND stalled_count >= $5",
        )
        .bind(JobState::Failed.as_str())
        .bind(Utc::now())
        .bind(JobState::Active.as_str())
        .bind(cutoff)
        .bind(self.config.max_stalled_count)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        // The rest are marked stalled and immediately reclaimable. The
        // claim-time attempt increment is returned so a stall does not
        // consume a retry.
        let requeued = sqlx::query(
            "UPDATE job_queue
             SET state = $1, stalled_count = stalled_count + 1,
                 attempt = GREATEST(attempt - 1, 0), run_at = $2
             WHERE state = $3 AND heartbeat_at < $4",
        )
        .bind(JobState::Stalled.as_str())
        .bind(Utc::now())
        .bind(JobState::Active.as_str())
        .bind(cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        let touched = failed + requeued;
        if touched > 0 {
            warn!(requeued, failed, "Recovered stalled jobs");
        }
        Ok(touched)
    }

    async fn cleanup(&self) -> Result<u64> {
        let now = Utc::now();
        let completed_cutoff =
            now - chrono::Duration::seconds(defaults::QUEUE_COMPLETED_RETENTION_SECS);
        let failed_cutoff = now - chrono::Duration::seconds(defaults::QUEUE_FAILED_RETENTION_SECS);

        let expired = sqlx::query(
            "DELETE FROM job_queue
             WHERE (state = $1 AND completed_at < $2)
                OR (state = $3 AND completed_at < $4)",
        )
        .bind(JobState::Completed.as_str())
        .bind(completed_cutoff)
        .bind(JobState::Failed.as_str())
        .bind(failed_cutoff)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        // Count-based retention on completed jobs: keep only the newest.
        let over_count = sqlx::query(
            "DELETE FROM job_queue
             WHERE state = $1 AND id NOT IN (
                 SELECT id FROM job_queue
                 WHERE state = $1
                 ORDER BY completed_at DESC NULLS LAST
                 LIMIT $2
             )",
        )
        .bind(JobState::Completed.as_str())
        .bind(defaults::QUEUE_COMPLETED_RETENTION_COUNT)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?
        .rows_affected();

        Ok(expired + over_count)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        let row = sqlx::query(&format!("SELECT {JOB_COLUMNS} FROM job_queue WHERE id = $1"))
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_job_row).transpose()
    }

    async fn waiting_count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM job_queue WHERE state = $1")
            .bind(JobState::Waiting.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }
}
