//! Deepening record repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Pool, Postgres, Row};
use tracing::info;
use uuid::Uuid;

use ideaforge_core::{
    new_v7, DeepeningPayload, DeepeningRecord, DeepeningRepository, Error, NewDeepeningRecord,
    ResponseStatus, Result,
};

const DEEPENING_COLUMNS: &str = "id, session_id, idea_id, provider, depth_level, prompt_used, \
     result, prompt_tokens, completion_tokens, latency_ms, status, created_at";

/// PostgreSQL implementation of [`DeepeningRepository`].
#[derive(Clone)]
pub struct PgDeepeningRepository {
    pool: Pool<Postgres>,
}

impl PgDeepeningRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_row(row: sqlx::postgres::PgRow) -> DeepeningRecord {
        let status: String = row.get("status");
        let result: Option<serde_json::Value> = row.get("result");
        DeepeningRecord {
            id: row.get("id"),
            session_id: row.get("session_id"),
            idea_id: row.get("idea_id"),
            provider: row.get("provider"),
            depth_level: row.get("depth_level"),
            prompt_used: row.get("prompt_used"),
            result: result.and_then(|v| serde_json::from_value::<DeepeningPayload>(v).ok()),
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            latency_ms: row.get("latency_ms"),
            status: ResponseStatus::parse(&status).unwrap_or(ResponseStatus::Failed),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl DeepeningRepository for PgDeepeningRepository {
    async fn insert(&self, record: NewDeepeningRecord) -> Result<DeepeningRecord> {
        let id = new_v7();
        let now = Utc::now();
        let result_json = record
            .result
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            "INSERT INTO deepening_sessions
                 (id, session_id, idea_id, provider, depth_level, prompt_used,
                  result, prompt_tokens, completion_tokens, latency_ms, status, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)",
        )
        .bind(id)
        .bind(record.session_id)
        .bind(record.idea_id)
        .bind(&record.provider)
        .bind(record.depth_level)
        .bind(&record.prompt_used)
        .bind(&result_json)
        .bind(record.prompt_tokens)
        .bind(record.completion_tokens)
        .bind(record.latency_ms)
        .bind(record.status.as_str())
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(
            deepening_id = %id,
            session_id = %record.session_id,
            idea_id = %record.idea_id,
            provider = %record.provider,
            depth_level = record.depth_level,
            "Persisted deepening record"
        );

        Ok(DeepeningRecord {
            id,
            session_id: record.session_id,
            idea_id: record.idea_id,
            provider: record.provider,
            depth_level: record.depth_level,
            prompt_used: record.prompt_used,
            result: record.result,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            latency_ms: record.latency_ms,
            status: record.status,
            created_at: now,
        })
    }

    async fn list_for_idea(&self, idea_id: Uuid) -> Result<Vec<DeepeningRecord>> {
        let rows = sqlx::query(&format!(
            "SELECT {DEEPENING_COLUMNS} FROM deepening_sessions
             WHERE idea_id = $1
             ORDER BY created_at DESC"
        ))
        .bind(idea_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_row).collect())
    }
}
