//! Session repository implementation.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value as JsonValue;
use sqlx::{Pool, Postgres, Row};
use tracing::{error, info};
use uuid::Uuid;

use ideaforge_core::{
    defaults, new_v7, Error, ListSessionsRequest, ListSessionsResponse, ProviderResponse,
    RawCompletion, ResponseStatus, Result, Session, SessionRepository, SessionStatus,
};

use crate::pool::observe_slow;

const SESSION_COLUMNS: &str =
    "id, problem_statement, status, metadata, created_at, updated_at, deleted_at";

const RESPONSE_COLUMNS: &str = "id, session_id, provider, model, status, raw_text, \
     error_message, prompt_tokens, completion_tokens, latency_ms, created_at";

/// PostgreSQL implementation of [`SessionRepository`].
#[derive(Clone)]
pub struct PgSessionRepository {
    pool: Pool<Postgres>,
}

impl PgSessionRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn parse_session_row(row: sqlx::postgres::PgRow) -> Session {
        let status: String = row.get("status");
        Session {
            id: row.get("id"),
            problem_statement: row.get("problem_statement"),
            status: SessionStatus::parse(&status).unwrap_or(SessionStatus::Pending),
            metadata: row.get("metadata"),
            created_at: row.get("created_at"),
            updated_at: row.get("updated_at"),
            deleted_at: row.get("deleted_at"),
        }
    }

    fn parse_response_row(row: sqlx::postgres::PgRow) -> ProviderResponse {
        let status: String = row.get("status");
        ProviderResponse {
            id: row.get("id"),
            session_id: row.get("session_id"),
            provider: row.get("provider"),
            model: row.get("model"),
            status: ResponseStatus::parse(&status).unwrap_or(ResponseStatus::Failed),
            raw_text: row.get("raw_text"),
            error_message: row.get("error_message"),
            prompt_tokens: row.get("prompt_tokens"),
            completion_tokens: row.get("completion_tokens"),
            latency_ms: row.get("latency_ms"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, problem_statement: &str, metadata: JsonValue) -> Result<Session> {
        let start = Instant::now();
        let id = new_v7();
        let now = Utc::now();

        sqlx::query(
            "INSERT INTO research_sessions (id, problem_statement, status, metadata, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)",
        )
        .bind(id)
        .bind(problem_statement)
        .bind(SessionStatus::Pending.as_str())
        .bind(&metadata)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        info!(session_id = %id, "Created research session");
        observe_slow("create_session", start);

        Ok(Session {
            id,
            problem_statement: problem_statement.to_string(),
            status: SessionStatus::Pending,
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    async fn get(&self, id: Uuid) -> Result<Session> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM research_sessions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.map(Self::parse_session_row)
            .ok_or(Error::SessionNotFound(id))
    }

    async fn list(&self, req: ListSessionsRequest) -> Result<ListSessionsResponse> {
        let start = Instant::now();
        let limit = req
            .limit
            .unwrap_or(defaults::PAGE_LIMIT)
            .clamp(1, defaults::PAGE_LIMIT_MAX);
        let offset = req.offset.unwrap_or(defaults::PAGE_OFFSET).max(0);

        let (total, rows) = match req.status {
            Some(status) => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM research_sessions
                     WHERE deleted_at IS NULL AND status = $1",
                )
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

                let rows = sqlx::query(&format!(
                    "SELECT {SESSION_COLUMNS} FROM research_sessions
                     WHERE deleted_at IS NULL AND status = $1
                     ORDER BY created_at DESC
                     LIMIT $2 OFFSET $3"
                ))
                .bind(status.as_str())
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
                (total, rows)
            }
            None => {
                let total: i64 = sqlx::query_scalar(
                    "SELECT COUNT(*) FROM research_sessions WHERE deleted_at IS NULL",
                )
                .fetch_one(&self.pool)
                .await
                .map_err(Error::Database)?;

                let rows = sqlx::query(&format!(
                    "SELECT {SESSION_COLUMNS} FROM research_sessions
                     WHERE deleted_at IS NULL
                     ORDER BY created_at DESC
                     LIMIT $1 OFFSET $2"
                ))
                .bind(limit)
                .bind(offset)
                .fetch_all(&self.pool)
                .await
                .map_err(Error::Database)?;
                (total, rows)
            }
        };

        observe_slow("list_sessions", start);
        Ok(ListSessionsResponse {
            sessions: rows.into_iter().map(Self::parse_session_row).collect(),
            total,
            limit,
            offset,
        })
    }

    async fn update_status(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM research_sessions WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(Error::Database)?;

        let current = current
            .as_deref()
            .and_then(SessionStatus::parse)
            .ok_or(Error::SessionNotFound(id))?;

        if current == status {
            // Idempotent: nothing to write.
            tx.commit().await.map_err(Error::Database)?;
            return Ok(());
        }
        if !current.can_transition_to(status) {
            return Err(Error::InvalidInput(format!(
                "illegal session transition {current} -> {status}"
            )));
        }

        sqlx::query("UPDATE research_sessions SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        info!(session_id = %id, status = %status, "Session status updated");
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let result = sqlx::query(
            "UPDATE research_sessions SET deleted_at = $1, updated_at = $1
             WHERE id = $2 AND deleted_at IS NULL",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        if result.rows_affected() == 0 {
            return Err(Error::SessionNotFound(id));
        }
        info!(session_id = %id, "Session soft-deleted");
        Ok(())
    }

    async fn save_provider_success(
        &self,
        session_id: Uuid,
        provider: &str,
        model: Option<&str>,
        completion: &RawCompletion,
    ) -> Result<Uuid> {
        let id = new_v7();
        sqlx::query(
            "INSERT INTO llm_responses
                 (id, session_id, provider, model, status, raw_text,
                  prompt_tokens, completion_tokens, latency_ms, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(id)
        .bind(session_id)
        .bind(provider)
        .bind(model)
        .bind(ResponseStatus::Success.as_str())
        .bind(&completion.text)
        .bind(completion.prompt_tokens)
        .bind(completion.completion_tokens)
        .bind(completion.latency_ms)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(id)
    }

    async fn save_provider_failure(
        &self,
        session_id: Uuid,
        provider: &str,
        model: Option<&str>,
        message: &str,
        raw_text: Option<&str>,
    ) {
        // Failure rows are telemetry; a secondary DB error here must not
        // mask the provider failure being recorded.
        let result = sqlx::query(
            "INSERT INTO llm_responses
                 (id, session_id, provider, model, status, error_message, raw_text, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(new_v7())
        .bind(session_id)
        .bind(provider)
        .bind(model)
        .bind(ResponseStatus::Failed.as_str())
        .bind(message)
        .bind(raw_text)
        .bind(Utc::now())
        .execute(&self.pool)
        .await;

        if let Err(e) = result {
            error!(
                session_id = %session_id,
                provider,
                error = %e,
                "Failed to record provider failure"
            );
        }
    }

    async fn latest_response(&self, session_id: Uuid) -> Result<Option<ProviderResponse>> {
        let row = sqlx::query(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM llm_responses
             WHERE session_id = $1
             ORDER BY created_at DESC
             LIMIT 1"
        ))
        .bind(session_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(row.map(Self::parse_response_row))
    }

    async fn list_responses(&self, session_id: Uuid) -> Result<Vec<ProviderResponse>> {
        let rows = sqlx::query(&format!(
            "SELECT {RESPONSE_COLUMNS} FROM llm_responses
             WHERE session_id = $1
             ORDER BY created_at ASC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_response_row).collect())
    }
}
