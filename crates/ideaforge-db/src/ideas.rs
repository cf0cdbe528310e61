//! Idea repository implementation.
//!
//! Ideas are inserted once per provider response in a single transaction,
//! preserving input order, with duplicate references patched in a second
//! pass once stored ids are known. An upsert on `(response_id, title)`
//! keeps at-least-once job retries from producing duplicate rows.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use pgvector::Vector;
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, info};
use uuid::Uuid;

use ideaforge_core::{
    new_v7, DuplicateUpdate, Error, Idea, IdeaCategory, IdeaRepository, NewIdeaRow, Result,
};

use crate::pool::observe_slow;
use crate::EmbeddingStorage;

const IDEA_COLUMNS: &str = "id, session_id, response_id, provider, title, description, \
     rationale, category, confidence_score, novelty_score, tags, cluster_id, \
     is_duplicate, duplicate_of, similarity_to_duplicate, created_at";

/// PostgreSQL implementation of [`IdeaRepository`].
#[derive(Clone)]
pub struct PgIdeaRepository {
    pool: Pool<Postgres>,
    storage: EmbeddingStorage,
}

impl PgIdeaRepository {
    pub fn new(pool: Pool<Postgres>, storage: EmbeddingStorage) -> Self {
        Self { pool, storage }
    }

    /// The embedding persistence mode this repository was built with.
    pub fn embedding_storage(&self) -> EmbeddingStorage {
        self.storage
    }

    fn parse_idea_row(row: sqlx::postgres::PgRow) -> Idea {
        let category: String = row.get("category");
        Idea {
            id: row.get("id"),
            session_id: row.get("session_id"),
            response_id: row.get("response_id"),
            provider: row.get("provider"),
            title: row.get("title"),
            description: row.get("description"),
            rationale: row.get("rationale"),
            category: IdeaCategory::parse(&category).unwrap_or(IdeaCategory::Other),
            confidence_score: row.get("confidence_score"),
            novelty_score: row.get("novelty_score"),
            tags: row.get("tags"),
            cluster_id: row.get("cluster_id"),
            is_duplicate: row.get("is_duplicate"),
            duplicate_of: row.get("duplicate_of"),
            similarity_to_duplicate: row.get("similarity_to_duplicate"),
            created_at: row.get("created_at"),
        }
    }
}

#[async_trait]
impl IdeaRepository for PgIdeaRepository {
    async fn save_ideas(
        &self,
        session_id: Uuid,
        response_id: Uuid,
        provider: &str,
        rows: &[NewIdeaRow],
    ) -> Result<Vec<Uuid>> {
        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;
        let now = Utc::now();
        let mut ids = Vec::with_capacity(rows.len());

        for row in rows {
            // Upsert: a retried job re-inserting the same (response, title)
            // refreshes clustering attributes instead of duplicating rows.
            let id: Uuid = if self.storage == EmbeddingStorage::Pgvector {
                sqlx::query_scalar(
                    "INSERT INTO ideas
                         (id, session_id, response_id, provider, title, description,
                          rationale, category, confidence_score, novelty_score, tags,
                          cluster_id, is_duplicate, similarity_to_duplicate, embedding,
                          created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)
                     ON CONFLICT (response_id, title) DO UPDATE SET
                         cluster_id = EXCLUDED.cluster_id,
                         is_duplicate = EXCLUDED.is_duplicate,
                         similarity_to_duplicate = EXCLUDED.similarity_to_duplicate,
                         embedding = EXCLUDED.embedding
                     RETURNING id",
                )
                .bind(new_v7())
                .bind(session_id)
                .bind(response_id)
                .bind(provider)
                .bind(&row.draft.title)
                .bind(&row.draft.description)
                .bind(&row.draft.rationale)
                .bind(row.draft.category.as_str())
                .bind(row.draft.confidence_score)
                .bind(row.draft.novelty_score)
                .bind(&row.draft.tags)
                .bind(row.cluster_id)
                .bind(row.is_duplicate)
                .bind(row.similarity_to_duplicate)
                .bind(row.embedding.clone().map(Vector::from))
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?
            } else {
                sqlx::query_scalar(
                    "INSERT INTO ideas
                         (id, session_id, response_id, provider, title, description,
                          rationale, category, confidence_score, novelty_score, tags,
                          cluster_id, is_duplicate, similarity_to_duplicate, created_at)
                     VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
                     ON CONFLICT (response_id, title) DO UPDATE SET
                         cluster_id = EXCLUDED.cluster_id,
                         is_duplicate = EXCLUDED.is_duplicate,
                         similarity_to_duplicate = EXCLUDED.similarity_to_duplicate
                     RETURNING id",
                )
                .bind(new_v7())
                .bind(session_id)
                .bind(response_id)
                .bind(provider)
                .bind(&row.draft.title)
                .bind(&row.draft.description)
                .bind(&row.draft.rationale)
                .bind(row.draft.category.as_str())
                .bind(row.draft.confidence_score)
                .bind(row.draft.novelty_score)
                .bind(&row.draft.tags)
                .bind(row.cluster_id)
                .bind(row.is_duplicate)
                .bind(row.similarity_to_duplicate)
                .bind(now)
                .fetch_one(&mut *tx)
                .await
                .map_err(Error::Database)?
            };
            ids.push(id);
        }

        tx.commit().await.map_err(Error::Database)?;

        info!(
            session_id = %session_id,
            response_id = %response_id,
            provider,
            idea_count = ids.len(),
            "Persisted ideas"
        );
        observe_slow("save_ideas", start);
        Ok(ids)
    }

    async fn update_duplicate_references(&self, updates: &[DuplicateUpdate]) -> Result<()> {
        if updates.is_empty() {
            return Ok(());
        }

        let start = Instant::now();
        let mut tx = self.pool.begin().await.map_err(Error::Database)?;

        for update in updates {
            sqlx::query(
                "UPDATE ideas SET duplicate_of = $1, similarity_to_duplicate = $2 WHERE id = $3",
            )
            .bind(update.duplicate_of)
            .bind(update.similarity)
            .bind(update.idea_id)
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }

        tx.commit().await.map_err(Error::Database)?;
        debug!(update_count = updates.len(), "Patched duplicate references");
        observe_slow("update_duplicate_references", start);
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Idea> {
        let row = sqlx::query(&format!("SELECT {IDEA_COLUMNS} FROM ideas WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;

        row.map(Self::parse_idea_row).ok_or(Error::IdeaNotFound(id))
    }

    async fn list_for_session(&self, session_id: Uuid, unique_only: bool) -> Result<Vec<Idea>> {
        let filter = if unique_only {
            "AND is_duplicate = false"
        } else {
            ""
        };
        let rows = sqlx::query(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas
             WHERE session_id = $1 {filter}
             ORDER BY id"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_idea_row).collect())
    }

    async fn unique_ranked(&self, session_id: Uuid) -> Result<Vec<Idea>> {
        let rows = sqlx::query(&format!(
            "SELECT {IDEA_COLUMNS} FROM ideas
             WHERE session_id = $1 AND is_duplicate = false
             ORDER BY confidence_score DESC, novelty_score DESC"
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(rows.into_iter().map(Self::parse_idea_row).collect())
    }
}
