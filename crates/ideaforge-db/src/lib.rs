//! # ideaforge-db
//!
//! PostgreSQL persistence layer for the ideaforge research engine.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for sessions, provider responses, ideas,
//!   and deepening records
//! - The durable job queue backing the worker pool
//! - Optional pgvector persistence for idea embeddings

pub mod deepening;
pub mod ideas;
pub mod jobs;
pub mod pool;
pub mod sessions;

// Re-export core types
pub use ideaforge_core::*;

pub use deepening::PgDeepeningRepository;
pub use ideas::PgIdeaRepository;
pub use jobs::{JobQueueConfig, PgJobRepository};
pub use pool::{create_pool, create_pool_with_config, log_pool_metrics, observe_slow, PoolConfig};
pub use sessions::PgSessionRepository;

/// Whether idea embeddings are persisted.
///
/// Without the pgvector extension the `ideas.embedding` column does not
/// exist; the pipeline still clusters in memory, persistence just skips the
/// vector. The mode is decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingStorage {
    /// `ideas.embedding vector(D)` is present and written.
    Pgvector,
    /// No vector column; embeddings live only in memory per pipeline run.
    Disabled,
}

impl std::fmt::Display for EmbeddingStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pgvector => write!(f, "pgvector"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Combined database context with all repositories.
#[derive(Clone)]
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Session and provider-response repository.
    pub sessions: PgSessionRepository,
    /// Idea repository.
    pub ideas: PgIdeaRepository,
    /// Deepening record repository.
    pub deepening: PgDeepeningRepository,
    /// Durable job queue.
    pub jobs: PgJobRepository,
    embedding_storage: EmbeddingStorage,
}

impl Database {
    /// Create a new Database instance from a connection pool, declaring the
    /// embedding persistence mode.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>, embedding_storage: EmbeddingStorage) -> Self {
        Self {
            sessions: PgSessionRepository::new(pool.clone()),
            ideas: PgIdeaRepository::new(pool.clone(), embedding_storage),
            deepening: PgDeepeningRepository::new(pool.clone()),
            jobs: PgJobRepository::new(pool.clone()),
            embedding_storage,
            pool,
        }
    }

    /// Connect with default pool configuration, detecting the embedding
    /// persistence mode from the live schema.
    pub async fn connect(url: &str) -> Result<Self> {
        Self::connect_with_config(url, PoolConfig::default(), JobQueueConfig::default()).await
    }

    /// Connect with custom pool and queue configuration.
    pub async fn connect_with_config(
        url: &str,
        pool_config: PoolConfig,
        queue_config: JobQueueConfig,
    ) -> Result<Self> {
        let pool = create_pool_with_config(url, pool_config).await?;
        let embedding_storage = Self::detect_embedding_storage(&pool).await?;
        tracing::info!(
            subsystem = "db",
            embedding_storage = %embedding_storage,
            "Embedding persistence mode detected"
        );

        let mut db = Self::new(pool, embedding_storage);
        db.jobs = PgJobRepository::with_config(db.pool.clone(), queue_config);
        Ok(db)
    }

    /// Inspect the live schema for the pgvector-backed embedding column.
    pub async fn detect_embedding_storage(
        pool: &sqlx::Pool<sqlx::Postgres>,
    ) -> Result<EmbeddingStorage> {
        let present: bool = sqlx::query_scalar(
            "SELECT EXISTS (
                 SELECT 1 FROM information_schema.columns
                 WHERE table_name = 'ideas' AND column_name = 'embedding'
             )",
        )
        .fetch_one(pool)
        .await
        .map_err(Error::Database)?;

        Ok(if present {
            EmbeddingStorage::Pgvector
        } else {
            EmbeddingStorage::Disabled
        })
    }

    /// The embedding persistence mode declared at startup.
    pub fn embedding_storage(&self) -> EmbeddingStorage {
        self.embedding_storage
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
