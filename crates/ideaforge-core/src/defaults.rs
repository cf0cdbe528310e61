//! Centralized default constants for the ideaforge system.
//!
//! **This module is the single source of truth** for shared default values.
//! All crates reference these constants instead of defining their own magic
//! numbers.

// =============================================================================
// PROBLEM STATEMENT
// =============================================================================

/// Minimum problem statement length in characters (after trimming).
pub const PROBLEM_MIN_CHARS: usize = 20;

/// Maximum problem statement length in characters.
pub const PROBLEM_MAX_CHARS: usize = 5000;

// =============================================================================
// PROVIDERS
// =============================================================================

/// Per-call provider timeout in seconds.
pub const PROVIDER_TIMEOUT_SECS: u64 = 60;

/// Total attempts per provider call (1 initial + 2 retries).
pub const PROVIDER_MAX_ATTEMPTS: u32 = 3;

/// Base of the exponential retry backoff in milliseconds; attempt *k*
/// (0-based) waits `2^(k+1) * PROVIDER_RETRY_BASE_MS` before the next try.
pub const PROVIDER_RETRY_BASE_MS: u64 = 1000;

/// Sampling temperature for research and deepening generation.
pub const PROVIDER_TEMPERATURE: f32 = 0.7;

/// Maximum output tokens per provider call.
pub const PROVIDER_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Number of ideas the research prompt asks each provider for.
pub const IDEAS_PER_PROVIDER: usize = 5;

/// Name of the distinguished default adapter.
pub const DEFAULT_PROVIDER: &str = "default";

// =============================================================================
// EMBEDDING
// =============================================================================

/// Default embedding model name.
pub const EMBED_MODEL: &str = "text-embedding-3-small";

/// Default embedding vector dimension.
pub const EMBED_DIMENSION: usize = 1536;

/// Maximum texts per embedding batch.
pub const EMBED_BATCH_SIZE: usize = 100;

// =============================================================================
// CLUSTERING
// =============================================================================

/// Cosine similarity at or above which two ideas share a cluster.
pub const CLUSTER_THRESHOLD: f64 = 0.80;

/// Cosine similarity at or above which the lower-confidence idea within a
/// cluster is flagged as a duplicate. Strictly tighter than the cluster
/// threshold so a cluster may hold multiple distinct ideas on one theme.
pub const DEDUP_THRESHOLD: f64 = 0.85;

/// Fractional digits kept for persisted similarity values.
pub const SIMILARITY_DECIMALS: u32 = 4;

// =============================================================================
// DATABASE
// =============================================================================

/// Maximum connections in the pool.
pub const DB_POOL_MAX: u32 = 10;

/// Idle connection timeout in seconds.
pub const DB_IDLE_TIMEOUT_SECS: u64 = 10;

/// Connection acquire timeout in seconds. Kept short so pool saturation
/// surfaces as an error instead of silent queueing.
pub const DB_ACQUIRE_TIMEOUT_SECS: u64 = 5;

/// Slow-query warning threshold in milliseconds (observational only).
pub const SLOW_QUERY_MS: u128 = 1000;

// =============================================================================
// JOB QUEUE
// =============================================================================

/// Maximum attempts per job (1 initial + 1 retry).
pub const QUEUE_MAX_ATTEMPTS: i32 = 2;

/// Base of the job retry backoff in milliseconds; attempt *k* (1-based)
/// reschedules `QUEUE_BACKOFF_BASE_MS * 2^(k-1)` into the future.
pub const QUEUE_BACKOFF_BASE_MS: u64 = 5000;

/// Worker concurrency.
pub const QUEUE_CONCURRENCY: usize = 3;

/// Heartbeat interval for active jobs in seconds.
pub const QUEUE_HEARTBEAT_SECS: u64 = 10;

/// An active job whose heartbeat is older than this is considered stalled.
pub const QUEUE_STALL_TIMEOUT_SECS: u64 = 30;

/// How many times a job may stall before it is failed outright.
pub const QUEUE_MAX_STALLED_COUNT: i32 = 1;

/// Completed jobs are retained this long.
pub const QUEUE_COMPLETED_RETENTION_SECS: i64 = 24 * 60 * 60;

/// At most this many completed jobs are retained.
pub const QUEUE_COMPLETED_RETENTION_COUNT: i64 = 1000;

/// Failed jobs are retained this long.
pub const QUEUE_FAILED_RETENTION_SECS: i64 = 7 * 24 * 60 * 60;

/// Poll interval for the worker claim loop when the queue is empty.
pub const QUEUE_POLL_INTERVAL_MS: u64 = 500;

// =============================================================================
// PAGINATION
// =============================================================================

/// Default page size for session listings.
pub const PAGE_LIMIT: i64 = 20;

/// Maximum page size for session listings.
pub const PAGE_LIMIT_MAX: i64 = 100;

/// Default page offset.
pub const PAGE_OFFSET: i64 = 0;

// =============================================================================
// SERVER
// =============================================================================

/// Default HTTP server port.
pub const SERVER_PORT: u16 = 3000;

/// Maximum request body size in bytes.
pub const MAX_BODY_SIZE_BYTES: usize = 50 * 1024;

/// Default rate limit: max requests per window.
pub const RATE_LIMIT_REQUESTS: u32 = 100;

/// Default rate limit: window in seconds.
pub const RATE_LIMIT_WINDOW_SECS: u64 = 60;

/// Graceful shutdown drain budget in seconds.
pub const SHUTDOWN_GRACE_SECS: u64 = 10;
