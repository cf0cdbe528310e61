//! Structured logging schema and field name constants for ideaforge.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized field names across
//! every subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events (startup, shutdown), operation completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (ideas, batches) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Correlation ID propagated across request → job → sub-calls.
/// Format: UUIDv7 (time-ordered).
pub const REQUEST_ID: &str = "request_id";

/// Subsystem originating the log event.
/// Values: "api", "db", "inference", "cluster", "pipeline", "jobs"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "fanout", "embedding", "pool", "worker", "openai"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "execute_all", "embed", "save_ideas", "claim_next"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Research session UUID being operated on.
pub const SESSION_ID: &str = "session_id";

/// Idea UUID being operated on.
pub const IDEA_ID: &str = "idea_id";

/// Job UUID being processed.
pub const JOB_ID: &str = "job_id";

/// Provider identifier string.
pub const PROVIDER: &str = "provider";

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of ideas in play at a pipeline stage.
pub const IDEA_COUNT: &str = "idea_count";

/// Number of input texts sent to an embedding model.
pub const INPUT_COUNT: &str = "input_count";

/// Embedding batch ordinal.
pub const BATCH_NUMBER: &str = "batch_number";

/// Attempt ordinal for retried provider calls.
pub const ATTEMPT: &str = "attempt";

// ─── Database fields ───────────────────────────────────────────────────────

/// Number of active connections in the pool.
pub const POOL_SIZE: &str = "pool_size";

/// Number of idle connections in the pool.
pub const POOL_IDLE: &str = "pool_idle";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";

/// Slow operation threshold exceeded.
pub const SLOW: &str = "slow";
