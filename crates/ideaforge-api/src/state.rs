//! Shared application state.

use std::sync::Arc;
use std::time::Instant;

use ideaforge_core::JobRepository;
use ideaforge_db::Database;
use ideaforge_pipeline::{DeepeningEngine, ResearchEngine};

use crate::auth::GlobalRateLimiter;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub research: Arc<ResearchEngine>,
    pub deepening: Arc<DeepeningEngine>,
    pub jobs: Arc<dyn JobRepository>,
    /// Inbound API key, compared in constant time.
    pub api_key: Arc<str>,
    /// Global rate limiter (None disables rate limiting).
    pub rate_limiter: Option<Arc<GlobalRateLimiter>>,
    /// Process start, for the health endpoint's uptime.
    pub started_at: Instant,
}
