//! Application configuration.
//!
//! A single immutable [`AppConfig`] is built once at startup via
//! [`AppConfig::from_env`] and passed explicitly to components; nothing
//! re-reads the environment at runtime. Startup fails fast when a required
//! key is unset.

use std::time::Duration;

use crate::defaults;
use crate::error::{Error, Result};

// =============================================================================
// SECTIONS
// =============================================================================

/// HTTP server and inbound auth settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Inbound `X-Api-Key` value, compared in constant time.
    pub api_key: String,
    pub rate_limit_requests: u32,
    pub rate_limit_window: Duration,
    pub max_body_bytes: usize,
}

/// Database connection settings.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_max: u32,
    pub idle_timeout: Duration,
}

/// One configured provider adapter.
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Stable provider identifier (e.g. "default", "openai", "mistral").
    pub name: String,
    /// Backend model id.
    pub model: String,
    /// API key; falls back to the gateway key when absent.
    pub api_key: Option<String>,
    /// Base URL; falls back to the gateway base URL when absent.
    pub base_url: Option<String>,
    pub enabled: bool,
    /// Excluded from research fan-out, selectable for deepening only.
    pub deepening_only: bool,
}

/// LLM provider settings.
#[derive(Debug, Clone)]
pub struct ProvidersConfig {
    /// Key for the OpenAI-compatible default gateway.
    pub gateway_api_key: String,
    pub gateway_base_url: String,
    /// Model served by the distinguished default adapter.
    pub default_model: String,
    /// Additional research providers.
    pub research_models: Vec<ProviderSpec>,
    /// Restrict fan-out to the default adapter only.
    pub fast_mode: bool,
    pub timeout: Duration,
    pub max_output_tokens: u32,
}

/// Embedding backend settings.
#[derive(Debug, Clone)]
pub struct EmbeddingConfig {
    pub model: String,
    pub dimensions: usize,
    pub batch_size: usize,
}

/// Similarity pipeline thresholds.
#[derive(Debug, Clone, Copy)]
pub struct ClusteringConfig {
    pub cluster_threshold: f64,
    pub dedup_threshold: f64,
}

/// Durable queue and worker settings.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub concurrency: usize,
    pub max_attempts: i32,
    pub backoff_base: Duration,
}

/// Immutable application configuration, built once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub providers: ProvidersConfig,
    pub embedding: EmbeddingConfig,
    pub clustering: ClusteringConfig,
    pub queue: QueueConfig,
}

// =============================================================================
// ENV LOADING
// =============================================================================

fn required(key: &str) -> Result<String> {
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(Error::Config(format!("required key {key} is unset"))),
    }
}

fn optional(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn parsed_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    optional(key)
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn flag(key: &str) -> bool {
    optional(key)
        .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

/// Parse a `RESEARCH_MODELS` value: comma-separated `name=model` entries.
///
/// Entries with an empty name or model are rejected so a typo fails startup
/// instead of silently shrinking the fan-out.
pub fn parse_research_models(raw: &str) -> Result<Vec<(String, String)>> {
    let mut out = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, model) = entry
            .split_once('=')
            .ok_or_else(|| Error::Config(format!("malformed RESEARCH_MODELS entry '{entry}'")))?;
        let (name, model) = (name.trim(), model.trim());
        if name.is_empty() || model.is_empty() {
            return Err(Error::Config(format!(
                "malformed RESEARCH_MODELS entry '{entry}'"
            )));
        }
        out.push((name.to_string(), model.to_string()));
    }
    Ok(out)
}

/// Parse a comma-separated name list (`DEEPENING_MODELS`).
pub fn parse_name_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl AppConfig {
    /// Build the configuration from the process environment.
    ///
    /// Required keys: `DATABASE_URL`, `API_KEY`, `LLM_GATEWAY_API_KEY`.
    pub fn from_env() -> Result<Self> {
        let gateway_api_key = required("LLM_GATEWAY_API_KEY")?;
        let gateway_base_url = optional("LLM_GATEWAY_BASE_URL")
            .unwrap_or_else(|| "https://api.openai.com/v1".to_string());

        let deepening_only = optional("DEEPENING_MODELS")
            .map(|v| parse_name_list(&v))
            .unwrap_or_default();

        let mut research_models = Vec::new();
        if let Some(raw) = optional("RESEARCH_MODELS") {
            for (name, model) in parse_research_models(&raw)? {
                let upper = name.to_uppercase().replace('-', "_");
                research_models.push(ProviderSpec {
                    api_key: optional(&format!("PROVIDER_{upper}_API_KEY")),
                    base_url: optional(&format!("PROVIDER_{upper}_BASE_URL")),
                    enabled: true,
                    deepening_only: deepening_only.contains(&name),
                    name,
                    model,
                });
            }
        }

        Ok(Self {
            server: ServerConfig {
                port: parsed_or("PORT", defaults::SERVER_PORT),
                api_key: required("API_KEY")?,
                rate_limit_requests: parsed_or(
                    "RATE_LIMIT_MAX_REQUESTS",
                    defaults::RATE_LIMIT_REQUESTS,
                ),
                rate_limit_window: Duration::from_secs(parsed_or(
                    "RATE_LIMIT_WINDOW_SECS",
                    defaults::RATE_LIMIT_WINDOW_SECS,
                )),
                max_body_bytes: parsed_or("MAX_BODY_BYTES", defaults::MAX_BODY_SIZE_BYTES),
            },
            database: DatabaseConfig {
                url: required("DATABASE_URL")?,
                pool_max: parsed_or("DB_POOL_MAX", defaults::DB_POOL_MAX),
                idle_timeout: Duration::from_secs(parsed_or(
                    "DB_IDLE_TIMEOUT_SECS",
                    defaults::DB_IDLE_TIMEOUT_SECS,
                )),
            },
            providers: ProvidersConfig {
                gateway_api_key,
                gateway_base_url,
                default_model: optional("DEFAULT_MODEL")
                    .unwrap_or_else(|| "gpt-4o-mini".to_string()),
                research_models,
                fast_mode: flag("FAST_MODE"),
                timeout: Duration::from_secs(parsed_or(
                    "PROVIDER_TIMEOUT_SECS",
                    defaults::PROVIDER_TIMEOUT_SECS,
                )),
                max_output_tokens: parsed_or(
                    "PROVIDER_MAX_OUTPUT_TOKENS",
                    defaults::PROVIDER_MAX_OUTPUT_TOKENS,
                ),
            },
            embedding: EmbeddingConfig {
                model: optional("EMBEDDING_MODEL")
                    .unwrap_or_else(|| defaults::EMBED_MODEL.to_string()),
                dimensions: parsed_or("EMBEDDING_DIMENSIONS", defaults::EMBED_DIMENSION),
                batch_size: parsed_or("EMBEDDING_BATCH_SIZE", defaults::EMBED_BATCH_SIZE).max(1),
            },
            clustering: ClusteringConfig {
                cluster_threshold: parsed_or("CLUSTER_THRESHOLD", defaults::CLUSTER_THRESHOLD),
                dedup_threshold: parsed_or("DEDUP_THRESHOLD", defaults::DEDUP_THRESHOLD),
            },
            queue: QueueConfig {
                concurrency: parsed_or("QUEUE_CONCURRENCY", defaults::QUEUE_CONCURRENCY).max(1),
                max_attempts: parsed_or("QUEUE_ATTEMPTS", defaults::QUEUE_MAX_ATTEMPTS).max(1),
                backoff_base: Duration::from_millis(parsed_or(
                    "QUEUE_BACKOFF_MS",
                    defaults::QUEUE_BACKOFF_BASE_MS,
                )),
            },
        })
    }
}
