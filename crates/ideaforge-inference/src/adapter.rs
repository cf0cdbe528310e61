//! Provider adapter: uniform retrying call into one LLM backend.
//!
//! The backend performs one classified attempt; the adapter owns the retry
//! policy and per-attempt timeout. Timeouts are observed by cancelling the
//! in-flight request (dropping the future aborts the HTTP call), never by
//! letting it finish in the background.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use ideaforge_core::{
    defaults, ChatBackend, Error, FailureKind, ProviderFailure, ProviderSpec, ProvidersConfig,
    RawCompletion,
};

use crate::openai::{OpenAiBackend, OpenAiConfig};

/// Configuration record for one provider adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Stable provider identifier used in persistence and telemetry.
    pub name: String,
    /// Backend model id.
    pub model: String,
    /// Per-attempt timeout.
    pub timeout: Duration,
    /// Maximum output tokens per call.
    pub max_output_tokens: u32,
    /// Sampling temperature.
    pub temperature: f32,
    /// Whether the backend honours the "respond in JSON" hint.
    pub json_mode: bool,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            name: defaults::DEFAULT_PROVIDER.to_string(),
            model: "gpt-4o-mini".to_string(),
            timeout: Duration::from_secs(defaults::PROVIDER_TIMEOUT_SECS),
            max_output_tokens: defaults::PROVIDER_MAX_OUTPUT_TOKENS,
            temperature: defaults::PROVIDER_TEMPERATURE,
            json_mode: true,
        }
    }
}

/// Uniform call surface over one LLM backend with timeout and retry.
pub struct ProviderAdapter {
    config: AdapterConfig,
    backend: Arc<dyn ChatBackend>,
}

impl ProviderAdapter {
    /// Wrap an existing backend (mock backends in tests).
    pub fn new(config: AdapterConfig, backend: Arc<dyn ChatBackend>) -> Self {
        Self { config, backend }
    }

    /// Build an adapter for a configured provider, falling back to the
    /// gateway key and base URL where the provider entry leaves them unset.
    pub fn from_spec(
        spec: &ProviderSpec,
        providers: &ProvidersConfig,
    ) -> ideaforge_core::Result<Self> {
        let backend = OpenAiBackend::new(OpenAiConfig {
            base_url: spec
                .base_url
                .clone()
                .unwrap_or_else(|| providers.gateway_base_url.clone()),
            api_key: Some(
                spec.api_key
                    .clone()
                    .unwrap_or_else(|| providers.gateway_api_key.clone()),
            ),
            gen_model: spec.model.clone(),
            json_mode: true,
            temperature: defaults::PROVIDER_TEMPERATURE,
            max_tokens: providers.max_output_tokens,
            ..Default::default()
        })?;

        Ok(Self::new(
            AdapterConfig {
                name: spec.name.clone(),
                model: spec.model.clone(),
                timeout: providers.timeout,
                max_output_tokens: providers.max_output_tokens,
                temperature: defaults::PROVIDER_TEMPERATURE,
                json_mode: true,
            },
            Arc::new(backend),
        ))
    }

    /// Provider identifier.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Backend model id.
    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// Call the backend with the adapter's retry policy.
    ///
    /// Up to three attempts. `RateLimited`, `ServerError`, and `Timeout`
    /// failures retry with exponential backoff (attempt *k*, 0-based, sleeps
    /// `2^(k+1) × 1000 ms` before the next try); `ClientError` and
    /// `Transport` are terminal.
    pub async fn call(
        &self,
        system: &str,
        user: &str,
    ) -> std::result::Result<RawCompletion, ProviderFailure> {
        let mut last_failure = None;

        for attempt in 0..defaults::PROVIDER_MAX_ATTEMPTS {
            if attempt > 0 {
                let backoff =
                    Duration::from_millis(defaults::PROVIDER_RETRY_BASE_MS << attempt);
                debug!(
                    provider = %self.config.name,
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "Backing off before retry"
                );
                sleep(backoff).await;
            }

            let result = timeout(self.config.timeout, self.backend.complete(system, user)).await;

            let failure = match result {
                Ok(Ok(completion)) => return Ok(completion),
                Ok(Err(failure)) => failure,
                // Deadline elapsed: the dropped future cancels the request.
                Err(_) => ProviderFailure::new(
                    FailureKind::Timeout,
                    format!("attempt exceeded {} s", self.config.timeout.as_secs()),
                ),
            };

            warn!(
                provider = %self.config.name,
                model = %self.config.model,
                attempt,
                error = %failure,
                retryable = failure.retryable(),
                "Provider attempt failed"
            );

            if !failure.retryable() {
                return Err(failure);
            }
            last_failure = Some(failure);
        }

        Err(last_failure.expect("at least one attempt was made"))
    }

    /// Translate a terminal failure into the workspace error taxonomy.
    pub fn failure_to_error(&self, failure: &ProviderFailure) -> Error {
        match failure.kind {
            FailureKind::Timeout => Error::ProviderTimeout {
                provider: self.config.name.clone(),
                message: failure.message.clone(),
            },
            _ => Error::Provider {
                provider: self.config.name.clone(),
                message: failure.message.clone(),
            },
        }
    }
}
