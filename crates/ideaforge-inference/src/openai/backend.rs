//! OpenAI-compatible inference backend implementation.
//!
//! This is the distinguished "default" adapter backend: a JSON-mode chat
//! endpoint speaking the OpenAI wire protocol. Other providers are reached
//! through the same backend pointed at their own base URL and model.

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Instant;
use tracing::{debug, info};

use ideaforge_core::{
    ChatBackend, EmbeddingBackend, Error, FailureKind, IndexedEmbedding, ProviderFailure,
    RawCompletion, Result,
};

use super::types::*;

/// Default OpenAI API endpoint.
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";

/// Configuration for an OpenAI-compatible backend.
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// Base URL for the API endpoint.
    pub base_url: String,
    /// API key for authentication (optional for local endpoints).
    pub api_key: Option<String>,
    /// Model to use for generation.
    pub gen_model: String,
    /// Model to use for embeddings.
    pub embed_model: String,
    /// Expected embedding dimension.
    pub embed_dimension: usize,
    /// Sampling temperature for generation.
    pub temperature: f32,
    /// Maximum output tokens per generation call.
    pub max_tokens: u32,
    /// Whether the backend honours the "respond in JSON" hint.
    pub json_mode: bool,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_URL.to_string(),
            api_key: None,
            gen_model: "gpt-4o-mini".to_string(),
            embed_model: ideaforge_core::defaults::EMBED_MODEL.to_string(),
            embed_dimension: ideaforge_core::defaults::EMBED_DIMENSION,
            temperature: ideaforge_core::defaults::PROVIDER_TEMPERATURE,
            max_tokens: ideaforge_core::defaults::PROVIDER_MAX_OUTPUT_TOKENS,
            json_mode: true,
        }
    }
}

/// OpenAI-compatible inference backend.
///
/// Performs exactly one attempt per call; retries, backoff, and per-attempt
/// timeouts belong to the adapter wrapping it. The HTTP client carries no
/// total-request timeout for that reason.
pub struct OpenAiBackend {
    client: Client,
    config: OpenAiConfig,
}

impl OpenAiBackend {
    /// Create a new backend with the given configuration.
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        let client = Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            url = %config.base_url,
            gen = %config.gen_model,
            embed = %config.embed_model,
            json_mode = config.json_mode,
            "Initializing OpenAI-compatible backend"
        );

        Ok(Self { client, config })
    }

    /// Get the current configuration.
    pub fn config(&self) -> &OpenAiConfig {
        &self.config
    }

    /// Build a POST request with authentication if configured.
    fn build_request(&self, endpoint: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.config.base_url.trim_end_matches('/'), endpoint);
        let mut req = self.client.post(&url);

        if let Some(ref api_key) = self.config.api_key {
            req = req.header("Authorization", format!("Bearer {}", api_key));
        }

        req.header("Content-Type", "application/json")
    }

    /// Classify an HTTP error status into a provider failure kind.
    fn classify_status(status: StatusCode) -> FailureKind {
        if status == StatusCode::REQUEST_TIMEOUT {
            FailureKind::Timeout
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            FailureKind::RateLimited
        } else if status.is_server_error() {
            FailureKind::ServerError
        } else {
            FailureKind::ClientError
        }
    }

    /// Classify a transport-level reqwest error.
    fn classify_transport(e: &reqwest::Error) -> FailureKind {
        if e.is_timeout() {
            FailureKind::Timeout
        } else {
            FailureKind::Transport
        }
    }

    /// Decode the error envelope from a non-success response, falling back
    /// to the status line when the body is not the expected shape.
    async fn error_message(response: reqwest::Response) -> String {
        let status = response.status();
        match response.json::<ApiErrorResponse>().await {
            Ok(body) => format!("{}: {}", status, body.error.message),
            Err(_) => format!("{}: unrecognized error body", status),
        }
    }
}

#[async_trait]
impl ChatBackend for OpenAiBackend {
    async fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> std::result::Result<RawCompletion, ProviderFailure> {
        debug!(
            model = %self.config.gen_model,
            prompt_len = user.len(),
            "Dispatching chat completion"
        );

        let mut messages = Vec::new();
        if !system.is_empty() {
            messages.push(ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            });
        }
        messages.push(ChatMessage {
            role: "user".to_string(),
            content: user.to_string(),
        });

        let request = ChatCompletionRequest {
            model: self.config.gen_model.clone(),
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            response_format: self
                .config
                .json_mode
                .then(ResponseFormat::json_object),
        };

        let start = Instant::now();
        let response = self
            .build_request("/chat/completions")
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                ProviderFailure::new(Self::classify_transport(&e), e.to_string())
            })?;

        if !response.status().is_success() {
            let kind = Self::classify_status(response.status());
            return Err(ProviderFailure::new(
                kind,
                Self::error_message(response).await,
            ));
        }

        let body: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| ProviderFailure::new(FailureKind::Transport, e.to_string()))?;

        let text = body
            .choices
            .first()
            .map(|c| c.message.content.clone())
            .unwrap_or_default();

        let latency_ms = start.elapsed().as_millis() as i64;
        debug!(
            response_len = text.len(),
            latency_ms, "Chat completion finished"
        );

        Ok(RawCompletion {
            text,
            prompt_tokens: body.usage.as_ref().map(|u| u.prompt_tokens),
            completion_tokens: body.usage.as_ref().map(|u| u.completion_tokens),
            latency_ms,
        })
    }

    fn model_name(&self) -> &str {
        &self.config.gen_model
    }
}

#[async_trait]
impl EmbeddingBackend for OpenAiBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        debug!(
            input_count = texts.len(),
            model = %self.config.embed_model,
            "Embedding batch"
        );

        let request = EmbeddingRequest {
            model: self.config.embed_model.clone(),
            input: texts.to_vec(),
            encoding_format: Some("float".to_string()),
        };

        let response = self
            .build_request("/embeddings")
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Request(e.to_string()))?;

        if !response.status().is_success() {
            return Err(Error::Request(Self::error_message(response).await));
        }

        let result: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| Error::Request(format!("Failed to parse response: {}", e)))?;

        Ok(result
            .data
            .into_iter()
            .map(|d| IndexedEmbedding {
                index: d.index,
                vector: d.embedding,
            })
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.embed_dimension
    }

    fn model_name(&self) -> &str {
        &self.config.embed_model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = OpenAiConfig::default();
        assert_eq!(config.base_url, DEFAULT_OPENAI_URL);
        assert_eq!(config.embed_dimension, 1536);
        assert!((config.temperature - 0.7).abs() < f32::EPSILON);
        assert!(config.json_mode);
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_backend_creation() {
        let backend = OpenAiBackend::new(OpenAiConfig::default()).unwrap();
        assert_eq!(backend.config().base_url, DEFAULT_OPENAI_URL);
        assert_eq!(EmbeddingBackend::dimension(&backend), 1536);
    }

    #[test]
    fn test_model_name_accessors() {
        let config = OpenAiConfig {
            gen_model: "test-gen".to_string(),
            embed_model: "test-embed".to_string(),
            ..Default::default()
        };
        let backend = OpenAiBackend::new(config).unwrap();
        assert_eq!(ChatBackend::model_name(&backend), "test-gen");
        assert_eq!(EmbeddingBackend::model_name(&backend), "test-embed");
    }

    #[test]
    fn test_status_classification() {
        assert_eq!(
            OpenAiBackend::classify_status(StatusCode::REQUEST_TIMEOUT),
            FailureKind::Timeout
        );
        assert_eq!(
            OpenAiBackend::classify_status(StatusCode::TOO_MANY_REQUESTS),
            FailureKind::RateLimited
        );
        assert_eq!(
            OpenAiBackend::classify_status(StatusCode::INTERNAL_SERVER_ERROR),
            FailureKind::ServerError
        );
        assert_eq!(
            OpenAiBackend::classify_status(StatusCode::SERVICE_UNAVAILABLE),
            FailureKind::ServerError
        );
        assert_eq!(
            OpenAiBackend::classify_status(StatusCode::BAD_REQUEST),
            FailureKind::ClientError
        );
        assert_eq!(
            OpenAiBackend::classify_status(StatusCode::UNAUTHORIZED),
            FailureKind::ClientError
        );
    }
}
