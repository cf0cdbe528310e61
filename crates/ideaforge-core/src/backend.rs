//! Inference backend traits and wire-level result types.
//!
//! A `ChatBackend` performs exactly one attempt against one LLM endpoint and
//! classifies its failures; retry, backoff, and per-attempt timeouts live in
//! the adapter layer above it. The split keeps provider wire quirks out of
//! the orchestrator and makes every backend mockable.

use async_trait::async_trait;

use crate::error::Result;

// =============================================================================
// COMPLETION TYPES
// =============================================================================

/// Raw text returned by one successful provider attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RawCompletion {
    pub text: String,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    /// Wall-clock latency of the winning attempt.
    pub latency_ms: i64,
}

/// Failure classification for a single provider attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The attempt's own deadline elapsed; the in-flight request was cancelled.
    Timeout,
    /// HTTP 429-equivalent.
    RateLimited,
    /// HTTP 5xx-equivalent.
    ServerError,
    /// HTTP 4xx other than 429; terminal.
    ClientError,
    /// Connection, TLS, or body-read failure.
    Transport,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::RateLimited => write!(f, "rate_limited"),
            Self::ServerError => write!(f, "server_error"),
            Self::ClientError => write!(f, "client_error"),
            Self::Transport => write!(f, "transport"),
        }
    }
}

/// A classified provider attempt failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Whether the retry policy permits another attempt after this failure.
    pub fn retryable(&self) -> bool {
        matches!(
            self.kind,
            FailureKind::Timeout | FailureKind::RateLimited | FailureKind::ServerError
        )
    }
}

impl std::fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

// =============================================================================
// BACKEND TRAITS
// =============================================================================

/// One raw chat-completion attempt against a model endpoint.
#[async_trait]
pub trait ChatBackend: Send + Sync {
    /// Issue a single attempt. The implementation classifies its own
    /// failures but does not retry.
    async fn complete(
        &self,
        system: &str,
        user: &str,
    ) -> std::result::Result<RawCompletion, ProviderFailure>;

    /// Model identifier this backend targets.
    fn model_name(&self) -> &str;
}

/// One embedding tagged with its position within the submitted batch.
///
/// Backends may return items out of order; the batch client restores input
/// order by this index before concatenation.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedEmbedding {
    pub index: usize,
    pub vector: Vec<f32>,
}

/// Batched text vectorisation.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Embed one batch of texts. Exactly one item per input text must be
    /// returned, each tagged with its batch-local index; order is free.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>>;

    /// Expected output dimension.
    fn dimension(&self) -> usize;

    /// Model identifier this backend targets.
    fn model_name(&self) -> &str;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProviderFailure::new(FailureKind::Timeout, "t").retryable());
        assert!(ProviderFailure::new(FailureKind::RateLimited, "r").retryable());
        assert!(ProviderFailure::new(FailureKind::ServerError, "s").retryable());
        assert!(!ProviderFailure::new(FailureKind::ClientError, "c").retryable());
        assert!(!ProviderFailure::new(FailureKind::Transport, "x").retryable());
    }

    #[test]
    fn failure_display_includes_kind_and_message() {
        let failure = ProviderFailure::new(FailureKind::ServerError, "upstream 503");
        assert_eq!(failure.to_string(), "server_error: upstream 503");
    }
}
