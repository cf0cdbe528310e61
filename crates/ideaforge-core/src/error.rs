//! Error types for ideaforge.

use thiserror::Error;
use uuid::Uuid;

/// Result type alias using ideaforge's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for ideaforge operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Research session not found
    #[error("Session not found: {0}")]
    SessionNotFound(Uuid),

    /// Idea not found
    #[error("Idea not found: {0}")]
    IdeaNotFound(Uuid),

    /// Idea exists but belongs to a different session
    #[error("Idea {idea_id} does not belong to session {session_id}")]
    IdeaSessionMismatch { idea_id: Uuid, session_id: Uuid },

    /// Provider call exceeded its per-attempt timeout on every attempt
    #[error("Provider '{provider}' timed out: {message}")]
    ProviderTimeout { provider: String, message: String },

    /// Provider call failed terminally
    #[error("Provider '{provider}' failed: {message}")]
    Provider { provider: String, message: String },

    /// Model output did not satisfy the task schema; raw text kept for auditing
    #[error("Failed to parse model output: {message}")]
    Parse { message: String, raw_text: String },

    /// Every configured provider failed during fan-out
    #[error("All providers failed")]
    AllProvidersFailed,

    /// Embedding generation failed for one batch
    #[error("Embedding batch {batch_number}/{total_batches} ({texts_in_batch} texts) failed: {message}")]
    Embedding {
        batch_number: usize,
        total_batches: usize,
        texts_in_batch: usize,
        message: String,
    },

    /// Job queue error
    #[error("Job error: {0}")]
    Job(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Inbound request rate limit exceeded
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_session_not_found() {
        let id = Uuid::nil();
        let err = Error::SessionNotFound(id);
        assert_eq!(err.to_string(), format!("Session not found: {}", id));
    }

    #[test]
    fn test_error_display_idea_session_mismatch() {
        let idea_id = Uuid::new_v4();
        let session_id = Uuid::new_v4();
        let err = Error::IdeaSessionMismatch {
            idea_id,
            session_id,
        };
        assert!(err.to_string().contains(&idea_id.to_string()));
        assert!(err.to_string().contains(&session_id.to_string()));
    }

    #[test]
    fn test_error_display_provider_timeout() {
        let err = Error::ProviderTimeout {
            provider: "openai".to_string(),
            message: "deadline exceeded".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Provider 'openai' timed out: deadline exceeded"
        );
    }

    #[test]
    fn test_error_display_embedding_carries_batch_context() {
        let err = Error::Embedding {
            batch_number: 2,
            total_batches: 3,
            texts_in_batch: 100,
            message: "upstream 503".to_string(),
        };
        let text = err.to_string();
        assert!(text.contains("2/3"));
        assert!(text.contains("100 texts"));
        assert!(text.contains("upstream 503"));
    }

    #[test]
    fn test_error_display_all_providers_failed() {
        assert_eq!(Error::AllProvidersFailed.to_string(), "All providers failed");
    }

    #[test]
    fn test_parse_error_preserves_raw_text() {
        let err = Error::Parse {
            message: "missing field `ideas`".to_string(),
            raw_text: "{\"notideas\":[]}".to_string(),
        };
        match err {
            Error::Parse { raw_text, .. } => assert_eq!(raw_text, "{\"notideas\":[]}"),
            _ => panic!("Expected Parse error"),
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        assert!(matches!(err, Error::Serialization(_)));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
