//! API error taxonomy and the wire envelope.
//!
//! Every error leaves the server as
//! `{"success": false, "error": {"code", "message", "details?"}}`.
//! Classified (operational) errors keep their message and details;
//! unclassified internals collapse to a generic message so nothing leaks.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value as JsonValue};

use ideaforge_core::Error;

/// Stable error codes exposed to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    Validation,
    Auth,
    NotFound,
    IdeaSessionMismatch,
    RateLimit,
    ProviderTimeout,
    ProviderError,
    ParseError,
    AllProvidersFailed,
    EmbeddingError,
    DatabaseError,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Validation => "VALIDATION",
            Self::Auth => "AUTH",
            Self::NotFound => "NOT_FOUND",
            Self::IdeaSessionMismatch => "IDEA_SESSION_MISMATCH",
            Self::RateLimit => "RATE_LIMIT",
            Self::ProviderTimeout => "PROVIDER_TIMEOUT",
            Self::ProviderError => "PROVIDER_ERROR",
            Self::ParseError => "PARSE_ERROR",
            Self::AllProvidersFailed => "ALL_PROVIDERS_FAILED",
            Self::EmbeddingError => "EMBEDDING_ERROR",
            Self::DatabaseError => "DATABASE_ERROR",
            Self::InternalError => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation | Self::IdeaSessionMismatch => StatusCode::BAD_REQUEST,
            Self::Auth => StatusCode::UNAUTHORIZED,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::RateLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::ProviderTimeout
            | Self::ProviderError
            | Self::ParseError
            | Self::AllProvidersFailed
            | Self::EmbeddingError => StatusCode::BAD_GATEWAY,
            Self::DatabaseError | Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// An error ready for serialization into the wire envelope.
#[derive(Debug)]
pub struct ApiError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<JsonValue>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: JsonValue) -> Self {
        self.details = Some(details);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Validation, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotFound(_) | Error::SessionNotFound(_) | Error::IdeaNotFound(_) => {
                ApiError::new(ErrorCode::NotFound, err.to_string())
            }
            Error::IdeaSessionMismatch { .. } => {
                ApiError::new(ErrorCode::IdeaSessionMismatch, err.to_string())
            }
            Error::InvalidInput(message) => ApiError::new(ErrorCode::Validation, message),
            Error::Unauthorized(message) => ApiError::new(ErrorCode::Auth, message),
            Error::RateLimited(message) => ApiError::new(ErrorCode::RateLimit, message),
            Error::ProviderTimeout {
                ref provider,
                ref message,
            } => ApiError::new(
                ErrorCode::ProviderTimeout,
                format!("provider '{provider}' timed out: {message}"),
            )
            .with_details(json!({ "provider": provider })),
            Error::Provider {
                ref provider,
                ref message,
            } => ApiError::new(
                ErrorCode::ProviderError,
                format!("provider '{provider}' failed: {message}"),
            )
            .with_details(json!({ "provider": provider })),
            Error::Parse { message, raw_text } => {
                ApiError::new(ErrorCode::ParseError, message)
                    .with_details(json!({ "rawText": raw_text }))
            }
            Error::AllProvidersFailed => ApiError::new(
                ErrorCode::AllProvidersFailed,
                "all configured providers failed",
            ),
            Error::Embedding {
                batch_number,
                total_batches,
                texts_in_batch,
                ref message,
            } => ApiError::new(ErrorCode::EmbeddingError, message.clone()).with_details(json!({
                "batchNumber": batch_number,
                "totalBatches": total_batches,
                "textsInBatch": texts_in_batch,
            })),
            Error::Database(_) => ApiError::new(ErrorCode::DatabaseError, err.to_string()),
            // Unclassified internals collapse to a generic message.
            Error::Job(_)
            | Error::Serialization(_)
            | Error::Config(_)
            | Error::Request(_)
            | Error::Internal(_)
            | Error::Io(_) => {
                tracing::error!(error = %err, "Internal error surfaced to API");
                ApiError::new(ErrorCode::InternalError, "internal server error")
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut error = json!({
            "code": self.code.as_str(),
            "message": self.message,
        });
        if let Some(details) = self.details {
            error["details"] = details;
        }

        let body = Json(json!({
            "success": false,
            "error": error,
        }));

        (self.code.status(), body).into_response()
    }
}
