//! HTTP handlers for the v1 API.

pub mod research;
pub mod sessions;
pub mod system;

use uuid::Uuid;

use ideaforge_core::defaults;

use crate::error::ApiError;

/// Parse a UUID-shaped path parameter, naming the offender on failure.
pub fn parse_uuid(value: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(value)
        .map_err(|_| ApiError::validation(format!("{what} must be a UUID, got '{value}'")))
}

/// Validate and normalize a problem statement: trimmed, 20..5000 chars.
pub fn validate_problem_statement(raw: &str) -> Result<String, ApiError> {
    let trimmed = raw.trim();
    let len = trimmed.chars().count();
    if len < defaults::PROBLEM_MIN_CHARS || len > defaults::PROBLEM_MAX_CHARS {
        return Err(ApiError::validation(format!(
            "problemStatement must be {}..{} characters after trimming, got {len}",
            defaults::PROBLEM_MIN_CHARS,
            defaults::PROBLEM_MAX_CHARS
        )));
    }
    Ok(trimmed.to_string())
}

/// Validate pagination parameters: `limit` in 1..=100, `offset` >= 0.
pub fn validate_pagination(
    limit: Option<i64>,
    offset: Option<i64>,
) -> Result<(i64, i64), ApiError> {
    let limit = limit.unwrap_or(defaults::PAGE_LIMIT);
    if !(1..=defaults::PAGE_LIMIT_MAX).contains(&limit) {
        return Err(ApiError::validation(format!(
            "limit must be 1..{}, got {limit}",
            defaults::PAGE_LIMIT_MAX
        )));
    }
    let offset = offset.unwrap_or(defaults::PAGE_OFFSET);
    if offset < 0 {
        return Err(ApiError::validation(format!(
            "offset must be >= 0, got {offset}"
        )));
    }
    Ok((limit, offset))
}
