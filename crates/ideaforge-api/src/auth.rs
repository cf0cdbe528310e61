//! Inbound authentication and rate limiting middleware.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use subtle::ConstantTimeEq;

use crate::error::{ApiError, ErrorCode};
use crate::state::AppState;

/// Header carrying the inbound API key.
pub const API_KEY_HEADER: &str = "x-api-key";

/// Constant-time comparison of the presented key against the configured one.
pub fn api_key_matches(presented: &str, expected: &str) -> bool {
    presented.as_bytes().ct_eq(expected.as_bytes()).into()
}

/// Require a valid `X-Api-Key` header on every request.
pub async fn require_api_key(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let presented = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or_else(|| ApiError::new(ErrorCode::Auth, "missing API key"))?;

    if !api_key_matches(presented, &state.api_key) {
        return Err(ApiError::new(ErrorCode::Auth, "invalid API key"));
    }

    Ok(next.run(request).await)
}

/// Global rate limiter type (direct quota, not keyed per client).
pub type GlobalRateLimiter = governor::RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Enforce the global request quota.
pub async fn enforce_rate_limit(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if let Some(ref limiter) = state.rate_limiter {
        if limiter.check().is_err() {
            return Err(ApiError::new(
                ErrorCode::RateLimit,
                "rate limit exceeded, retry later",
            ));
        }
    }
    Ok(next.run(request).await)
}

/// Build the process-wide limiter from configuration; `None` disables it.
///
/// `max_requests` per `window`, allowed as a burst with the quota
/// replenishing evenly across the window.
pub fn build_rate_limiter(
    max_requests: u32,
    window: std::time::Duration,
) -> Option<Arc<GlobalRateLimiter>> {
    let burst = std::num::NonZeroU32::new(max_requests)?;
    if window.is_zero() {
        return None;
    }
    let quota = governor::Quota::with_period(window / max_requests)?.allow_burst(burst);
    Some(Arc::new(governor::RateLimiter::direct(quota)))
}
