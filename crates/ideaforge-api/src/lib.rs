//! # ideaforge-api
//!
//! HTTP API server for the ideaforge research engine: versioned routes,
//! constant-time API-key auth, global rate limiting, the wire error
//! envelope, and request-id propagation.

pub mod auth;
pub mod error;
pub mod handlers;
pub mod state;

use axum::http::HeaderName;
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{
    MakeRequestId, PropagateRequestIdLayer, RequestId, SetRequestIdLayer,
};
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use ideaforge_core::defaults;

pub use error::{ApiError, ErrorCode};
pub use state::AppState;

/// Generates time-ordered UUIDv7 request correlation IDs.
///
/// UUIDv7 embeds a Unix timestamp, so IDs sort chronologically — useful for
/// log correlation across request → job → provider calls.
#[derive(Clone, Default)]
struct MakeRequestUuidV7;

impl MakeRequestId for MakeRequestUuidV7 {
    fn make_request_id<B>(&mut self, _request: &axum::http::Request<B>) -> Option<RequestId> {
        let id = Uuid::now_v7().to_string().parse().ok()?;
        Some(RequestId::new(id))
    }
}

/// Build the application router: `/health` open, everything else under
/// `/api/v1` behind the API key and the global rate limiter.
pub fn build_router(state: AppState) -> Router {
    let request_id_header = HeaderName::from_static("x-request-id");

    let api_v1 = Router::new()
        .route("/research", post(handlers::research::start_research))
        .route("/research/async", post(handlers::research::start_research_async))
        .route(
            "/research/job/:job_id",
            get(handlers::research::get_job),
        )
        .route(
            "/research/:session_id",
            get(handlers::research::get_research_session),
        )
        .route(
            "/research/:session_id/deepen/:idea_id",
            post(handlers::research::deepen_idea),
        )
        .route("/sessions", get(handlers::sessions::list_sessions))
        .route(
            "/sessions/:session_id",
            get(handlers::sessions::get_session).delete(handlers::sessions::delete_session),
        )
        .route(
            "/sessions/:session_id/ideas",
            get(handlers::sessions::list_session_ideas),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_api_key,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::enforce_rate_limit,
        ));

    Router::new()
        .route("/health", get(handlers::system::health))
        .nest("/api/v1", api_v1)
        .layer(RequestBodyLimitLayer::new(defaults::MAX_BODY_SIZE_BYTES))
        .layer(PropagateRequestIdLayer::new(request_id_header.clone()))
        .layer(SetRequestIdLayer::new(
            request_id_header,
            MakeRequestUuidV7,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
