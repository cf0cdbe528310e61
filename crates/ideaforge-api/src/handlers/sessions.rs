//! Session listing and inspection handlers.

use axum::extract::{Path, Query, State};
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use ideaforge_core::{
    IdeaRepository, ListSessionsRequest, SessionRepository, SessionStatus,
};

use crate::error::ApiError;
use crate::handlers::{parse_uuid, validate_pagination};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct ListSessionsQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub status: Option<String>,
}

/// GET /api/v1/sessions — paginated listing, soft-deleted excluded.
pub async fn list_sessions(
    State(state): State<AppState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let (limit, offset) = validate_pagination(query.limit, query.offset)?;
    let status = query
        .status
        .as_deref()
        .map(|raw| {
            SessionStatus::parse(raw).ok_or_else(|| {
                ApiError::validation(format!(
                    "status must be one of pending, processing, completed, failed; got '{raw}'"
                ))
            })
        })
        .transpose()?;

    let page = state
        .db
        .sessions
        .list(ListSessionsRequest {
            limit: Some(limit),
            offset: Some(offset),
            status,
        })
        .await?;

    let has_more = page.offset + (page.sessions.len() as i64) < page.total;
    Ok(Json(json!({
        "sessions": page.sessions,
        "pagination": {
            "total": page.total,
            "limit": page.limit,
            "offset": page.offset,
            "hasMore": has_more,
        },
    })))
}

/// GET /api/v1/sessions/:id — one session with its ranked unique ideas.
pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_uuid(&session_id, "sessionId")?;
    let session = state.db.sessions.get(session_id).await?;
    let unique_ideas = state.db.ideas.unique_ranked(session_id).await?;

    Ok(Json(json!({
        "session": session,
        "uniqueIdeas": unique_ideas,
    })))
}

#[derive(Debug, Default, Deserialize)]
pub struct ListIdeasQuery {
    #[serde(default)]
    pub unique: Option<bool>,
}

/// GET /api/v1/sessions/:id/ideas — all ideas, optionally unique only.
pub async fn list_session_ideas(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
    Query(query): Query<ListIdeasQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_uuid(&session_id, "sessionId")?;
    // 404 for unknown sessions rather than an empty list.
    state.db.sessions.get(session_id).await?;

    let ideas = state
        .db
        .ideas
        .list_for_session(session_id, query.unique.unwrap_or(false))
        .await?;

    Ok(Json(json!({
        "count": ideas.len(),
        "ideas": ideas,
    })))
}

/// DELETE /api/v1/sessions/:id — soft delete.
pub async fn delete_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_uuid(&session_id, "sessionId")?;
    state.db.sessions.soft_delete(session_id).await?;

    Ok(Json(json!({
        "message": format!("session {session_id} deleted"),
    })))
}
