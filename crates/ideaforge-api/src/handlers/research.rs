//! Research submission, polling, and deepening handlers.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use ideaforge_core::{JobPayload, JobRepository, SessionRepository};
use ideaforge_pipeline::DeepeningRequest;

use crate::error::ApiError;
use crate::handlers::{parse_uuid, validate_problem_statement};
use crate::state::AppState;

fn poll_url(job_id: uuid::Uuid) -> String {
    format!("/api/v1/research/job/{job_id}")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResearchBody {
    pub problem_statement: String,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

fn metadata_object(metadata: Option<JsonValue>) -> Result<JsonValue, ApiError> {
    match metadata {
        None => Ok(json!({})),
        Some(value) if value.is_object() => Ok(value),
        Some(_) => Err(ApiError::validation("metadata must be an object")),
    }
}

/// POST /api/v1/research — enqueue research with a pre-created session.
pub async fn start_research(
    State(state): State<AppState>,
    Json(body): Json<ResearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let problem_statement = validate_problem_statement(&body.problem_statement)?;
    let mut metadata = metadata_object(body.metadata)?;

    let session = state
        .db
        .sessions
        .create(&problem_statement, metadata.clone())
        .await?;

    // The worker reuses this session, making queue redelivery idempotent.
    metadata["sessionId"] = json!(session.id.to_string());
    let job_id = state
        .jobs
        .enqueue(&JobPayload {
            problem_statement,
            metadata,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "sessionId": session.id,
            "jobId": job_id,
            "pollUrl": poll_url(job_id),
        })),
    ))
}

/// POST /api/v1/research/async — enqueue without pre-creating a session.
pub async fn start_research_async(
    State(state): State<AppState>,
    Json(body): Json<ResearchBody>,
) -> Result<impl IntoResponse, ApiError> {
    let problem_statement = validate_problem_statement(&body.problem_statement)?;
    let metadata = metadata_object(body.metadata)?;

    let job_id = state
        .jobs
        .enqueue(&JobPayload {
            problem_statement,
            metadata,
        })
        .await?;

    Ok((
        StatusCode::ACCEPTED,
        Json(json!({
            "jobId": job_id,
            "pollUrl": poll_url(job_id),
        })),
    ))
}

/// GET /api/v1/research/:sessionId — poll by session.
pub async fn get_research_session(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_uuid(&session_id, "sessionId")?;
    let session = state.db.sessions.get(session_id).await?;
    let latest = state.db.sessions.latest_response(session_id).await?;

    Ok(Json(json!({
        "session": session,
        "latestLlmResponse": latest,
    })))
}

/// GET /api/v1/research/job/:jobId — poll by job.
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let job_id = parse_uuid(&job_id, "jobId")?;
    let job = state
        .jobs
        .get(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("job {job_id} not found")))?;

    Ok(Json(json!({
        "jobId": job.id,
        "state": job.state,
        "progress": job.progress,
        "result": job.result,
        "failedReason": job.error_message,
        "timestamps": {
            "createdAt": job.created_at,
            "startedAt": job.started_at,
            "completedAt": job.completed_at,
        },
    })))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeepenBody {
    #[serde(default)]
    pub provider: Option<String>,
    #[serde(default)]
    pub depth_level: Option<i16>,
}

/// POST /api/v1/research/:sessionId/deepen/:ideaId — deepen one idea.
pub async fn deepen_idea(
    State(state): State<AppState>,
    Path((session_id, idea_id)): Path<(String, String)>,
    body: Option<Json<DeepenBody>>,
) -> Result<impl IntoResponse, ApiError> {
    let session_id = parse_uuid(&session_id, "sessionId")?;
    let idea_id = parse_uuid(&idea_id, "ideaId")?;
    let body = body.map(|Json(body)| body).unwrap_or_default();

    let depth_level = body.depth_level.unwrap_or(1);
    if !(1..=3).contains(&depth_level) {
        return Err(ApiError::validation(format!(
            "depthLevel must be 1..3, got {depth_level}"
        )));
    }

    let record = state
        .deepening
        .deepen(DeepeningRequest {
            session_id,
            idea_id,
            provider: body.provider,
            depth_level,
        })
        .await?;

    Ok(Json(json!({ "deepening": record })))
}
