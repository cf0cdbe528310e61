//! Domain models for the ideaforge research engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use uuid::Uuid;

// =============================================================================
// SESSION
// =============================================================================

/// Lifecycle status of a research session.
///
/// Transitions are monotonic: `Pending → Processing → {Completed, Failed}`.
/// A failed session is terminal; callers start a new session instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Database string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parse from a database string; unknown strings are rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "processing" => Some(Self::Processing),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal transition.
    ///
    /// Equal-status updates are allowed (idempotent writers).
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        if *self == next {
            return true;
        }
        matches!(
            (self, next),
            (Self::Pending, Self::Processing)
                | (Self::Pending, Self::Failed)
                | (Self::Processing, Self::Completed)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One research invocation and everything derived from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub problem_statement: String,
    pub status: SessionStatus,
    pub metadata: JsonValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
}

// =============================================================================
// PROVIDER RESPONSE
// =============================================================================

/// Outcome of a single provider attempt for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Failed,
}

impl ResponseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// One row per attempt per session per provider, raw text kept verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderResponse {
    pub id: Uuid,
    pub session_id: Uuid,
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub latency_ms: Option<i64>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// IDEA
// =============================================================================

/// Fixed category set for ideas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdeaCategory {
    Technical,
    Business,
    Research,
    Design,
    Policy,
    Other,
}

impl IdeaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Technical => "technical",
            Self::Business => "business",
            Self::Research => "research",
            Self::Design => "design",
            Self::Policy => "policy",
            Self::Other => "other",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "technical" => Some(Self::Technical),
            "business" => Some(Self::Business),
            "research" => Some(Self::Research),
            "design" => Some(Self::Design),
            "policy" => Some(Self::Policy),
            "other" => Some(Self::Other),
            _ => None,
        }
    }
}

impl std::fmt::Display for IdeaCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A validated idea as returned by a provider, before persistence.
///
/// Carries only the model-authored fields; provenance and clustering
/// attributes are attached downstream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct IdeaDraft {
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub category: IdeaCategory,
    pub confidence_score: f64,
    pub novelty_score: f64,
    pub tags: Vec<String>,
}

impl IdeaDraft {
    /// Text fed to the embedding model for this idea.
    pub fn embedding_text(&self) -> String {
        format!(
            "{}. {} Tags: {}",
            self.title,
            self.description,
            self.tags.join(", ")
        )
    }
}

/// A persisted idea with provenance, cluster assignment, and dedup flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Idea {
    pub id: Uuid,
    pub session_id: Uuid,
    pub response_id: Uuid,
    pub provider: String,
    pub title: String,
    pub description: String,
    pub rationale: String,
    pub category: IdeaCategory,
    pub confidence_score: f64,
    pub novelty_score: f64,
    pub tags: Vec<String>,
    pub cluster_id: Option<i32>,
    pub is_duplicate: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duplicate_of: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similarity_to_duplicate: Option<f64>,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// CLUSTERING SUMMARY
// =============================================================================

/// Aggregate numbers produced by the similarity pipeline for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSummary {
    pub total_ideas: usize,
    pub unique_ideas: usize,
    pub duplicates: usize,
    pub clusters: usize,
}

/// Per-provider outcome surfaced to callers alongside the ranked ideas.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderStatus {
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<i64>,
    pub idea_count: usize,
}

// =============================================================================
// DEEPENING
// =============================================================================

/// Priority of a deepening action item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionPriority {
    High,
    Medium,
    Low,
}

/// One concrete step in a deepening plan.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActionItem {
    pub step: String,
    pub description: String,
    pub priority: ActionPriority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_effort: Option<String>,
}

/// A risk identified during deepening.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RiskItem {
    pub risk: String,
    pub severity: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mitigation: Option<String>,
}

/// Typed deepening result document (the `deepening` envelope body).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeepeningPayload {
    pub idea_title: String,
    pub depth_level: i16,
    pub executive_summary: String,
    pub key_insights: Vec<String>,
    pub detailed_analysis: String,
    pub action_items: Vec<ActionItem>,
    pub risks: Vec<RiskItem>,
    pub success_metrics: Vec<String>,
    pub resources_needed: Vec<String>,
    pub estimated_timeline: String,
    pub confidence_score: f64,
}

/// A persisted single-provider elaboration of one idea.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeepeningRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub idea_id: Uuid,
    pub provider: String,
    pub depth_level: i16,
    pub prompt_used: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DeepeningPayload>,
    pub prompt_tokens: Option<i32>,
    pub completion_tokens: Option<i32>,
    pub latency_ms: Option<i64>,
    pub status: ResponseStatus,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// JOBS
// =============================================================================

/// Durable queue state for a research job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Waiting,
    Active,
    Completed,
    Failed,
    Stalled,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Stalled => "stalled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "stalled" => Some(Self::Stalled),
            _ => None,
        }
    }
}

/// What a research job carries through the queue.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JobPayload {
    pub problem_statement: String,
    #[serde(default)]
    pub metadata: JsonValue,
}

impl JobPayload {
    /// Pre-created session id, when the enqueuer reserved one.
    ///
    /// Retries keyed by this id are idempotent at the persistence layer.
    pub fn session_id(&self) -> Option<Uuid> {
        self.metadata
            .get("sessionId")
            .and_then(|v| v.as_str())
            .and_then(|s| Uuid::parse_str(s).ok())
    }
}

/// A durable queue entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub payload: JobPayload,
    pub state: JobState,
    pub attempt: i32,
    pub max_attempts: i32,
    pub stalled_count: i32,
    pub progress: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JsonValue>,
    pub run_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn session_status_round_trip() {
        for status in [
            SessionStatus::Pending,
            SessionStatus::Processing,
            SessionStatus::Completed,
            SessionStatus::Failed,
        ] {
            assert_eq!(SessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(SessionStatus::parse("bogus"), None);
    }

    #[test]
    fn session_status_transitions_are_monotonic() {
        use SessionStatus::*;
        assert!(Pending.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Completed));
        assert!(Processing.can_transition_to(Failed));
        assert!(Pending.can_transition_to(Failed));

        // Idempotent equal-status updates
        assert!(Processing.can_transition_to(Processing));
        assert!(Completed.can_transition_to(Completed));

        // Backwards and out-of-terminal moves are rejected
        assert!(!Processing.can_transition_to(Pending));
        assert!(!Completed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Processing));
        assert!(!Failed.can_transition_to(Completed));
        assert!(!Pending.can_transition_to(Completed));
    }

    #[test]
    fn idea_category_round_trip() {
        for cat in [
            IdeaCategory::Technical,
            IdeaCategory::Business,
            IdeaCategory::Research,
            IdeaCategory::Design,
            IdeaCategory::Policy,
            IdeaCategory::Other,
        ] {
            assert_eq!(IdeaCategory::parse(cat.as_str()), Some(cat));
        }
        assert_eq!(IdeaCategory::parse("TECHNICAL"), None);
    }

    #[test]
    fn embedding_text_joins_tags() {
        let draft = IdeaDraft {
            title: "Edge caching".to_string(),
            description: "Cache embeddings at the edge to cut latency.".to_string(),
            rationale: "Round trips dominate cost.".to_string(),
            category: IdeaCategory::Technical,
            confidence_score: 0.8,
            novelty_score: 0.5,
            tags: vec!["caching".to_string(), "latency".to_string()],
        };

        assert_eq!(
            draft.embedding_text(),
            "Edge caching. Cache embeddings at the edge to cut latency. Tags: caching, latency"
        );
    }

    #[test]
    fn job_state_round_trip() {
        for state in [
            JobState::Waiting,
            JobState::Active,
            JobState::Completed,
            JobState::Failed,
            JobState::Stalled,
        ] {
            assert_eq!(JobState::parse(state.as_str()), Some(state));
        }
        assert_eq!(JobState::parse(""), None);
    }

    #[test]
    fn job_payload_extracts_session_id() {
        let id = Uuid::new_v4();
        let payload = JobPayload {
            problem_statement: "How do we reduce churn in year one?".to_string(),
            metadata: json!({ "sessionId": id.to_string() }),
        };
        assert_eq!(payload.session_id(), Some(id));

        let without = JobPayload {
            problem_statement: "x".to_string(),
            metadata: json!({}),
        };
        assert_eq!(without.session_id(), None);

        let malformed = JobPayload {
            problem_statement: "x".to_string(),
            metadata: json!({ "sessionId": "not-a-uuid" }),
        };
        assert_eq!(malformed.session_id(), None);
    }

    #[test]
    fn deepening_payload_serde_round_trip() {
        let payload = DeepeningPayload {
            idea_title: "Edge caching".to_string(),
            depth_level: 2,
            executive_summary: "Cache at the edge.".to_string(),
            key_insights: vec!["Latency dominates".to_string()],
            detailed_analysis: "a".repeat(120),
            action_items: vec![ActionItem {
                step: "Prototype".to_string(),
                description: "Build a CDN-backed cache".to_string(),
                priority: ActionPriority::High,
                estimated_effort: Some("2 weeks".to_string()),
            }],
            risks: vec![RiskItem {
                risk: "Stale entries".to_string(),
                severity: "medium".to_string(),
                mitigation: None,
            }],
            success_metrics: vec!["p99 < 100ms".to_string()],
            resources_needed: vec!["CDN budget".to_string()],
            estimated_timeline: "1 quarter".to_string(),
            confidence_score: 0.7,
        };

        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"priority\":\"high\""));
        let back: DeepeningPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }

    #[test]
    fn session_serializes_status_lowercase() {
        let session = Session {
            id: Uuid::nil(),
            problem_statement: "p".repeat(20),
            status: SessionStatus::Processing,
            metadata: json!({}),
            created_at: Utc::now(),
            updated_at: Utc::now(),
            deleted_at: None,
        };
        let json = serde_json::to_string(&session).unwrap();
        assert!(json.contains("\"status\":\"processing\""));
        assert!(!json.contains("deleted_at"));
    }
}
