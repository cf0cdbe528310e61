//! In-memory repository fakes and fixture builders for pipeline tests.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use ideaforge_core::{
    new_v7, DeepeningRecord, DeepeningRepository, DuplicateUpdate, Error, Idea, IdeaCategory,
    IdeaRepository, ListSessionsRequest, ListSessionsResponse, NewDeepeningRecord, NewIdeaRow,
    ProviderResponse, RawCompletion, ResponseStatus, Result, Session, SessionRepository,
    SessionStatus,
};

// =============================================================================
// SESSION FAKE
// =============================================================================

#[derive(Default)]
pub struct InMemorySessions {
    pub sessions: Mutex<HashMap<Uuid, Session>>,
    pub responses: Mutex<Vec<ProviderResponse>>,
}

impl InMemorySessions {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn session_status(&self, id: Uuid) -> Option<SessionStatus> {
        self.sessions.lock().unwrap().get(&id).map(|s| s.status)
    }

    pub fn responses_snapshot(&self) -> Vec<ProviderResponse> {
        self.responses.lock().unwrap().clone()
    }

    /// Seed a session in a given status (deepening tests).
    pub fn seed_session(&self, status: SessionStatus) -> Uuid {
        let id = new_v7();
        let now = Utc::now();
        self.sessions.lock().unwrap().insert(
            id,
            Session {
                id,
                problem_statement: "A problem statement long enough to matter.".to_string(),
                status,
                metadata: json!({}),
                created_at: now,
                updated_at: now,
                deleted_at: None,
            },
        );
        id
    }
}

#[async_trait]
impl SessionRepository for InMemorySessions {
    async fn create(&self, problem_statement: &str, metadata: JsonValue) -> Result<Session> {
        let now = Utc::now();
        let session = Session {
            id: new_v7(),
            problem_statement: problem_statement.to_string(),
            status: SessionStatus::Pending,
            metadata,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        self.sessions
            .lock()
            .unwrap()
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn get(&self, id: Uuid) -> Result<Session> {
        self.sessions
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or(Error::SessionNotFound(id))
    }

    async fn list(&self, req: ListSessionsRequest) -> Result<ListSessionsResponse> {
        let sessions: Vec<Session> = self
            .sessions
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.deleted_at.is_none())
            .filter(|s| req.status.map_or(true, |status| s.status == status))
            .cloned()
            .collect();
        let total = sessions.len() as i64;
        Ok(ListSessionsResponse {
            sessions,
            total,
            limit: req.limit.unwrap_or(20),
            offset: req.offset.unwrap_or(0),
        })
    }

    async fn update_status(&self, id: Uuid, status: SessionStatus) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        if session.status == status {
            return Ok(());
        }
        if !session.status.can_transition_to(status) {
            return Err(Error::InvalidInput(format!(
                "illegal session transition {} -> {}",
                session.status, status
            )));
        }
        session.status = status;
        session.updated_at = Utc::now();
        Ok(())
    }

    async fn soft_delete(&self, id: Uuid) -> Result<()> {
        let mut sessions = self.sessions.lock().unwrap();
        let session = sessions.get_mut(&id).ok_or(Error::SessionNotFound(id))?;
        session.deleted_at = Some(Utc::now());
        Ok(())
    }

    async fn save_provider_success(
        &self,
        session_id: Uuid,
        provider: &str,
        model: Option<&str>,
        completion: &RawCompletion,
    ) -> Result<Uuid> {
        let id = new_v7();
        self.responses.lock().unwrap().push(ProviderResponse {
            id,
            session_id,
            provider: provider.to_string(),
            model: model.map(str::to_string),
            status: ResponseStatus::Success,
            raw_text: Some(completion.text.clone()),
            error_message: None,
            prompt_tokens: completion.prompt_tokens,
            completion_tokens: completion.completion_tokens,
            latency_ms: Some(completion.latency_ms),
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn save_provider_failure(
        &self,
        session_id: Uuid,
        provider: &str,
        model: Option<&str>,
        message: &str,
        raw_text: Option<&str>,
    ) {
        self.responses.lock().unwrap().push(ProviderResponse {
            id: new_v7(),
            session_id,
            provider: provider.to_string(),
            model: model.map(str::to_string),
            status: ResponseStatus::Failed,
            raw_text: raw_text.map(str::to_string),
            error_message: Some(message.to_string()),
            prompt_tokens: None,
            completion_tokens: None,
            latency_ms: None,
            created_at: Utc::now(),
        });
    }

    async fn latest_response(&self, session_id: Uuid) -> Result<Option<ProviderResponse>> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.session_id == session_id)
            .last()
            .cloned())
    }

    async fn list_responses(&self, session_id: Uuid) -> Result<Vec<ProviderResponse>> {
        Ok(self
            .responses
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.session_id == session_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// IDEA FAKE
// =============================================================================

#[derive(Default)]
pub struct InMemoryIdeas {
    pub rows: Mutex<Vec<Idea>>,
}

impl InMemoryIdeas {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn rows_snapshot(&self) -> Vec<Idea> {
        self.rows.lock().unwrap().clone()
    }

    /// Seed a stored idea (deepening tests).
    pub fn seed_idea(&self, session_id: Uuid) -> Uuid {
        let id = new_v7();
        self.rows.lock().unwrap().push(Idea {
            id,
            session_id,
            response_id: new_v7(),
            provider: "default".to_string(),
            title: "Edge embedding cache".to_string(),
            description: "Cache embeddings at the edge to cut round-trip latency.".to_string(),
            rationale: "Round trips dominate the cost model.".to_string(),
            category: IdeaCategory::Technical,
            confidence_score: 0.8,
            novelty_score: 0.6,
            tags: vec!["caching".to_string()],
            cluster_id: Some(0),
            is_duplicate: false,
            duplicate_of: None,
            similarity_to_duplicate: None,
            created_at: Utc::now(),
        });
        id
    }
}

#[async_trait]
impl IdeaRepository for InMemoryIdeas {
    async fn save_ideas(
        &self,
        session_id: Uuid,
        response_id: Uuid,
        provider: &str,
        new_rows: &[NewIdeaRow],
    ) -> Result<Vec<Uuid>> {
        let mut rows = self.rows.lock().unwrap();
        let mut ids = Vec::with_capacity(new_rows.len());
        for row in new_rows {
            // Mirror the upsert on (response_id, title).
            if let Some(existing) = rows
                .iter_mut()
                .find(|i| i.response_id == response_id && i.title == row.draft.title)
            {
                existing.cluster_id = Some(row.cluster_id);
                existing.is_duplicate = row.is_duplicate;
                existing.similarity_to_duplicate = row.similarity_to_duplicate;
                ids.push(existing.id);
                continue;
            }
            let id = new_v7();
            rows.push(Idea {
                id,
                session_id,
                response_id,
                provider: provider.to_string(),
                title: row.draft.title.clone(),
                description: row.draft.description.clone(),
                rationale: row.draft.rationale.clone(),
                category: row.draft.category,
                confidence_score: row.draft.confidence_score,
                novelty_score: row.draft.novelty_score,
                tags: row.draft.tags.clone(),
                cluster_id: Some(row.cluster_id),
                is_duplicate: row.is_duplicate,
                duplicate_of: None,
                similarity_to_duplicate: row.similarity_to_duplicate,
                created_at: Utc::now(),
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn update_duplicate_references(&self, updates: &[DuplicateUpdate]) -> Result<()> {
        let mut rows = self.rows.lock().unwrap();
        for update in updates {
            let row = rows
                .iter_mut()
                .find(|i| i.id == update.idea_id)
                .ok_or(Error::IdeaNotFound(update.idea_id))?;
            row.duplicate_of = Some(update.duplicate_of);
            row.similarity_to_duplicate = Some(update.similarity);
        }
        Ok(())
    }

    async fn get(&self, id: Uuid) -> Result<Idea> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .find(|i| i.id == id)
            .cloned()
            .ok_or(Error::IdeaNotFound(id))
    }

    async fn list_for_session(&self, session_id: Uuid, unique_only: bool) -> Result<Vec<Idea>> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.session_id == session_id)
            .filter(|i| !unique_only || !i.is_duplicate)
            .cloned()
            .collect())
    }

    async fn unique_ranked(&self, session_id: Uuid) -> Result<Vec<Idea>> {
        let mut ideas: Vec<Idea> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|i| i.session_id == session_id && !i.is_duplicate)
            .cloned()
            .collect();
        ideas.sort_by(|a, b| {
            b.confidence_score
                .partial_cmp(&a.confidence_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(
                    b.novelty_score
                        .partial_cmp(&a.novelty_score)
                        .unwrap_or(std::cmp::Ordering::Equal),
                )
        });
        Ok(ideas)
    }
}

// =============================================================================
// DEEPENING FAKE
// =============================================================================

#[derive(Default)]
pub struct InMemoryDeepening {
    pub records: Mutex<Vec<DeepeningRecord>>,
}

impl InMemoryDeepening {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records_snapshot(&self) -> Vec<DeepeningRecord> {
        self.records.lock().unwrap().clone()
    }
}

#[async_trait]
impl DeepeningRepository for InMemoryDeepening {
    async fn insert(&self, record: NewDeepeningRecord) -> Result<DeepeningRecord> {
        let stored = DeepeningRecord {
            id: new_v7(),
            session_id: record.session_id,
            idea_id: record.idea_id,
            provider: record.provider,
            depth_level: record.depth_level,
            prompt_used: record.prompt_used,
            result: record.result,
            prompt_tokens: record.prompt_tokens,
            completion_tokens: record.completion_tokens,
            latency_ms: record.latency_ms,
            status: record.status,
            created_at: Utc::now(),
        };
        self.records.lock().unwrap().push(stored.clone());
        Ok(stored)
    }

    async fn list_for_idea(&self, idea_id: Uuid) -> Result<Vec<DeepeningRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.idea_id == idea_id)
            .cloned()
            .collect())
    }
}

// =============================================================================
// FIXTURES
// =============================================================================

/// A valid research response with the given idea titles, all distinct in
/// content, confidence descending from 0.9 in steps of 0.05.
pub fn research_json(titles: &[&str]) -> String {
    let ideas: Vec<JsonValue> = titles
        .iter()
        .enumerate()
        .map(|(i, title)| {
            json!({
                "title": title,
                "description": format!(
                    "A sufficiently detailed description of '{title}' covering mechanism and scope."
                ),
                "rationale": format!("Addresses the problem via {title}."),
                "category": "technical",
                "confidence_score": 0.9 - i as f64 * 0.05,
                "novelty_score": 0.5,
                "tags": ["alpha", "beta"]
            })
        })
        .collect();
    json!({ "ideas": ideas }).to_string()
}

/// A research response whose single idea is byte-identical across providers.
pub fn identical_idea_json(confidence: f64) -> String {
    json!({
        "ideas": [{
            "title": "Unified telemetry pipeline",
            "description": "Collect, normalize, and route all product telemetry through one pipeline.",
            "rationale": "Fragmented telemetry blocks root-cause analysis.",
            "category": "technical",
            "confidence_score": confidence,
            "novelty_score": 0.5,
            "tags": ["telemetry", "pipeline"]
        }]
    })
    .to_string()
}

/// A valid deepening response for the given depth level.
pub fn deepening_json(depth_level: i16) -> String {
    json!({
        "deepening": {
            "idea_title": "Edge embedding cache",
            "depth_level": depth_level,
            "executive_summary": "Cache embeddings near users.",
            "key_insights": ["Latency dominates the cost model"],
            "detailed_analysis": "d".repeat(150),
            "action_items": [
                {"step": "Prototype", "description": "Build a CDN-backed cache", "priority": "high"}
            ],
            "risks": [{"risk": "Stale entries", "severity": "medium", "mitigation": "TTL"}],
            "success_metrics": ["p99 < 100ms"],
            "resources_needed": ["CDN budget"],
            "estimated_timeline": "one quarter",
            "confidence_score": 0.7
        }
    })
    .to_string()
}
