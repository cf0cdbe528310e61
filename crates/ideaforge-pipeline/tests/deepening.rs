//! Deepening path scenarios over mock providers and in-memory repositories.

mod support;

use std::sync::Arc;

use ideaforge_core::{defaults, Error, FailureKind, ResponseStatus, SessionStatus};
use ideaforge_inference::adapter_with_backend;
use ideaforge_inference::mock::{MockChatBackend, ScriptedReply};
use ideaforge_inference::ProviderRegistry;
use ideaforge_pipeline::{DeepeningEngine, DeepeningRequest};

use support::{deepening_json, InMemoryDeepening, InMemoryIdeas, InMemorySessions};

struct Harness {
    sessions: Arc<InMemorySessions>,
    ideas: Arc<InMemoryIdeas>,
    deepening: Arc<InMemoryDeepening>,
    engine: DeepeningEngine,
}

fn harness(mock: MockChatBackend) -> Harness {
    let sessions = InMemorySessions::new();
    let ideas = InMemoryIdeas::new();
    let deepening = InMemoryDeepening::new();

    let mut registry = ProviderRegistry::new(false);
    registry.register(
        adapter_with_backend(defaults::DEFAULT_PROVIDER, Arc::new(mock)),
        true,
        false,
    );

    let engine = DeepeningEngine::new(
        sessions.clone(),
        ideas.clone(),
        deepening.clone(),
        Arc::new(registry),
    );

    Harness {
        sessions,
        ideas,
        deepening,
        engine,
    }
}

fn request(session_id: uuid::Uuid, idea_id: uuid::Uuid, depth_level: i16) -> DeepeningRequest {
    DeepeningRequest {
        session_id,
        idea_id,
        provider: None,
        depth_level,
    }
}

#[tokio::test(start_paused = true)]
async fn deepen_persists_validated_record() {
    let h = harness(MockChatBackend::new("m").with_reply(ScriptedReply::text(deepening_json(2))));
    let session_id = h.sessions.seed_session(SessionStatus::Completed);
    let idea_id = h.ideas.seed_idea(session_id);

    let record = h.engine.deepen(request(session_id, idea_id, 2)).await.unwrap();

    assert_eq!(record.session_id, session_id);
    assert_eq!(record.idea_id, idea_id);
    assert_eq!(record.depth_level, 2);
    assert_eq!(record.status, ResponseStatus::Success);
    assert!(record.prompt_used.contains("Edge embedding cache"));

    let payload = record.result.unwrap();
    assert_eq!(payload.depth_level, 2);
    assert_eq!(payload.action_items.len(), 1);

    assert_eq!(h.deepening.records_snapshot().len(), 1);
}

// An idea from a different session is rejected before any provider call.
#[tokio::test(start_paused = true)]
async fn mismatched_idea_session_writes_nothing() {
    let h = harness(MockChatBackend::new("m").with_reply(ScriptedReply::text(deepening_json(1))));
    let session_a = h.sessions.seed_session(SessionStatus::Completed);
    let session_b = h.sessions.seed_session(SessionStatus::Completed);
    let idea_in_b = h.ideas.seed_idea(session_b);

    let err = h
        .engine
        .deepen(request(session_a, idea_in_b, 1))
        .await
        .unwrap_err();

    match err {
        Error::IdeaSessionMismatch {
            idea_id,
            session_id,
        } => {
            assert_eq!(idea_id, idea_in_b);
            assert_eq!(session_id, session_a);
        }
        other => panic!("expected IdeaSessionMismatch, got {other:?}"),
    }
    assert!(h.deepening.records_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn deepening_requires_completed_session() {
    let h = harness(MockChatBackend::new("m").with_reply(ScriptedReply::text(deepening_json(1))));
    let session_id = h.sessions.seed_session(SessionStatus::Processing);
    let idea_id = h.ideas.seed_idea(session_id);

    let err = h.engine.deepen(request(session_id, idea_id, 1)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert!(h.deepening.records_snapshot().is_empty());
}

#[tokio::test(start_paused = true)]
async fn invalid_depth_level_is_rejected_before_any_call() {
    let mock = MockChatBackend::new("m").with_reply(ScriptedReply::text(deepening_json(1)));
    let calls = mock.call_count_handle();
    let h = harness(mock);
    let session_id = h.sessions.seed_session(SessionStatus::Completed);
    let idea_id = h.ideas.seed_idea(session_id);

    let err = h.engine.deepen(request(session_id, idea_id, 4)).await.unwrap_err();
    assert!(matches!(err, Error::InvalidInput(_)));
    assert_eq!(calls.get(), 0);
}

#[tokio::test(start_paused = true)]
async fn unknown_idea_is_not_found() {
    let h = harness(MockChatBackend::new("m"));
    let session_id = h.sessions.seed_session(SessionStatus::Completed);

    let ghost = uuid::Uuid::new_v4();
    let err = h.engine.deepen(request(session_id, ghost, 1)).await.unwrap_err();
    assert!(matches!(err, Error::IdeaNotFound(_)));
}

#[tokio::test(start_paused = true)]
async fn provider_failure_persists_failed_record() {
    let h = harness(
        MockChatBackend::new("m")
            .with_reply(ScriptedReply::failure(FailureKind::ClientError, "bad key")),
    );
    let session_id = h.sessions.seed_session(SessionStatus::Completed);
    let idea_id = h.ideas.seed_idea(session_id);

    let err = h.engine.deepen(request(session_id, idea_id, 3)).await.unwrap_err();
    assert!(matches!(err, Error::Provider { .. }));

    let records = h.deepening.records_snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ResponseStatus::Failed);
    assert!(records[0].result.is_none());
}

#[tokio::test(start_paused = true)]
async fn unparseable_output_surfaces_parse_error_with_raw_text() {
    let h = harness(
        MockChatBackend::new("m").with_reply(ScriptedReply::text("let me think about that...")),
    );
    let session_id = h.sessions.seed_session(SessionStatus::Completed);
    let idea_id = h.ideas.seed_idea(session_id);

    let err = h.engine.deepen(request(session_id, idea_id, 1)).await.unwrap_err();
    match err {
        Error::Parse { raw_text, .. } => {
            assert_eq!(raw_text, "let me think about that...");
        }
        other => panic!("expected Parse error, got {other:?}"),
    }

    let records = h.deepening.records_snapshot();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, ResponseStatus::Failed);
}
