//! Mock inference backends for deterministic testing.
//!
//! `MockChatBackend` replays a script of outcomes (reply, classified
//! failure, or hang) so retry, timeout, and fan-out behavior can be tested
//! without a network. `MockEmbeddingBackend` assigns each distinct text its
//! own axis in a one-hot space, so identical texts embed identically
//! (cosine 1.0) and distinct texts are orthogonal (cosine 0.0).

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use ideaforge_core::{
    ChatBackend, EmbeddingBackend, Error, FailureKind, IndexedEmbedding, ProviderFailure,
    RawCompletion, Result,
};

// =============================================================================
// CHAT MOCK
// =============================================================================

/// One scripted outcome for a chat attempt.
#[derive(Debug, Clone)]
pub enum ScriptedReply {
    /// Succeed with this text.
    Text(String),
    /// Fail with this classification.
    Failure(FailureKind, String),
    /// Never resolve; exercises the adapter's per-attempt timeout.
    Hang,
}

impl ScriptedReply {
    pub fn text(t: impl Into<String>) -> Self {
        Self::Text(t.into())
    }

    pub fn failure(kind: FailureKind, message: impl Into<String>) -> Self {
        Self::Failure(kind, message.into())
    }

    pub fn hang() -> Self {
        Self::Hang
    }
}

/// Shared call counter readable after the backend is moved into an adapter.
#[derive(Clone, Default)]
pub struct CallCount(Arc<AtomicUsize>);

impl CallCount {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

/// Scripted chat backend.
///
/// Outcomes are consumed in order; once the script is exhausted the last
/// outcome repeats. An empty script repeats an empty successful reply.
pub struct MockChatBackend {
    model: String,
    script: Mutex<Vec<ScriptedReply>>,
    cursor: AtomicUsize,
    calls: CallCount,
}

impl MockChatBackend {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            script: Mutex::new(Vec::new()),
            cursor: AtomicUsize::new(0),
            calls: CallCount::default(),
        }
    }

    /// Append an outcome to the script.
    pub fn with_reply(self, reply: ScriptedReply) -> Self {
        self.script.lock().unwrap().push(reply);
        self
    }

    /// Handle for asserting on the number of attempts observed.
    pub fn call_count_handle(&self) -> CallCount {
        self.calls.clone()
    }

    fn next_reply(&self) -> ScriptedReply {
        let script = self.script.lock().unwrap();
        if script.is_empty() {
            return ScriptedReply::Text(String::new());
        }
        let idx = self.cursor.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
        script[idx].clone()
    }
}

#[async_trait]
impl ChatBackend for MockChatBackend {
    async fn complete(
        &self,
        _system: &str,
        _user: &str,
    ) -> std::result::Result<RawCompletion, ProviderFailure> {
        self.calls.increment();
        match self.next_reply() {
            ScriptedReply::Text(text) => Ok(RawCompletion {
                text,
                prompt_tokens: Some(100),
                completion_tokens: Some(200),
                latency_ms: 5,
            }),
            ScriptedReply::Failure(kind, message) => Err(ProviderFailure::new(kind, message)),
            ScriptedReply::Hang => {
                tokio::time::sleep(Duration::from_secs(86_400)).await;
                Err(ProviderFailure::new(FailureKind::Transport, "unreachable"))
            }
        }
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

// =============================================================================
// EMBEDDING MOCK
// =============================================================================

/// Deterministic one-hot embedding backend.
pub struct MockEmbeddingBackend {
    dimension: usize,
    axes: Mutex<HashMap<String, usize>>,
    /// Return batch items in reverse index order, exercising the client's
    /// reorder-by-index step.
    shuffle: bool,
    /// 1-based batch ordinal that fails, if any.
    fail_on_batch: Option<usize>,
    batches_seen: AtomicUsize,
}

impl MockEmbeddingBackend {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            axes: Mutex::new(HashMap::new()),
            shuffle: false,
            fail_on_batch: None,
            batches_seen: AtomicUsize::new(0),
        }
    }

    /// Return batch items out of order (the server is allowed to).
    pub fn with_shuffled_output(mut self) -> Self {
        self.shuffle = true;
        self
    }

    /// Fail the Nth batch (1-based) with a request error.
    pub fn with_failing_batch(mut self, batch: usize) -> Self {
        self.fail_on_batch = Some(batch);
        self
    }

    /// Number of batches dispatched so far.
    pub fn batches_seen(&self) -> usize {
        self.batches_seen.load(Ordering::SeqCst)
    }

    fn axis_for(&self, text: &str) -> usize {
        let mut axes = self.axes.lock().unwrap();
        let next = axes.len();
        *axes.entry(text.to_string()).or_insert(next) % self.dimension
    }
}

#[async_trait]
impl EmbeddingBackend for MockEmbeddingBackend {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<IndexedEmbedding>> {
        let batch = self.batches_seen.fetch_add(1, Ordering::SeqCst) + 1;
        if self.fail_on_batch == Some(batch) {
            return Err(Error::Request(format!("mock failure on batch {batch}")));
        }

        let mut out: Vec<IndexedEmbedding> = texts
            .iter()
            .enumerate()
            .map(|(index, text)| {
                let mut vector = vec![0.0f32; self.dimension];
                vector[self.axis_for(text)] = 1.0;
                IndexedEmbedding { index, vector }
            })
            .collect();

        if self.shuffle {
            out.reverse();
        }
        Ok(out)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embedding"
    }
}
