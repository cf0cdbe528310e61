//! Worker pool behavior over an in-memory queue.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value as JsonValue};
use uuid::Uuid;

use ideaforge_core::{
    new_v7, Error, Job, JobPayload, JobRepository, JobState, Result,
};
use ideaforge_jobs::{JobContext, JobHandler, JobResult, JobWorker, NoOpHandler, WorkerConfig, WorkerEvent};

// =============================================================================
// IN-MEMORY QUEUE
// =============================================================================

/// In-memory queue with the production retry semantics but zero backoff, so
/// retries are immediately claimable under paused test time.
#[derive(Default)]
struct InMemoryJobs {
    jobs: Mutex<HashMap<Uuid, Job>>,
}

impl InMemoryJobs {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state_of(&self, id: Uuid) -> Option<JobState> {
        self.jobs.lock().unwrap().get(&id).map(|j| j.state)
    }
}

#[async_trait]
impl JobRepository for InMemoryJobs {
    async fn enqueue(&self, payload: &JobPayload) -> Result<Uuid> {
        let id = new_v7();
        let now = Utc::now();
        self.jobs.lock().unwrap().insert(
            id,
            Job {
                id,
                payload: payload.clone(),
                state: JobState::Waiting,
                attempt: 0,
                max_attempts: 2,
                stalled_count: 0,
                progress: 0,
                error_message: None,
                result: None,
                run_at: now,
                created_at: now,
                started_at: None,
                completed_at: None,
            },
        );
        Ok(id)
    }

    async fn claim_next(&self) -> Result<Option<Job>> {
        let mut jobs = self.jobs.lock().unwrap();
        let now = Utc::now();
        let next = jobs
            .values()
            .filter(|j| {
                matches!(j.state, JobState::Waiting | JobState::Stalled) && j.run_at <= now
            })
            .min_by_key(|j| j.created_at)
            .map(|j| j.id);

        Ok(next.map(|id| {
            let job = jobs.get_mut(&id).unwrap();
            job.state = JobState::Active;
            job.attempt += 1;
            job.started_at.get_or_insert(now);
            job.clone()
        }))
    }

    async fn heartbeat(&self, _job_id: Uuid) -> Result<()> {
        Ok(())
    }

    async fn update_progress(&self, job_id: Uuid, progress: i32) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&job_id) {
            job.progress = progress.clamp(0, 100);
        }
        Ok(())
    }

    async fn complete(&self, job_id: Uuid, result: JsonValue) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::Job("unknown job".into()))?;
        job.state = JobState::Completed;
        job.result = Some(result);
        job.progress = 100;
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn fail(&self, job_id: Uuid, error: &str) -> Result<()> {
        let mut jobs = self.jobs.lock().unwrap();
        let job = jobs
            .get_mut(&job_id)
            .ok_or_else(|| Error::Job("unknown job".into()))?;
        job.error_message = Some(error.to_string());
        if job.attempt < job.max_attempts {
            job.state = JobState::Waiting;
            job.run_at = Utc::now();
        } else {
            job.state = JobState::Failed;
            job.completed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn recover_stalled(&self, _stall_timeout: Duration) -> Result<u64> {
        Ok(0)
    }

    async fn cleanup(&self) -> Result<u64> {
        Ok(0)
    }

    async fn get(&self, job_id: Uuid) -> Result<Option<Job>> {
        Ok(self.jobs.lock().unwrap().get(&job_id).cloned())
    }

    async fn waiting_count(&self) -> Result<i64> {
        Ok(self
            .jobs
            .lock()
            .unwrap()
            .values()
            .filter(|j| j.state == JobState::Waiting)
            .count() as i64)
    }
}

// =============================================================================
// HELPERS
// =============================================================================

/// Handler that fails every attempt.
struct AlwaysFails;

#[async_trait]
impl JobHandler for AlwaysFails {
    async fn execute(&self, _ctx: JobContext) -> JobResult {
        JobResult::Failed("simulated handler failure".to_string())
    }
}

fn payload() -> JobPayload {
    JobPayload {
        problem_statement: "A problem statement long enough to matter.".to_string(),
        metadata: json!({}),
    }
}

async fn wait_for<F>(rx: &mut tokio::sync::broadcast::Receiver<WorkerEvent>, mut pred: F) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    loop {
        let event = tokio::time::timeout(Duration::from_secs(120), rx.recv())
            .await
            .expect("timed out waiting for worker event")
            .expect("event channel closed");
        if pred(&event) {
            return event;
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[tokio::test(start_paused = true)]
async fn worker_processes_job_to_completion() {
    let queue = InMemoryJobs::new();
    let job_id = queue.enqueue(&payload()).await.unwrap();

    let worker = JobWorker::new(queue.clone(), Arc::new(NoOpHandler), WorkerConfig::default());
    let mut events = worker.events();
    let handle = worker.start();

    wait_for(&mut events, |e| {
        matches!(e, WorkerEvent::JobCompleted { job_id: id } if *id == job_id)
    })
    .await;

    let job = queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.state, JobState::Completed);
    assert_eq!(job.progress, 100);
    assert_eq!(job.result, Some(json!({ "ok": true })));

    handle.shutdown().await.unwrap();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::WorkerStopped)).await;
}

#[tokio::test(start_paused = true)]
async fn failing_job_retries_then_fails_terminally() {
    let queue = InMemoryJobs::new();
    let job_id = queue.enqueue(&payload()).await.unwrap();

    let worker = JobWorker::new(queue.clone(), Arc::new(AlwaysFails), WorkerConfig::default());
    let mut events = worker.events();
    let handle = worker.start();

    // Two attempts: one retry, then terminal failure.
    wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;
    wait_for(&mut events, |e| matches!(e, WorkerEvent::JobFailed { .. })).await;

    // Wait until the queue settles into the terminal state.
    loop {
        if queue.state_of(job_id) == Some(JobState::Failed) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    let job = queue.get(job_id).await.unwrap().unwrap();
    assert_eq!(job.attempt, 2);
    assert_eq!(
        job.error_message.as_deref(),
        Some("simulated handler failure")
    );

    handle.shutdown().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn disabled_worker_claims_nothing() {
    let queue = InMemoryJobs::new();
    let job_id = queue.enqueue(&payload()).await.unwrap();

    let worker = JobWorker::new(
        queue.clone(),
        Arc::new(NoOpHandler),
        WorkerConfig::default().with_enabled(false),
    );
    let handle = worker.start();

    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(queue.state_of(job_id), Some(JobState::Waiting));
    drop(handle);
}

#[tokio::test(start_paused = true)]
async fn shutdown_stops_the_claim_loop() {
    let queue = InMemoryJobs::new();
    let worker = JobWorker::new(queue.clone(), Arc::new(NoOpHandler), WorkerConfig::default());
    let mut events = worker.events();
    let handle = worker.start();

    wait_for(&mut events, |e| matches!(e, WorkerEvent::WorkerStarted)).await;
    handle.shutdown().await.unwrap();
    wait_for(&mut events, |e| matches!(e, WorkerEvent::WorkerStopped)).await;

    // Jobs enqueued after shutdown stay untouched.
    let job_id = queue.enqueue(&payload()).await.unwrap();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert_eq!(queue.state_of(job_id), Some(JobState::Waiting));
}
