//! Job worker pool: claims research jobs from the durable queue and runs
//! them with bounded concurrency, heartbeats, stalled recovery, and
//! retention cleanup.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinSet;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use ideaforge_core::{defaults, Job, JobRepository, Result};

use crate::handler::{JobContext, JobHandler, JobResult};

/// Configuration for the job worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Maximum number of concurrent jobs.
    pub concurrency: usize,
    /// Polling interval when the queue is empty.
    pub poll_interval: Duration,
    /// Heartbeat interval for active jobs.
    pub heartbeat_interval: Duration,
    /// Active jobs silent longer than this are considered stalled.
    pub stall_timeout: Duration,
    /// How often the maintenance task sweeps for stalled jobs.
    pub sweep_interval: Duration,
    /// How often retention cleanup runs.
    pub cleanup_interval: Duration,
    /// Whether to process jobs at all.
    pub enabled: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: defaults::QUEUE_CONCURRENCY,
            poll_interval: Duration::from_millis(defaults::QUEUE_POLL_INTERVAL_MS),
            heartbeat_interval: Duration::from_secs(defaults::QUEUE_HEARTBEAT_SECS),
            stall_timeout: Duration::from_secs(defaults::QUEUE_STALL_TIMEOUT_SECS),
            sweep_interval: Duration::from_secs(defaults::QUEUE_STALL_TIMEOUT_SECS / 2),
            cleanup_interval: Duration::from_secs(3600),
            enabled: true,
        }
    }
}

impl WorkerConfig {
    /// Set worker concurrency (min 1).
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Set the empty-queue polling interval.
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Enable or disable job processing.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }
}

/// Event emitted by the job worker.
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    JobStarted { job_id: Uuid },
    JobCompleted { job_id: Uuid },
    JobFailed { job_id: Uuid, error: String },
    WorkerStarted,
    WorkerStopped,
}

/// Handle for controlling a running worker.
pub struct WorkerHandle {
    shutdown_tx: mpsc::Sender<()>,
    event_rx: broadcast::Receiver<WorkerEvent>,
}

impl WorkerHandle {
    /// Signal the worker to shut down gracefully: stop claiming, drain
    /// in-flight jobs, then exit.
    pub async fn shutdown(&self) -> Result<()> {
        self.shutdown_tx
            .send(())
            .await
            .map_err(|_| ideaforge_core::Error::Internal("worker already stopped".into()))?;
        Ok(())
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_rx.resubscribe()
    }
}

/// Job worker that processes research jobs from the durable queue.
pub struct JobWorker {
    jobs: Arc<dyn JobRepository>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorker {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            jobs,
            handler,
            config,
            event_tx,
        }
    }

    /// Get a receiver for worker events.
    pub fn events(&self) -> broadcast::Receiver<WorkerEvent> {
        self.event_tx.subscribe()
    }

    /// Start the worker and its maintenance task; returns a control handle.
    pub fn start(self) -> WorkerHandle {
        let (shutdown_tx, mut shutdown_rx) = mpsc::channel(1);
        let event_rx = self.event_tx.subscribe();

        let worker = Arc::new(self);

        let maintenance = worker.clone();
        let maintenance_task = tokio::spawn(async move {
            maintenance.run_maintenance().await;
        });

        let claim_loop = worker.clone();
        tokio::spawn(async move {
            claim_loop.run(&mut shutdown_rx).await;
            maintenance_task.abort();
        });

        WorkerHandle {
            shutdown_tx,
            event_rx,
        }
    }

    /// The claim loop: claim up to `concurrency` jobs, process them
    /// concurrently, sleep only when the queue is empty.
    async fn run(&self, shutdown_rx: &mut mpsc::Receiver<()>) {
        if !self.config.enabled {
            info!("Job worker is disabled, not starting");
            return;
        }

        info!(
            concurrency = self.config.concurrency,
            poll_interval_ms = self.config.poll_interval.as_millis() as u64,
            "Job worker started"
        );
        let _ = self.event_tx.send(WorkerEvent::WorkerStarted);

        loop {
            if shutdown_rx.try_recv().is_ok() {
                info!("Job worker received shutdown signal");
                break;
            }

            let mut tasks = JoinSet::new();
            for _ in 0..self.config.concurrency {
                match self.claim_job().await {
                    Some(job) => {
                        let worker = self.worker_ref();
                        tasks.spawn(async move {
                            worker.execute_job(job).await;
                        });
                    }
                    None => break,
                }
            }

            if tasks.is_empty() {
                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Job worker received shutdown signal");
                        break;
                    }
                    _ = sleep(self.config.poll_interval) => {}
                }
            } else {
                debug!(claimed = tasks.len(), "Processing job batch");
                while let Some(result) = tasks.join_next().await {
                    if let Err(e) = result {
                        error!(error = ?e, "Job task panicked");
                    }
                }
            }
        }

        let _ = self.event_tx.send(WorkerEvent::WorkerStopped);
        info!("Job worker stopped");
    }

    /// Periodic stalled-job recovery and retention cleanup.
    async fn run_maintenance(&self) {
        let mut last_cleanup = Instant::now();
        loop {
            sleep(self.config.sweep_interval).await;

            if let Err(e) = self.jobs.recover_stalled(self.config.stall_timeout).await {
                error!(error = %e, "Stalled-job sweep failed");
            }

            if last_cleanup.elapsed() >= self.config.cleanup_interval {
                last_cleanup = Instant::now();
                match self.jobs.cleanup().await {
                    Ok(0) => {}
                    Ok(removed) => debug!(removed, "Job retention cleanup"),
                    Err(e) => error!(error = %e, "Job retention cleanup failed"),
                }
            }
        }
    }

    async fn claim_job(&self) -> Option<Job> {
        match self.jobs.claim_next().await {
            Ok(job) => job,
            Err(e) => {
                error!(error = %e, "Failed to claim job");
                None
            }
        }
    }

    fn worker_ref(&self) -> JobWorkerRef {
        JobWorkerRef {
            jobs: self.jobs.clone(),
            handler: self.handler.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
            event_tx: self.event_tx.clone(),
        }
    }
}

/// Reference bundle for executing a single job in a spawned task.
struct JobWorkerRef {
    jobs: Arc<dyn JobRepository>,
    handler: Arc<dyn JobHandler>,
    heartbeat_interval: Duration,
    event_tx: broadcast::Sender<WorkerEvent>,
}

impl JobWorkerRef {
    async fn execute_job(self, job: Job) {
        let start = Instant::now();
        let job_id = job.id;

        info!(job_id = %job_id, attempt = job.attempt, "Processing job");
        let _ = self.event_tx.send(WorkerEvent::JobStarted { job_id });

        // Heartbeat until the handler resolves; a crashed worker simply
        // stops heartbeating and the sweeper requeues the job.
        let heartbeat_jobs = self.jobs.clone();
        let heartbeat_interval = self.heartbeat_interval;
        let heartbeat = tokio::spawn(async move {
            loop {
                sleep(heartbeat_interval).await;
                if let Err(e) = heartbeat_jobs.heartbeat(job_id).await {
                    warn!(job_id = %job_id, error = %e, "Heartbeat failed");
                }
            }
        });

        let progress_jobs = self.jobs.clone();
        let ctx = JobContext::new(job).with_progress_callback(move |percent| {
            let progress_jobs = progress_jobs.clone();
            tokio::spawn(async move {
                let _ = progress_jobs.update_progress(job_id, percent).await;
            });
        });

        let result = self.handler.execute(ctx).await;
        heartbeat.abort();

        match result {
            JobResult::Success(result) => {
                if let Err(e) = self.jobs.complete(job_id, result).await {
                    error!(job_id = %job_id, error = %e, "Failed to mark job completed");
                } else {
                    info!(
                        job_id = %job_id,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job completed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobCompleted { job_id });
                }
            }
            JobResult::Failed(error) => {
                if let Err(e) = self.jobs.fail(job_id, &error).await {
                    error!(job_id = %job_id, error = %e, "Failed to mark job failed");
                } else {
                    warn!(
                        job_id = %job_id,
                        %error,
                        duration_ms = start.elapsed().as_millis() as u64,
                        "Job attempt failed"
                    );
                    let _ = self.event_tx.send(WorkerEvent::JobFailed { job_id, error });
                }
            }
        }
    }
}
