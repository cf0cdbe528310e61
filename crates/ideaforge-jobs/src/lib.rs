//! # ideaforge-jobs
//!
//! Worker pool and job handlers driving the research pipeline off the
//! durable queue.

pub mod handler;
pub mod worker;

pub use handler::{JobContext, JobHandler, JobResult, NoOpHandler, ResearchJobHandler};
pub use worker::{JobWorker, WorkerConfig, WorkerEvent, WorkerHandle};
