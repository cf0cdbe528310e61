//! ideaforge-api — HTTP API server for the ideaforge research engine.
//!
//! Single-binary deployment: the HTTP server and the research worker pool
//! run in one process, sharing the database pool and provider registry.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ideaforge_api::{build_router, AppState};
use ideaforge_core::{defaults, AppConfig, Error, Result};
use ideaforge_db::{Database, JobQueueConfig, PoolConfig};
use ideaforge_inference::{EmbeddingClient, OpenAiBackend, OpenAiConfig, ProviderRegistry};
use ideaforge_jobs::{JobWorker, ResearchJobHandler, WorkerConfig};
use ideaforge_pipeline::{DeepeningEngine, PipelineSettings, ResearchEngine};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ideaforge=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        port = config.server.port,
        fast_mode = config.providers.fast_mode,
        "Starting ideaforge-api"
    );

    // Database, with the embedding persistence mode detected at startup.
    let db = Database::connect_with_config(
        &config.database.url,
        PoolConfig {
            max_connections: config.database.pool_max,
            idle_timeout: config.database.idle_timeout,
            ..PoolConfig::default()
        },
        JobQueueConfig {
            max_attempts: config.queue.max_attempts,
            backoff_base: config.queue.backoff_base,
            ..JobQueueConfig::default()
        },
    )
    .await?;

    // Providers and the embedding client share the gateway credentials.
    let registry = Arc::new(ProviderRegistry::from_config(&config.providers)?);
    let embed_backend = OpenAiBackend::new(OpenAiConfig {
        base_url: config.providers.gateway_base_url.clone(),
        api_key: Some(config.providers.gateway_api_key.clone()),
        embed_model: config.embedding.model.clone(),
        embed_dimension: config.embedding.dimensions,
        ..OpenAiConfig::default()
    })?;
    let embedder = Arc::new(EmbeddingClient::new(
        Arc::new(embed_backend),
        config.embedding.batch_size,
    ));

    let research = Arc::new(ResearchEngine::new(
        Arc::new(db.sessions.clone()),
        Arc::new(db.ideas.clone()),
        registry.clone(),
        embedder,
        PipelineSettings {
            cluster_threshold: config.clustering.cluster_threshold,
            dedup_threshold: config.clustering.dedup_threshold,
        },
    ));
    let deepening = Arc::new(DeepeningEngine::from_research(
        &research,
        Arc::new(db.deepening.clone()),
    ));

    // Worker pool driving the same pipeline off the durable queue.
    let jobs: Arc<dyn ideaforge_core::JobRepository> = Arc::new(db.jobs.clone());
    let worker = JobWorker::new(
        jobs.clone(),
        Arc::new(ResearchJobHandler::new(research.clone())),
        WorkerConfig::default().with_concurrency(config.queue.concurrency),
    );
    let worker_handle = worker.start();

    let state = AppState {
        db,
        research,
        deepening,
        jobs,
        api_key: Arc::from(config.server.api_key.as_str()),
        rate_limiter: ideaforge_api::auth::build_rate_limiter(
            config.server.rate_limit_requests,
            config.server.rate_limit_window,
        ),
        started_at: Instant::now(),
    };

    let app = build_router(state);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(Error::Io)?;
    info!(%addr, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(Error::Io)?;

    info!("HTTP server drained, stopping worker");
    if let Err(e) = worker_handle.shutdown().await {
        warn!(error = %e, "Worker shutdown signal failed");
    }

    Ok(())
}

/// Resolves on SIGINT or SIGTERM. A watchdog then bounds the drain: if the
/// process is still up after the grace period, it exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(
        grace_secs = defaults::SHUTDOWN_GRACE_SECS,
        "Shutdown signal received, draining"
    );
    tokio::spawn(async {
        tokio::time::sleep(Duration::from_secs(defaults::SHUTDOWN_GRACE_SECS)).await;
        warn!("Drain grace period elapsed, forcing exit");
        std::process::exit(0);
    });
}
