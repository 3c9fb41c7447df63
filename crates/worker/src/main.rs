//! ClipForge Worker
//!
//! Runs the job pipeline end to end:
//! 1. Accepts validated submissions into the bounded queue
//! 2. A fixed pool of workers dequeues jobs under per-job leases
//! 3. The orchestrator drives each job through its stages
//! 4. Progress and lifecycle events go to the configured publisher

mod lease;
mod pool;
mod queue;
mod service;

use clipforge_common::{
    config::AppConfig,
    events::{BroadcastPublisher, SharedPublisher},
    metrics::register_metrics,
    storage::{LocalStorage, StorageService},
    store::{InMemoryJobStore, JobStore},
    VERSION,
};
use clipforge_pipeline::{Orchestrator, SyntheticInspector};
use clipforge_providers::adapters::build_gateway;
use metrics_exporter_prometheus::PrometheusBuilder;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::lease::LeaseRegistry;
use crate::pool::WorkerPool;
use crate::queue::job_queue;
use crate::service::JobService;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .json()
        .init();

    info!("Starting ClipForge Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    // Metrics exporter
    register_metrics();
    if config.observability.metrics_port > 0 {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port))
            .install()?;
        info!(port = config.observability.metrics_port, "Metrics exporter listening");
    }

    // Shared collaborators
    let store: Arc<dyn JobStore> = Arc::new(InMemoryJobStore::new());
    let storage: Arc<dyn StorageService> =
        Arc::new(LocalStorage::new(&config.storage.root_dir));
    let gateway = Arc::new(build_gateway(&config.providers, Arc::clone(&storage)));
    // Frame extraction binds an external media tool in production; the
    // synthetic inspector keeps the worker self-contained until then.
    let inspector = Arc::new(SyntheticInspector::new(0.0));

    let publisher_impl = Arc::new(BroadcastPublisher::new(256));
    let publisher: SharedPublisher = publisher_impl.clone();

    let orchestrator = Arc::new(Orchestrator::new(
        Arc::clone(&store),
        gateway,
        Arc::clone(&storage),
        inspector,
        publisher,
        config.pipeline.clone(),
    ));

    let (sender, receiver) = job_queue(config.worker.queue_capacity);
    let service = JobService::new(Arc::clone(&store), sender, config.limits.clone());

    // Check for command line arguments for testing
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "test" {
        return run_test_job(&service, &store, storage, &orchestrator).await;
    }

    info!(
        workers = config.worker.pool_size,
        queue_capacity = config.worker.queue_capacity,
        "Worker pool starting"
    );
    let pool = WorkerPool::start(
        config.worker.pool_size,
        Arc::new(receiver),
        Arc::clone(&store),
        orchestrator,
        LeaseRegistry::new(),
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received, draining in-flight jobs");
    pool.shutdown(config.shutdown_timeout()).await;
    info!("ClipForge worker stopped");
    Ok(())
}

/// Test mode: submit one synthetic job and print the outcome.
///
/// Useful for verifying provider credentials and chain configuration
/// without standing up the full service.
async fn run_test_job(
    service: &JobService,
    store: &Arc<dyn JobStore>,
    storage: Arc<dyn StorageService>,
    orchestrator: &Orchestrator,
) -> anyhow::Result<()> {
    use clipforge_common::job::{InputDescriptor, JobSubmission, RequestedStages};
    use clipforge_common::storage::sha256_hex;

    info!("Running in test mode...");

    let bytes = b"clipforge test payload".to_vec();
    let stored = storage.store("uploads", "mp3", &bytes).await?;

    let submission = JobSubmission {
        user_id: uuid::Uuid::new_v4(),
        input: InputDescriptor {
            source: stored.key.clone(),
            original_filename: "test.mp3".into(),
            size_bytes: bytes.len() as u64,
            content_hash: sha256_hex(&bytes),
            duration_secs: 30.0,
            resolution: None,
            language_hint: Some("en".into()),
        },
        stages: RequestedStages {
            subtitles: true,
            thumbnails: false,
            summary: true,
            chapters: false,
        },
        max_retries: None,
    };

    let id = service.submit(submission).await?;
    println!("Submitted test job {id}");

    // Run it inline rather than through the pool
    match orchestrator.run(id).await {
        Ok(status) => {
            let job = store.get(id).await?;
            println!("Job finished: {status}");
            if let Some(transcript) = &job.outputs.transcript {
                println!("  Transcript provider: {}", transcript.provider);
                println!("  Detected language:   {}", transcript.detected_language);
            }
            if let Some(metadata) = &job.outputs.metadata {
                println!("  Titles: {:?}", metadata.titles);
            }
            if let Some(message) = &job.error_message {
                println!("  Error: {message}");
            }
        }
        Err(e) => {
            error!(error = %e, "Test job failed to run");
            eprintln!("Error: {e}");
            std::process::exit(1);
        }
    }

    Ok(())
}
