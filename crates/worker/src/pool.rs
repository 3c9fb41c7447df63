//! Fixed-width worker pool
//!
//! Each worker dequeues one job id, takes the processing lease, and runs
//! the orchestrator to a terminal state before accepting the next job.
//! Shutdown is signalled over a watch channel and observed between jobs,
//! never mid-pipeline.

use clipforge_common::metrics::set_workers_busy;
use clipforge_common::store::JobStore;
use clipforge_pipeline::Orchestrator;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::lease::LeaseRegistry;
use crate::queue::JobReceiver;

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

struct WorkerShared {
    receiver: Arc<JobReceiver>,
    store: Arc<dyn JobStore>,
    orchestrator: Arc<Orchestrator>,
    leases: Arc<LeaseRegistry>,
    busy: AtomicUsize,
}

impl WorkerPool {
    pub fn start(
        size: usize,
        receiver: Arc<JobReceiver>,
        store: Arc<dyn JobStore>,
        orchestrator: Arc<Orchestrator>,
        leases: Arc<LeaseRegistry>,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let shared = Arc::new(WorkerShared {
            receiver,
            store,
            orchestrator,
            leases,
            busy: AtomicUsize::new(0),
        });

        let handles = (0..size)
            .map(|worker_id| {
                let shared = Arc::clone(&shared);
                let shutdown = shutdown_rx.clone();
                tokio::spawn(worker_loop(worker_id, shared, shutdown))
            })
            .collect();

        info!(workers = size, "worker pool started");
        Self {
            handles,
            shutdown_tx,
        }
    }

    /// Signal shutdown and wait up to `grace` for in-flight jobs
    pub async fn shutdown(self, grace: Duration) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if tokio::time::timeout(grace, handle).await.is_err() {
                warn!("worker did not stop within the grace period");
            }
        }
        info!("worker pool stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    shared: Arc<WorkerShared>,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "worker started");
    loop {
        let job_id = tokio::select! {
            _ = shutdown.changed() => break,
            maybe = shared.receiver.recv() => match maybe {
                Some(id) => id,
                // Queue closed and drained
                None => break,
            },
        };

        process_one(worker_id, &shared, job_id).await;
    }
    debug!(worker_id, "worker stopped");
}

async fn process_one(worker_id: usize, shared: &WorkerShared, job_id: Uuid) {
    let job = match shared.store.get(job_id).await {
        Ok(job) => job,
        Err(e) => {
            warn!(worker_id, %job_id, error = %e, "dequeued unknown job, dropping");
            return;
        }
    };

    // A job cancelled while queued is already terminal; drop the entry
    // without invoking any stage executor.
    if job.is_terminal() {
        debug!(worker_id, %job_id, status = %job.status, "dequeued terminal job, dropping");
        return;
    }

    let Some(_lease) = shared.leases.acquire(job_id) else {
        warn!(worker_id, %job_id, "lease already held, dropping duplicate entry");
        return;
    };

    let busy = shared.busy.fetch_add(1, Ordering::SeqCst) + 1;
    set_workers_busy(busy);

    match shared.orchestrator.run(job_id).await {
        Ok(status) => info!(worker_id, %job_id, status = %status, "job finished"),
        Err(e) => error!(worker_id, %job_id, error = %e, "orchestrator error"),
    }

    let busy = shared.busy.fetch_sub(1, Ordering::SeqCst) - 1;
    set_workers_busy(busy);
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_common::config::{ChainConfig, ChainsConfig, PipelineConfig};
    use clipforge_common::events::NullPublisher;
    use clipforge_common::job::{
        InputDescriptor, Job, JobSubmission, ProcessingStatus, RequestedStages,
    };
    use clipforge_common::storage::InMemoryStorage;
    use clipforge_common::store::InMemoryJobStore;
    use clipforge_pipeline::SyntheticInspector;
    use clipforge_providers::gateway::RetryPolicy;
    use clipforge_providers::mock::{MockTextGenerator, MockTranscriber};
    use clipforge_providers::ProviderGateway;
    use std::collections::HashMap;

    use crate::queue::job_queue;

    fn submission(name: &str) -> JobSubmission {
        JobSubmission {
            user_id: Uuid::new_v4(),
            input: InputDescriptor {
                source: format!("uploads/{name}"),
                original_filename: name.to_string(),
                size_bytes: 1_000_000,
                content_hash: name.to_string(),
                duration_secs: 120.0,
                resolution: None,
                language_hint: None,
            },
            stages: RequestedStages {
                subtitles: true,
                thumbnails: false,
                summary: false,
                chapters: false,
            },
            max_retries: None,
        }
    }

    fn gateway() -> ProviderGateway {
        let chains = ChainsConfig {
            transcription: ChainConfig {
                default: vec!["mock".into()],
                by_language: HashMap::new(),
            },
            text: ChainConfig {
                default: vec!["mock".into()],
                by_language: HashMap::new(),
            },
            image: ChainConfig {
                default: vec![],
                by_language: HashMap::new(),
            },
        };
        ProviderGateway::builder(chains)
            .transcriber(
                Arc::new(MockTranscriber::succeeding("mock", "a long enough transcript")),
                RetryPolicy::default(),
            )
            .text_generator(
                Arc::new(MockTextGenerator::succeeding(
                    "mock",
                    "1. A Perfectly Reasonable Title\n2. Another Reasonable Title",
                )),
                RetryPolicy::default(),
            )
            .build()
    }

    #[tokio::test]
    async fn test_pool_processes_concurrent_jobs_independently() {
        let store = Arc::new(InMemoryJobStore::new());
        let (tx, rx) = job_queue(8);

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(gateway()),
            Arc::new(InMemoryStorage::new()),
            Arc::new(SyntheticInspector::new(120.0)),
            Arc::new(NullPublisher),
            PipelineConfig::default(),
        ));

        let mut ids = Vec::new();
        for name in ["a.mp4", "b.mp4"] {
            let job = Job::from_submission(submission(name));
            let id = store.create(job).await.unwrap();
            store.transition(id, ProcessingStatus::Queued).await.unwrap();
            tx.enqueue(id).unwrap();
            ids.push(id);
        }

        let pool = WorkerPool::start(
            2,
            Arc::new(rx),
            Arc::clone(&store) as Arc<dyn JobStore>,
            orchestrator,
            LeaseRegistry::new(),
        );

        // Wait for both jobs to settle
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(10)).await;
            let mut done = true;
            for id in &ids {
                done &= store.get(*id).await.unwrap().is_terminal();
            }
            if done {
                break;
            }
        }
        pool.shutdown(Duration::from_secs(1)).await;

        for id in ids {
            let job = store.get(id).await.unwrap();
            assert_eq!(job.status, ProcessingStatus::Completed);
            assert_eq!(job.progress, 100);
            assert!(job.outputs.transcript.is_some());
        }
    }

    #[tokio::test]
    async fn test_terminal_job_is_dropped_at_dequeue() {
        let store = Arc::new(InMemoryJobStore::new());
        let (tx, rx) = job_queue(4);

        let transcriber = Arc::new(MockTranscriber::succeeding("mock", "unused"));
        let chains = ChainsConfig {
            transcription: ChainConfig {
                default: vec!["mock".into()],
                by_language: HashMap::new(),
            },
            text: ChainConfig {
                default: vec![],
                by_language: HashMap::new(),
            },
            image: ChainConfig {
                default: vec![],
                by_language: HashMap::new(),
            },
        };
        let gw = ProviderGateway::builder(chains)
            .transcriber(transcriber.clone(), RetryPolicy::default())
            .build();

        let orchestrator = Arc::new(Orchestrator::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(gw),
            Arc::new(InMemoryStorage::new()),
            Arc::new(SyntheticInspector::new(120.0)),
            Arc::new(NullPublisher),
            PipelineConfig::default(),
        ));

        let job = Job::from_submission(submission("c.mp4"));
        let id = store.create(job).await.unwrap();
        store.transition(id, ProcessingStatus::Queued).await.unwrap();
        tx.enqueue(id).unwrap();
        // Cancelled before any worker exists
        store.request_cancel(id).await.unwrap();

        let pool = WorkerPool::start(
            1,
            Arc::new(rx),
            Arc::clone(&store) as Arc<dyn JobStore>,
            orchestrator,
            LeaseRegistry::new(),
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
        pool.shutdown(Duration::from_secs(1)).await;

        assert_eq!(
            store.get(id).await.unwrap().status,
            ProcessingStatus::Cancelled
        );
        assert_eq!(transcriber.calls(), 0);
    }
}
