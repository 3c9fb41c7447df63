//! Job service: the inbound submit/status/cancel surface
//!
//! Validation happens synchronously here; nothing malformed or over-limit
//! ever enters the pipeline. Quota enforcement is the caller's concern
//! and must pass before `submit` is invoked.

use clipforge_common::config::LimitsConfig;
use clipforge_common::errors::{AppError, Result};
use clipforge_common::job::{Job, JobSubmission, ProcessingStatus};
use clipforge_common::metrics::record_job_submitted;
use clipforge_common::store::{CancelOutcome, JobStore};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::queue::JobSender;

pub struct JobService {
    store: Arc<dyn JobStore>,
    queue: JobSender,
    limits: LimitsConfig,
}

impl JobService {
    pub fn new(store: Arc<dyn JobStore>, queue: JobSender, limits: LimitsConfig) -> Self {
        Self {
            store,
            queue,
            limits,
        }
    }

    /// Validate and enqueue a new job.
    ///
    /// On queue backpressure the freshly created record is failed
    /// immediately, so no runnable entry outlives the rejection.
    pub async fn submit(&self, submission: JobSubmission) -> Result<Uuid> {
        validate(&submission, &self.limits)?;

        if let Some(existing) = self
            .store
            .find_active_by_hash(submission.user_id, &submission.input.content_hash)
            .await?
        {
            return Err(AppError::DuplicateActiveJob {
                job_id: existing.to_string(),
            });
        }

        let job = Job::from_submission(submission);
        let id = self.store.create(job).await?;

        if let Err(e) = self.queue.enqueue(id) {
            warn!(%id, error = %e, "enqueue rejected, failing job");
            self.store
                .record_failure(id, "submission queue full", None)
                .await?;
            self.store.transition(id, ProcessingStatus::Failed).await?;
            return Err(e);
        }
        self.store.transition(id, ProcessingStatus::Queued).await?;

        record_job_submitted();
        info!(%id, depth = self.queue.depth(), "job accepted");
        Ok(id)
    }

    /// Current job snapshot: status, progress, outputs so far, error detail
    pub async fn status(&self, id: Uuid) -> Result<Job> {
        self.store.get(id).await
    }

    /// Request cancellation; `false` when the job already reached a
    /// terminal state
    pub async fn cancel(&self, id: Uuid) -> Result<bool> {
        match self.store.request_cancel(id).await? {
            CancelOutcome::CancelledImmediately => {
                info!(%id, "queued job cancelled");
                Ok(true)
            }
            CancelOutcome::FlagSet => {
                info!(%id, "cancellation requested, honored at next stage boundary");
                Ok(true)
            }
            CancelOutcome::AlreadyTerminal => Ok(false),
        }
    }
}

fn validate(submission: &JobSubmission, limits: &LimitsConfig) -> Result<()> {
    let input = &submission.input;

    if input.original_filename.trim().is_empty() {
        return Err(AppError::Validation {
            message: "filename must not be empty".into(),
            field: Some("original_filename".into()),
        });
    }
    if input.content_hash.trim().is_empty() {
        return Err(AppError::Validation {
            message: "content hash must not be empty".into(),
            field: Some("content_hash".into()),
        });
    }

    let extension = input
        .original_filename
        .rsplit('.')
        .next()
        .unwrap_or_default()
        .to_lowercase();
    if !limits.allowed_formats.iter().any(|f| f == &extension) {
        return Err(AppError::UnsupportedFormat { format: extension });
    }

    let limit_bytes = limits.max_file_size_mb * 1024 * 1024;
    if input.size_bytes > limit_bytes {
        return Err(AppError::FileTooLarge {
            size: input.size_bytes,
            limit: limit_bytes,
        });
    }

    if input.duration_secs <= 0.0 {
        return Err(AppError::Validation {
            message: "duration must be positive".into(),
            field: Some("duration_secs".into()),
        });
    }
    if input.duration_secs > limits.max_duration_secs {
        return Err(AppError::DurationExceeded {
            duration_secs: input.duration_secs,
            limit_secs: limits.max_duration_secs,
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clipforge_common::job::{InputDescriptor, RequestedStages};
    use clipforge_common::store::InMemoryJobStore;

    use crate::queue::{job_queue, JobReceiver};

    fn service(capacity: usize) -> (JobService, Arc<InMemoryJobStore>, JobReceiver) {
        let store = Arc::new(InMemoryJobStore::new());
        let (tx, rx) = job_queue(capacity);
        let svc = JobService::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            tx,
            LimitsConfig::default(),
        );
        (svc, store, rx)
    }

    fn submission(filename: &str, size: u64, duration: f64, hash: &str) -> JobSubmission {
        JobSubmission {
            user_id: Uuid::new_v4(),
            input: InputDescriptor {
                source: format!("uploads/{filename}"),
                original_filename: filename.to_string(),
                size_bytes: size,
                content_hash: hash.to_string(),
                duration_secs: duration,
                resolution: None,
                language_hint: None,
            },
            stages: RequestedStages {
                subtitles: true,
                ..Default::default()
            },
            max_retries: None,
        }
    }

    #[tokio::test]
    async fn test_submit_creates_queued_job() {
        let (svc, store, _rx) = service(4);
        let id = svc
            .submit(submission("talk.mp4", 1_000_000, 300.0, "h1"))
            .await
            .unwrap();
        let job = store.get(id).await.unwrap();
        assert_eq!(job.status, ProcessingStatus::Queued);
    }

    #[tokio::test]
    async fn test_over_duration_is_rejected_without_a_job() {
        let (svc, store, _rx) = service(4);
        let err = svc
            .submit(submission("talk.mp4", 1_000_000, 10_000.0, "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DurationExceeded { .. }));
        // Nothing was created
        assert!(store
            .find_active_by_hash(Uuid::new_v4(), "h1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_unsupported_format_rejected() {
        let (svc, _store, _rx) = service(4);
        let err = svc
            .submit(submission("talk.exe", 1_000, 10.0, "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn test_oversize_file_rejected() {
        let (svc, _store, _rx) = service(4);
        let err = svc
            .submit(submission("talk.mp4", 600 * 1024 * 1024, 10.0, "h1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::FileTooLarge { .. }));
    }

    #[tokio::test]
    async fn test_duplicate_active_hash_rejected() {
        let (svc, _store, _rx) = service(4);
        let sub = submission("talk.mp4", 1_000, 60.0, "same-hash");
        let user = sub.user_id;
        svc.submit(sub).await.unwrap();

        let mut dup = submission("talk2.mp4", 1_000, 60.0, "same-hash");
        dup.user_id = user;
        let err = svc.submit(dup).await.unwrap_err();
        assert!(matches!(err, AppError::DuplicateActiveJob { .. }));
    }

    #[tokio::test]
    async fn test_queue_full_leaves_no_runnable_job() {
        let (svc, store, _rx) = service(1);
        svc.submit(submission("a.mp4", 1_000, 60.0, "h1"))
            .await
            .unwrap();
        let err = svc
            .submit(submission("b.mp4", 1_000, 60.0, "h2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::QueueFull { .. }));

        // The rejected record exists but is terminal, never runnable
        let user = Uuid::new_v4();
        assert!(store
            .find_active_by_hash(user, "h2")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cancel_terminal_job_returns_false() {
        let (svc, store, _rx) = service(4);
        let id = svc
            .submit(submission("talk.mp4", 1_000, 60.0, "h1"))
            .await
            .unwrap();
        assert!(svc.cancel(id).await.unwrap());
        // Second cancel: already terminal
        assert!(!svc.cancel(id).await.unwrap());
        assert_eq!(
            store.get(id).await.unwrap().status,
            ProcessingStatus::Cancelled
        );
    }
}
