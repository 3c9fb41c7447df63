//! Job store abstraction
//!
//! The store is the single shared mutable resource of the pipeline. It
//! enforces the entity invariants (legal status transitions, monotonic
//! progress while active, no writes after a terminal state) so that no
//! caller can corrupt a job record, and keeps cancellation atomic with the
//! current status.
//!
//! Durable backends live behind the same trait; the in-memory implementation
//! here backs the worker binary and every test.

use crate::errors::{AppError, Result};
use crate::job::{
    Chapter, ErrorDetail, Job, MetadataOutput, ProcessingStatus, StageWarning, ThumbnailRef,
    TranscriptOutput,
};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// A stage executor's output write, routed to the field the stage owns
#[derive(Clone, Debug)]
pub enum OutputWrite {
    Transcript(TranscriptOutput),
    Metadata(MetadataOutput),
    Thumbnails(Vec<ThumbnailRef>),
    Chapters(Vec<Chapter>),
    ExportManifest(String),
}

impl OutputWrite {
    pub fn field_name(&self) -> &'static str {
        match self {
            OutputWrite::Transcript(_) => "transcript",
            OutputWrite::Metadata(_) => "metadata",
            OutputWrite::Thumbnails(_) => "thumbnails",
            OutputWrite::Chapters(_) => "chapters",
            OutputWrite::ExportManifest(_) => "export_manifest",
        }
    }
}

/// Outcome of a cancellation request, decided atomically with the status
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Job had not started; it is now terminally cancelled
    CancelledImmediately,
    /// Job is mid-pipeline; the cooperative flag is set
    FlagSet,
    /// Job already reached a terminal state
    AlreadyTerminal,
}

/// Persistence contract for the job entity
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a freshly created job
    async fn create(&self, job: Job) -> Result<Uuid>;

    /// Snapshot of the current record
    async fn get(&self, id: Uuid) -> Result<Job>;

    /// Guarded status transition; updates lifecycle timestamps
    async fn transition(&self, id: Uuid, next: ProcessingStatus) -> Result<Job>;

    /// Monotonic progress update; lower values are clamped to the current
    /// value. Returns the effective progress.
    async fn set_progress(&self, id: Uuid, progress: u8) -> Result<u8>;

    /// Sub-stage label shown to callers alongside the status
    async fn set_current_step(&self, id: Uuid, step: &str) -> Result<()>;

    /// Write a stage output to the field the stage owns
    async fn write_output(&self, id: Uuid, output: OutputWrite) -> Result<()>;

    /// Record an optional-stage failure without failing the job
    async fn add_warning(&self, id: Uuid, warning: StageWarning) -> Result<()>;

    /// Record failure message and structured detail (status unchanged)
    async fn record_failure(
        &self,
        id: Uuid,
        message: &str,
        detail: Option<ErrorDetail>,
    ) -> Result<()>;

    /// Bump the stage retry counter; returns the new count
    async fn increment_retry(&self, id: Uuid) -> Result<u32>;

    /// Request cooperative cancellation, atomic with the current status
    async fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome>;

    /// Whether the cooperative cancellation flag is set
    async fn cancel_requested(&self, id: Uuid) -> Result<bool>;

    /// Find a non-terminal job for the same user and content hash
    async fn find_active_by_hash(&self, user_id: Uuid, hash: &str) -> Result<Option<Uuid>>;

    /// Add actual spend to the job's accounting
    async fn add_cost(&self, id: Uuid, usd: f64) -> Result<()>;
}

/// In-memory job store
pub struct InMemoryJobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryJobStore {
    pub fn new() -> Self {
        Self {
            jobs: RwLock::new(HashMap::new()),
        }
    }

    fn not_found(id: Uuid) -> AppError {
        AppError::JobNotFound { id: id.to_string() }
    }
}

impl Default for InMemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for InMemoryJobStore {
    async fn create(&self, job: Job) -> Result<Uuid> {
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or_else(|| Self::not_found(id))
    }

    async fn transition(&self, id: Uuid, next: ProcessingStatus) -> Result<Job> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        if !job.status.can_transition_to(next) {
            return Err(AppError::InvalidTransition {
                from: job.status.to_string(),
                to: next.to_string(),
            });
        }

        let now = Utc::now();
        job.status = next;
        job.updated_at = now;
        job.current_step = Some(next.label().to_string());

        if next == ProcessingStatus::Processing && job.started_at.is_none() {
            job.started_at = Some(now);
        }
        if next.is_terminal() {
            job.completed_at = Some(now);
            if let Some(started) = job.started_at {
                job.processing_time_secs = Some((now - started).num_milliseconds() as f64 / 1000.0);
            }
            if next == ProcessingStatus::Completed {
                job.progress = 100;
            }
        }

        Ok(job.clone())
    }

    async fn set_progress(&self, id: Uuid, progress: u8) -> Result<u8> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        if job.status.is_terminal() {
            return Ok(job.progress);
        }

        let progress = progress.min(100);
        if progress > job.progress {
            job.progress = progress;
            job.updated_at = Utc::now();
        }
        Ok(job.progress)
    }

    async fn set_current_step(&self, id: Uuid, step: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.current_step = Some(step.to_string());
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn write_output(&self, id: Uuid, output: OutputWrite) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        if job.status.is_terminal() {
            return Err(AppError::InvalidTransition {
                from: job.status.to_string(),
                to: format!("write:{}", output.field_name()),
            });
        }

        match output {
            OutputWrite::Transcript(t) => job.outputs.transcript = Some(t),
            OutputWrite::Metadata(m) => job.outputs.metadata = Some(m),
            OutputWrite::Thumbnails(t) => job.outputs.thumbnails = t,
            OutputWrite::Chapters(c) => job.outputs.chapters = c,
            OutputWrite::ExportManifest(key) => job.outputs.export_manifest = Some(key),
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn add_warning(&self, id: Uuid, warning: StageWarning) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.warnings.push(warning);
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn record_failure(
        &self,
        id: Uuid,
        message: &str,
        detail: Option<ErrorDetail>,
    ) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.error_message = Some(message.to_string());
        if detail.is_some() {
            job.error_detail = detail;
        }
        job.updated_at = Utc::now();
        Ok(())
    }

    async fn increment_retry(&self, id: Uuid) -> Result<u32> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.retry_count += 1;
        job.updated_at = Utc::now();
        Ok(job.retry_count)
    }

    async fn request_cancel(&self, id: Uuid) -> Result<CancelOutcome> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;

        if job.status.is_terminal() {
            return Ok(CancelOutcome::AlreadyTerminal);
        }

        let now = Utc::now();
        match job.status {
            ProcessingStatus::Pending | ProcessingStatus::Queued => {
                job.status = ProcessingStatus::Cancelled;
                job.cancel_requested = true;
                job.completed_at = Some(now);
                job.current_step = Some(ProcessingStatus::Cancelled.label().to_string());
                job.updated_at = now;
                Ok(CancelOutcome::CancelledImmediately)
            }
            _ => {
                job.cancel_requested = true;
                job.updated_at = now;
                Ok(CancelOutcome::FlagSet)
            }
        }
    }

    async fn cancel_requested(&self, id: Uuid) -> Result<bool> {
        Ok(self
            .jobs
            .read()
            .await
            .get(&id)
            .ok_or_else(|| Self::not_found(id))?
            .cancel_requested)
    }

    async fn find_active_by_hash(&self, user_id: Uuid, hash: &str) -> Result<Option<Uuid>> {
        Ok(self
            .jobs
            .read()
            .await
            .values()
            .find(|j| j.user_id == user_id && j.input.content_hash == hash && !j.is_terminal())
            .map(|j| j.id))
    }

    async fn add_cost(&self, id: Uuid, usd: f64) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or_else(|| Self::not_found(id))?;
        job.cost.actual_usd += usd;
        job.updated_at = Utc::now();
        Ok(())
    }
}
