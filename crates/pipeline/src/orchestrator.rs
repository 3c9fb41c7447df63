//! Pipeline orchestrator
//!
//! Owns the job state machine: builds the stage plan from the requested
//! flags, runs stages strictly in order, checks the cooperative
//! cancellation flag at every stage boundary, applies progress from the
//! weight plan, and decides job-level consequences of stage failures.
//! Required-stage failures retry the whole stage up to the job's retry
//! budget; optional-stage failures become warnings and the job continues.

use chrono::Utc;
use clipforge_common::config::PipelineConfig;
use clipforge_common::errors::Result;
use clipforge_common::events::{EventKind, JobEvent, SharedPublisher};
use clipforge_common::job::{ProcessingStatus, RequestedStages, StageWarning};
use clipforge_common::metrics::{record_job_finished, record_stage};
use clipforge_common::storage::StorageService;
use clipforge_common::store::JobStore;
use clipforge_providers::ProviderGateway;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::media::MediaInspector;
use crate::progress::ProgressPlan;
use crate::stage::{Stage, StageContext, StageError, StageKind, StageOutput};
use crate::stages::{ChapterStage, ExportStage, ThumbnailStage, TitleStage, TranscriptionStage};

pub struct Orchestrator {
    store: Arc<dyn JobStore>,
    gateway: Arc<ProviderGateway>,
    storage: Arc<dyn StorageService>,
    inspector: Arc<dyn MediaInspector>,
    publisher: SharedPublisher,
    config: PipelineConfig,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn JobStore>,
        gateway: Arc<ProviderGateway>,
        storage: Arc<dyn StorageService>,
        inspector: Arc<dyn MediaInspector>,
        publisher: SharedPublisher,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            gateway,
            storage,
            inspector,
            publisher,
            config,
        }
    }

    /// Drive one job from `Queued` to a terminal state.
    ///
    /// The caller must hold the job's processing lease; this is the only
    /// writer of the job record while it runs.
    #[instrument(skip(self), fields(job_id = %job_id))]
    pub async fn run(&self, job_id: Uuid) -> Result<ProcessingStatus> {
        let job = self.store.get(job_id).await?;

        // A queued job cancelled before dequeue is already terminal
        if job.is_terminal() {
            info!(status = %job.status, "job already terminal, nothing to run");
            return Ok(job.status);
        }

        let started = Instant::now();
        self.store
            .transition(job_id, ProcessingStatus::Processing)
            .await?;

        let plan = stage_plan(&job.stages);
        let kinds: Vec<StageKind> = plan.iter().map(|s| s.kind()).collect();
        let progress = ProgressPlan::new(&self.config.weights, &kinds);

        for stage in &plan {
            let kind = stage.kind();

            // Cooperative cancellation, boundary check only
            if self.store.cancel_requested(job_id).await? {
                return self.finish_cancelled(job_id, started).await;
            }

            if let Some(status) = kind.status() {
                self.store.transition(job_id, status).await?;
            }
            self.store.set_current_step(job_id, kind.label()).await?;
            self.publish(job_id, EventKind::StageStarted, Some(kind)).await;

            match self.run_stage(job_id, stage.as_ref(), kind).await? {
                StageVerdict::Continue => {}
                StageVerdict::JobFailed => {
                    return self.finish_failed(job_id, started).await;
                }
            }

            let pct = progress.after(kind);
            let effective = self.store.set_progress(job_id, pct).await?;
            self.publish_progress(job_id, effective).await;
            self.publish(job_id, EventKind::StageCompleted, Some(kind)).await;
        }

        let job = self
            .store
            .transition(job_id, ProcessingStatus::Completed)
            .await?;
        self.publish(job_id, EventKind::JobCompleted, None).await;
        record_job_finished("completed", started.elapsed().as_secs_f64());
        info!(
            elapsed_secs = started.elapsed().as_secs_f64(),
            warnings = job.warnings.len(),
            "job completed"
        );
        Ok(ProcessingStatus::Completed)
    }

    /// Execute one stage with the whole-stage retry loop
    async fn run_stage(
        &self,
        job_id: Uuid,
        stage: &dyn Stage,
        kind: StageKind,
    ) -> Result<StageVerdict> {
        loop {
            let snapshot = self.store.get(job_id).await?;
            let max_retries = snapshot.max_retries;
            let ctx = StageContext {
                job: snapshot,
                gateway: Arc::clone(&self.gateway),
                storage: Arc::clone(&self.storage),
                inspector: Arc::clone(&self.inspector),
                config: self.config.clone(),
            };

            let stage_start = Instant::now();
            match stage.execute(&ctx).await {
                Ok(output) => {
                    record_stage(kind.label(), "success", stage_start.elapsed().as_secs_f64());
                    self.apply_output(job_id, kind, output).await?;
                    return Ok(StageVerdict::Continue);
                }
                Err(StageError::Skipped(reason)) => {
                    record_stage(kind.label(), "skipped", stage_start.elapsed().as_secs_f64());
                    info!(stage = %kind, reason, "stage skipped");
                    return Ok(StageVerdict::Continue);
                }
                Err(err) if kind.is_optional() => {
                    record_stage(kind.label(), "warning", stage_start.elapsed().as_secs_f64());
                    warn!(stage = %kind, error = %err, "optional stage failed, continuing");
                    self.store
                        .add_warning(
                            job_id,
                            StageWarning {
                                stage: kind.label().to_string(),
                                message: err.to_string(),
                                at: Utc::now(),
                            },
                        )
                        .await?;
                    return Ok(StageVerdict::Continue);
                }
                Err(err) if err.is_retryable() => {
                    let count = self.store.increment_retry(job_id).await?;
                    record_stage(kind.label(), "retry", stage_start.elapsed().as_secs_f64());
                    if count > max_retries {
                        warn!(stage = %kind, retry_count = count, "retry budget exhausted");
                        self.store
                            .record_failure(job_id, &err.to_string(), Some(err.detail(kind)))
                            .await?;
                        return Ok(StageVerdict::JobFailed);
                    }
                    warn!(
                        stage = %kind,
                        retry_count = count,
                        max_retries,
                        error = %err,
                        "required stage failed, retrying"
                    );
                }
                Err(err) => {
                    record_stage(kind.label(), "failure", stage_start.elapsed().as_secs_f64());
                    self.store
                        .record_failure(job_id, &err.to_string(), Some(err.detail(kind)))
                        .await?;
                    return Ok(StageVerdict::JobFailed);
                }
            }
        }
    }

    /// Write stage output, provider-fallback warnings, and cost
    async fn apply_output(
        &self,
        job_id: Uuid,
        kind: StageKind,
        output: StageOutput,
    ) -> Result<()> {
        let failed: Vec<String> = output
            .failed_attempts()
            .map(|a| format!("{} ({})", a.provider, a.outcome))
            .collect();
        if !failed.is_empty() {
            self.store
                .add_warning(
                    job_id,
                    StageWarning {
                        stage: kind.label().to_string(),
                        message: format!("provider attempts failed: {}", failed.join(", ")),
                        at: Utc::now(),
                    },
                )
                .await?;
        }

        if output.cost_usd > 0.0 {
            self.store.add_cost(job_id, output.cost_usd).await?;
        }

        if let Some(write) = output.write {
            self.store.write_output(job_id, write).await?;
        }
        Ok(())
    }

    async fn finish_cancelled(&self, job_id: Uuid, started: Instant) -> Result<ProcessingStatus> {
        self.store
            .transition(job_id, ProcessingStatus::Cancelled)
            .await?;
        self.publish(job_id, EventKind::JobCancelled, None).await;
        record_job_finished("cancelled", started.elapsed().as_secs_f64());
        info!("job cancelled at stage boundary");
        Ok(ProcessingStatus::Cancelled)
    }

    async fn finish_failed(&self, job_id: Uuid, started: Instant) -> Result<ProcessingStatus> {
        self.store
            .transition(job_id, ProcessingStatus::Failed)
            .await?;
        self.publish(job_id, EventKind::JobFailed, None).await;
        record_job_finished("failed", started.elapsed().as_secs_f64());
        Ok(ProcessingStatus::Failed)
    }

    async fn publish(&self, job_id: Uuid, kind: EventKind, stage: Option<StageKind>) {
        if let Ok(job) = self.store.get(job_id).await {
            let mut event = JobEvent::new(job_id, kind, job.status, job.progress);
            if let Some(stage) = stage {
                event = event.with_stage(stage.label());
            }
            if let Some(message) = &job.error_message {
                event = event.with_message(message.clone());
            }
            self.publisher.publish(event);
        }
    }

    async fn publish_progress(&self, job_id: Uuid, progress: u8) {
        if let Ok(job) = self.store.get(job_id).await {
            self.publisher
                .publish(JobEvent::new(job_id, EventKind::Progress, job.status, progress));
        }
    }
}

enum StageVerdict {
    Continue,
    JobFailed,
}

/// Configuration-driven stage plan for one job's requested flags
fn stage_plan(stages: &RequestedStages) -> Vec<Box<dyn Stage>> {
    let mut plan: Vec<Box<dyn Stage>> = Vec::with_capacity(5);
    if stages.subtitles {
        plan.push(Box::new(TranscriptionStage));
        plan.push(Box::new(TitleStage));
    }
    if stages.thumbnails {
        plan.push(Box::new(ThumbnailStage));
    }
    if stages.chapters && stages.subtitles {
        plan.push(Box::new(ChapterStage));
    }
    plan.push(Box::new(ExportStage));
    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use clipforge_common::config::{ChainConfig, ChainsConfig};
    use clipforge_common::errors::AppError;
    use clipforge_common::events::NullPublisher;
    use clipforge_common::job::{InputDescriptor, Job, JobSubmission, WordTiming};
    use clipforge_common::storage::InMemoryStorage;
    use clipforge_common::store::{CancelOutcome, InMemoryJobStore};
    use clipforge_providers::error::ProviderError;
    use clipforge_providers::gateway::RetryPolicy;
    use clipforge_providers::mock::{MockImageGenerator, MockTextGenerator, MockTranscriber};
    use clipforge_providers::transcribe::Transcript;
    use crate::media::{Frame, MediaInfo, SyntheticInspector};
    use std::collections::HashMap;
    use std::time::Duration;

    const TITLES_TEXT: &str =
        "1. Building a Resilient Media Pipeline\n2. Lessons From Flaky Providers";

    fn policy() -> RetryPolicy {
        RetryPolicy {
            timeout: Duration::from_secs(2),
            max_attempts: 2,
            backoff_base: Duration::from_millis(1),
        }
    }

    fn chains(transcribers: Vec<&str>) -> ChainsConfig {
        ChainsConfig {
            transcription: ChainConfig {
                default: transcribers.into_iter().map(String::from).collect(),
                by_language: HashMap::new(),
            },
            text: ChainConfig {
                default: vec!["text".into()],
                by_language: HashMap::new(),
            },
            image: ChainConfig {
                default: vec!["image".into()],
                by_language: HashMap::new(),
            },
        }
    }

    fn submission(subtitles: bool, thumbnails: bool, chapters: bool) -> JobSubmission {
        JobSubmission {
            user_id: Uuid::new_v4(),
            input: InputDescriptor {
                source: "uploads/demo.mp4".into(),
                original_filename: "demo.mp4".into(),
                size_bytes: 10_000_000,
                content_hash: "deadbeef".into(),
                duration_secs: 600.0,
                resolution: Some("1920x1080".into()),
                language_hint: None,
            },
            stages: clipforge_common::job::RequestedStages {
                subtitles,
                thumbnails,
                summary: false,
                chapters,
            },
            max_retries: None,
        }
    }

    async fn queued_job(store: &InMemoryJobStore, submission: JobSubmission) -> Uuid {
        let id = store.create(Job::from_submission(submission)).await.unwrap();
        store
            .transition(id, ProcessingStatus::Queued)
            .await
            .unwrap();
        id
    }

    fn orchestrator(
        store: Arc<InMemoryJobStore>,
        gateway: ProviderGateway,
        config: PipelineConfig,
    ) -> Orchestrator {
        Orchestrator::new(
            store,
            Arc::new(gateway),
            Arc::new(InMemoryStorage::new()),
            Arc::new(SyntheticInspector::new(600.0)),
            Arc::new(NullPublisher),
            config,
        )
    }

    struct BrokenInspector;

    #[async_trait]
    impl crate::media::MediaInspector for BrokenInspector {
        async fn probe(&self, _source: &str) -> clipforge_common::errors::Result<MediaInfo> {
            Err(AppError::Internal {
                message: "probe unavailable".into(),
            })
        }

        async fn extract_frames(
            &self,
            _source: &str,
            _count: usize,
        ) -> clipforge_common::errors::Result<Vec<Frame>> {
            Err(AppError::Internal {
                message: "extraction unavailable".into(),
            })
        }
    }

    #[tokio::test]
    async fn test_fallback_provider_output_is_recorded() {
        // Primary transcriber times out through its attempt cap, secondary
        // succeeds; the job completes with the secondary's transcript.
        let store = Arc::new(InMemoryJobStore::new());
        let id = queued_job(&store, submission(true, true, false)).await;

        let a = Arc::new(MockTranscriber::failing(
            "a",
            ProviderError::Timeout { timeout_ms: 1 },
        ));
        let b = Arc::new(MockTranscriber::succeeding("b", "a transcript of the talk"));
        let gateway = ProviderGateway::builder(chains(vec!["a", "b"]))
            .transcriber(a.clone(), policy())
            .transcriber(b, policy())
            .text_generator(Arc::new(MockTextGenerator::succeeding("text", TITLES_TEXT)), policy())
            .image_generator(Arc::new(MockImageGenerator::succeeding("image")), policy())
            .build();

        let orch = orchestrator(Arc::clone(&store), gateway, PipelineConfig::default());
        let status = orch.run(id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Completed);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.progress, 100);
        assert_eq!(job.outputs.transcript.as_ref().unwrap().provider, "b");
        assert!(!job.outputs.thumbnails.is_empty());
        assert!(job.outputs.export_manifest.is_some());
        // Primary stayed within its attempt cap
        assert_eq!(a.calls(), 2);
        // The primary's failures are visible in the warning trail
        assert!(job.warnings.iter().any(|w| w.message.contains("a (timeout)")));
    }

    #[tokio::test]
    async fn test_cancel_during_transcription_stops_before_titles() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = queued_job(&store, submission(true, false, false)).await;

        let slow = Arc::new(MockTranscriber::slow_succeeding(
            "a",
            "finished anyway",
            Duration::from_millis(100),
        ));
        let text = Arc::new(MockTextGenerator::succeeding("text", TITLES_TEXT));
        let gateway = ProviderGateway::builder(chains(vec!["a"]))
            .transcriber(slow, policy())
            .text_generator(text.clone(), policy())
            .build();

        let orch = Arc::new(orchestrator(
            Arc::clone(&store),
            gateway,
            PipelineConfig::default(),
        ));
        let run = tokio::spawn({
            let orch = Arc::clone(&orch);
            async move { orch.run(id).await }
        });

        // Let the job reach the transcription call, then cancel
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(
            store.request_cancel(id).await.unwrap(),
            CancelOutcome::FlagSet
        );

        let status = run.await.unwrap().unwrap();
        assert_eq!(status, ProcessingStatus::Cancelled);

        let job = store.get(id).await.unwrap();
        // The in-flight transcription finished and was written
        assert!(job.outputs.transcript.is_some());
        // The title stage never ran
        assert!(job.outputs.metadata.is_none());
        assert_eq!(text.calls(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_queued_job_runs_no_stage() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = queued_job(&store, submission(true, false, false)).await;
        assert_eq!(
            store.request_cancel(id).await.unwrap(),
            CancelOutcome::CancelledImmediately
        );

        let transcriber = Arc::new(MockTranscriber::succeeding("a", "never used"));
        let gateway = ProviderGateway::builder(chains(vec!["a"]))
            .transcriber(transcriber.clone(), policy())
            .build();

        let orch = orchestrator(Arc::clone(&store), gateway, PipelineConfig::default());
        let status = orch.run(id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Cancelled);
        assert_eq!(transcriber.calls(), 0);
    }

    #[tokio::test]
    async fn test_optional_stage_failure_still_completes() {
        // Thumbnails-only job where frame extraction and every image
        // provider fail: completed with empty thumbnails and a warning.
        let store = Arc::new(InMemoryJobStore::new());
        let id = queued_job(&store, submission(false, true, false)).await;

        let gateway = ProviderGateway::builder(chains(vec![]))
            .image_generator(
                Arc::new(MockImageGenerator::failing(
                    "image",
                    ProviderError::Upstream {
                        status: 503,
                        message: "overloaded".into(),
                    },
                )),
                policy(),
            )
            .build();

        let orch = Orchestrator::new(
            Arc::clone(&store) as Arc<dyn JobStore>,
            Arc::new(gateway),
            Arc::new(InMemoryStorage::new()),
            Arc::new(BrokenInspector),
            Arc::new(NullPublisher),
            PipelineConfig::default(),
        );

        let status = orch.run(id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Completed);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.outputs.thumbnails.is_empty());
        assert!(job.warnings.iter().any(|w| w.stage == "thumbnails"));
    }

    #[tokio::test]
    async fn test_required_stage_exhausts_retry_budget() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut sub = submission(true, false, false);
        sub.max_retries = Some(1);
        let id = queued_job(&store, sub).await;

        let transcriber = Arc::new(MockTranscriber::failing(
            "a",
            ProviderError::Timeout { timeout_ms: 1 },
        ));
        let gateway = ProviderGateway::builder(chains(vec!["a"]))
            .transcriber(transcriber, policy())
            .build();

        let orch = orchestrator(Arc::clone(&store), gateway, PipelineConfig::default());
        let status = orch.run(id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Failed);

        let job = store.get(id).await.unwrap();
        // max_retries + 1 executions, then failed; never loops further
        assert_eq!(job.retry_count, 2);
        assert!(job.error_message.is_some());
        let detail = job.error_detail.unwrap();
        assert_eq!(detail.stage.as_deref(), Some("transcription"));
    }

    #[tokio::test]
    async fn test_chapters_from_timed_transcript() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = queued_job(&store, submission(true, false, true)).await;

        // 120 words with a 3 s pause in the middle
        let mut words: Vec<WordTiming> = (0..60)
            .map(|i| WordTiming {
                word: format!("w{i}"),
                start_secs: i as f64 * 0.4,
                end_secs: i as f64 * 0.4 + 0.3,
            })
            .collect();
        words.extend((0..60).map(|i| WordTiming {
            word: format!("v{i}"),
            start_secs: 27.0 + i as f64 * 0.4,
            end_secs: 27.0 + i as f64 * 0.4 + 0.3,
        }));

        let transcript = Transcript {
            text: words
                .iter()
                .map(|w| w.word.clone())
                .collect::<Vec<_>>()
                .join(" "),
            words,
            language: "en".into(),
            confidence: 0.95,
        };
        let transcriber = Arc::new(MockTranscriber::scripted("a", vec![Ok(transcript)]));
        let gateway = ProviderGateway::builder(chains(vec!["a"]))
            .transcriber(transcriber, policy())
            .text_generator(Arc::new(MockTextGenerator::succeeding("text", TITLES_TEXT)), policy())
            .build();

        let orch = orchestrator(Arc::clone(&store), gateway, PipelineConfig::default());
        let status = orch.run(id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Completed);

        let job = store.get(id).await.unwrap();
        assert_eq!(job.outputs.chapters.len(), 2);
        assert_eq!(job.outputs.chapters[1].end_secs, 600.0);
    }

    #[tokio::test]
    async fn test_untimed_transcript_skips_chapters() {
        let store = Arc::new(InMemoryJobStore::new());
        let id = queued_job(&store, submission(true, false, true)).await;

        let gateway = ProviderGateway::builder(chains(vec!["a"]))
            .transcriber(
                Arc::new(MockTranscriber::succeeding("a", "plain text, no timing")),
                policy(),
            )
            .text_generator(Arc::new(MockTextGenerator::succeeding("text", TITLES_TEXT)), policy())
            .build();

        let orch = orchestrator(Arc::clone(&store), gateway, PipelineConfig::default());
        let status = orch.run(id).await.unwrap();
        assert_eq!(status, ProcessingStatus::Completed);

        let job = store.get(id).await.unwrap();
        assert!(job.outputs.chapters.is_empty());
        assert_eq!(job.progress, 100);
    }
}
