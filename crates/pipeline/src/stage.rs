//! Stage executor contract
//!
//! Stage executors never mutate job status themselves; they read the
//! snapshot in `StageContext` and return an output (or a typed failure)
//! for the orchestrator to apply. That keeps the state machine the single
//! writer of status, progress, and output fields.

use clipforge_common::config::PipelineConfig;
use clipforge_common::job::{AttemptRecord, ErrorDetail, Job, ProcessingStatus};
use clipforge_common::storage::StorageService;
use clipforge_common::store::OutputWrite;
use clipforge_providers::gateway::GatewayError;
use clipforge_providers::ProviderGateway;
use std::sync::Arc;
use thiserror::Error;

use crate::media::MediaInspector;

/// The discrete pipeline stages, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum StageKind {
    Transcription,
    Titles,
    Thumbnails,
    Chapters,
    Export,
}

impl StageKind {
    pub fn label(&self) -> &'static str {
        match self {
            StageKind::Transcription => "transcription",
            StageKind::Titles => "titles",
            StageKind::Thumbnails => "thumbnails",
            StageKind::Chapters => "chapters",
            StageKind::Export => "export",
        }
    }

    /// Sub-stage status shown to callers while this stage runs. Chapters
    /// and export run under the generic `Processing` status.
    pub fn status(&self) -> Option<ProcessingStatus> {
        match self {
            StageKind::Transcription => Some(ProcessingStatus::Transcribing),
            StageKind::Titles => Some(ProcessingStatus::GeneratingTitles),
            StageKind::Thumbnails => Some(ProcessingStatus::GeneratingThumbnails),
            StageKind::Chapters | StageKind::Export => None,
        }
    }

    /// Optional stages record a warning on terminal failure instead of
    /// failing the job.
    pub fn is_optional(&self) -> bool {
        matches!(self, StageKind::Thumbnails | StageKind::Chapters)
    }
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything a stage executor may read
pub struct StageContext {
    /// Snapshot of the job at stage start
    pub job: Job,
    pub gateway: Arc<ProviderGateway>,
    pub storage: Arc<dyn StorageService>,
    pub inspector: Arc<dyn MediaInspector>,
    pub config: PipelineConfig,
}

/// Result of a successful stage run
pub struct StageOutput {
    /// Field write the orchestrator applies, if the stage produced one
    pub write: Option<OutputWrite>,
    /// Full provider attempt trail, failures included
    pub attempts: Vec<AttemptRecord>,
    /// Actual spend attributed to this stage
    pub cost_usd: f64,
}

impl StageOutput {
    pub fn new(write: OutputWrite) -> Self {
        Self {
            write: Some(write),
            attempts: Vec::new(),
            cost_usd: 0.0,
        }
    }

    pub fn with_attempts(mut self, attempts: Vec<AttemptRecord>) -> Self {
        self.attempts = attempts;
        self
    }

    pub fn with_cost(mut self, usd: f64) -> Self {
        self.cost_usd = usd;
        self
    }

    /// Attempts that did not succeed, recorded as stage metadata
    pub fn failed_attempts(&self) -> impl Iterator<Item = &AttemptRecord> {
        self.attempts.iter().filter(|a| a.outcome != "success")
    }
}

/// Typed stage failure, decided on by the orchestrator
#[derive(Error, Debug)]
pub enum StageError {
    /// Every provider in the capability chain was exhausted, or the chain
    /// aborted on a permanent provider failure
    #[error(transparent)]
    Provider(#[from] GatewayError),

    /// Non-provider failure (storage, serialization, inspection)
    #[error("{0}")]
    Fatal(String),

    /// Stage preconditions not met; not a failure
    #[error("skipped: {0}")]
    Skipped(&'static str),
}

impl StageError {
    /// Whether a whole-stage retry could plausibly succeed. An empty
    /// provider chain is a configuration problem that no amount of
    /// retrying will change.
    pub fn is_retryable(&self) -> bool {
        match self {
            StageError::Provider(e) => matches!(e, GatewayError::AllProvidersFailed { .. }),
            StageError::Fatal(_) => false,
            StageError::Skipped(_) => false,
        }
    }

    /// Structured detail surfaced in status queries
    pub fn detail(&self, stage: StageKind) -> ErrorDetail {
        let (kind, attempts) = match self {
            StageError::Provider(e) => ("provider", e.attempts().to_vec()),
            StageError::Fatal(_) => ("fatal", Vec::new()),
            StageError::Skipped(_) => ("skipped", Vec::new()),
        };
        ErrorDetail {
            stage: Some(stage.label().to_string()),
            kind: kind.to_string(),
            attempts,
        }
    }
}

/// Contract implemented by every stage executor
#[async_trait::async_trait]
pub trait Stage: Send + Sync {
    fn kind(&self) -> StageKind;

    async fn execute(&self, ctx: &StageContext) -> Result<StageOutput, StageError>;
}
