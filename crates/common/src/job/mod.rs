//! Job entity for the processing pipeline
//!
//! A `Job` is the persisted record of one submitted media item: immutable
//! input descriptor, requested stages, orchestrator-owned processing fields,
//! and per-stage outputs.

mod status;

pub use status::ProcessingStatus;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Immutable description of the uploaded media item
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Storage reference for the uploaded bytes (path or object key)
    pub source: String,
    pub original_filename: String,
    /// Declared size in bytes
    pub size_bytes: u64,
    /// SHA-256 of the uploaded content
    pub content_hash: String,
    /// Declared duration in seconds
    pub duration_secs: f64,
    /// e.g. "1920x1080"
    pub resolution: Option<String>,
    /// Caller-declared source language, or None for auto-detection
    pub language_hint: Option<String>,
}

/// Which optional stages the caller asked for
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedStages {
    pub subtitles: bool,
    pub thumbnails: bool,
    pub summary: bool,
    pub chapters: bool,
}

/// Validated submission payload for a new job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobSubmission {
    pub user_id: Uuid,
    pub input: InputDescriptor,
    pub stages: RequestedStages,
    #[serde(default)]
    pub max_retries: Option<u32>,
}

/// One timed word from the transcript
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WordTiming {
    pub word: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// Output of the transcription stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TranscriptOutput {
    pub text: String,
    pub words: Vec<WordTiming>,
    pub detected_language: String,
    pub confidence: f64,
    /// Provider that produced the transcript
    pub provider: String,
}

impl TranscriptOutput {
    /// Chapter detection needs word-level timing
    pub fn has_timing(&self) -> bool {
        !self.words.is_empty()
    }
}

/// Output of the title/description/tag stage
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetadataOutput {
    pub titles: Vec<String>,
    pub descriptions: Vec<String>,
    pub tags: Vec<String>,
    pub summary: Option<String>,
    pub provider: String,
}

/// One generated or extracted thumbnail
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailRef {
    /// Storage key of the stored image
    pub storage_key: String,
    /// Provider name for AI-generated art, "frame" for extracted frames
    pub provider: String,
    /// Quality score in [0, 1] for extracted frames
    pub score: Option<f64>,
}

/// One detected chapter
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub start_secs: f64,
    pub end_secs: f64,
    pub title: String,
}

/// Warning recorded when an optional stage fails without failing the job
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StageWarning {
    pub stage: String,
    pub message: String,
    pub at: DateTime<Utc>,
}

/// Structured failure detail surfaced in status queries
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub stage: Option<String>,
    pub kind: String,
    /// Per-provider attempt trail for the failing call, if any
    pub attempts: Vec<AttemptRecord>,
}

/// One provider attempt made by the gateway on behalf of a stage
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub provider: String,
    pub outcome: String,
}

/// Outputs written back by stage executors, one field per owning stage
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct StageOutputs {
    pub transcript: Option<TranscriptOutput>,
    pub metadata: Option<MetadataOutput>,
    pub thumbnails: Vec<ThumbnailRef>,
    pub chapters: Vec<Chapter>,
    /// Storage key of the export manifest
    pub export_manifest: Option<String>,
}

/// Cost accounting derived from stage execution
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct CostEstimate {
    pub estimated_usd: f64,
    pub actual_usd: f64,
}

/// The persisted record of one processing job
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub user_id: Uuid,

    pub input: InputDescriptor,
    pub stages: RequestedStages,

    pub status: ProcessingStatus,
    /// 0-100, monotonically non-decreasing while active
    pub progress: u8,
    pub current_step: Option<String>,
    pub retry_count: u32,
    pub max_retries: u32,
    pub error_message: Option<String>,
    pub error_detail: Option<ErrorDetail>,
    pub warnings: Vec<StageWarning>,
    /// Cooperative cancellation flag, observed at stage boundaries
    pub cancel_requested: bool,

    pub outputs: StageOutputs,
    pub cost: CostEstimate,
    pub processing_time_secs: Option<f64>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Default stage retry budget per job
pub const DEFAULT_MAX_RETRIES: u32 = 3;

impl Job {
    /// Build a new `Pending` job from a validated submission
    pub fn from_submission(submission: JobSubmission) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: submission.user_id,
            input: submission.input,
            stages: submission.stages,
            status: ProcessingStatus::Pending,
            progress: 0,
            current_step: None,
            retry_count: 0,
            max_retries: submission.max_retries.unwrap_or(DEFAULT_MAX_RETRIES),
            error_message: None,
            error_detail: None,
            warnings: Vec::new(),
            cancel_requested: false,
            outputs: StageOutputs::default(),
            cost: CostEstimate::default(),
            processing_time_secs: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            completed_at: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn submission() -> JobSubmission {
        JobSubmission {
            user_id: Uuid::new_v4(),
            input: InputDescriptor {
                source: "uploads/demo.mp4".into(),
                original_filename: "demo.mp4".into(),
                size_bytes: 12_000_000,
                content_hash: "abc123".into(),
                duration_secs: 630.0,
                resolution: Some("1920x1080".into()),
                language_hint: None,
            },
            stages: RequestedStages {
                subtitles: true,
                thumbnails: true,
                summary: false,
                chapters: false,
            },
            max_retries: None,
        }
    }

    #[test]
    fn test_new_job_defaults() {
        let job = Job::from_submission(submission());
        assert_eq!(job.status, ProcessingStatus::Pending);
        assert_eq!(job.progress, 0);
        assert_eq!(job.retry_count, 0);
        assert_eq!(job.max_retries, DEFAULT_MAX_RETRIES);
        assert!(job.outputs.transcript.is_none());
        assert!(!job.cancel_requested);
        assert!(job.started_at.is_none());
    }

    #[test]
    fn test_transcript_timing() {
        let mut transcript = TranscriptOutput {
            text: "hello world".into(),
            words: vec![],
            detected_language: "en".into(),
            confidence: 0.93,
            provider: "openai".into(),
        };
        assert!(!transcript.has_timing());

        transcript.words.push(WordTiming {
            word: "hello".into(),
            start_secs: 0.0,
            end_secs: 0.4,
        });
        assert!(transcript.has_timing());
    }

    #[test]
    fn test_job_round_trip() {
        let job = Job::from_submission(submission());
        let json = serde_json::to_string(&job).unwrap();
        let parsed: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, job.id);
        assert_eq!(parsed.input, job.input);
        assert_eq!(parsed.status, ProcessingStatus::Pending);
    }
}
