//! Lifecycle event publishing
//!
//! The pipeline emits best-effort events for external subscribers (live
//! status pushes, notification fan-out). Publishing must never fail the
//! pipeline: implementations swallow delivery errors and log them.

use crate::job::ProcessingStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Kind of lifecycle event
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StageStarted,
    Progress,
    StageCompleted,
    JobCompleted,
    JobFailed,
    JobCancelled,
}

/// One published lifecycle event
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobEvent {
    pub job_id: Uuid,
    pub kind: EventKind,
    pub status: ProcessingStatus,
    pub progress: u8,
    /// Stage label for stage-scoped events
    pub stage: Option<String>,
    pub message: Option<String>,
    pub at: DateTime<Utc>,
}

impl JobEvent {
    pub fn new(job_id: Uuid, kind: EventKind, status: ProcessingStatus, progress: u8) -> Self {
        Self {
            job_id,
            kind,
            status,
            progress,
            stage: None,
            message: None,
            at: Utc::now(),
        }
    }

    pub fn with_stage(mut self, stage: impl Into<String>) -> Self {
        self.stage = Some(stage.into());
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Best-effort notification sink. Fire-and-forget by contract.
pub trait EventPublisher: Send + Sync {
    fn publish(&self, event: JobEvent);
}

/// Publisher that logs events through tracing
pub struct LogPublisher;

impl EventPublisher for LogPublisher {
    fn publish(&self, event: JobEvent) {
        tracing::info!(
            job_id = %event.job_id,
            kind = ?event.kind,
            status = %event.status,
            progress = event.progress,
            stage = event.stage.as_deref().unwrap_or(""),
            "job event"
        );
    }
}

/// Publisher fanning events out over a tokio broadcast channel.
///
/// Lossy by design: lagging or absent subscribers never block or fail the
/// pipeline.
pub struct BroadcastPublisher {
    tx: broadcast::Sender<JobEvent>,
}

impl BroadcastPublisher {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.tx.subscribe()
    }
}

impl EventPublisher for BroadcastPublisher {
    fn publish(&self, event: JobEvent) {
        // send() errors only when there are no receivers; that is fine here
        if self.tx.send(event).is_err() {
            tracing::trace!("no event subscribers");
        }
    }
}

/// Publisher that drops everything (tests, disabled notifications)
pub struct NullPublisher;

impl EventPublisher for NullPublisher {
    fn publish(&self, _event: JobEvent) {}
}

/// Shared publisher handle used across the pipeline
pub type SharedPublisher = Arc<dyn EventPublisher>;

#[cfg(test)]
mod tests {
    use super::*;

    fn event(kind: EventKind) -> JobEvent {
        JobEvent::new(Uuid::new_v4(), kind, ProcessingStatus::Processing, 10)
    }

    #[tokio::test]
    async fn test_broadcast_delivers_to_subscriber() {
        let publisher = BroadcastPublisher::new(8);
        let mut rx = publisher.subscribe();

        publisher.publish(event(EventKind::StageStarted).with_stage("transcription"));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.kind, EventKind::StageStarted);
        assert_eq!(received.stage.as_deref(), Some("transcription"));
    }

    #[test]
    fn test_broadcast_without_subscribers_never_panics() {
        let publisher = BroadcastPublisher::new(4);
        for _ in 0..10 {
            publisher.publish(event(EventKind::Progress));
        }
    }

    #[test]
    fn test_event_serializes_snake_case() {
        let json = serde_json::to_string(&event(EventKind::JobCompleted)).unwrap();
        assert!(json.contains("\"job_completed\""));
    }
}
