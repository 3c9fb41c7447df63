//! Processing status state machine

use serde::{Deserialize, Serialize};

/// Lifecycle states for a processing job
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    /// Created and validated, not yet enqueued
    Pending,
    /// Waiting in the submission queue
    Queued,
    /// Picked up by a worker, pipeline starting
    Processing,
    /// Transcription stage running
    Transcribing,
    /// Title/description/tag stage running
    GeneratingTitles,
    /// Thumbnail/chapter/export tail running
    GeneratingThumbnails,
    /// All requested stages finished
    Completed,
    /// Terminal failure
    Failed,
    /// Cancelled by the caller
    Cancelled,
    /// Expired by the retention collaborator
    Expired,
}

impl ProcessingStatus {
    /// Terminal states are immutable once entered
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Completed
                | ProcessingStatus::Failed
                | ProcessingStatus::Cancelled
                | ProcessingStatus::Expired
        )
    }

    /// Active states are owned by the worker holding the job lease
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            ProcessingStatus::Processing
                | ProcessingStatus::Transcribing
                | ProcessingStatus::GeneratingTitles
                | ProcessingStatus::GeneratingThumbnails
        )
    }

    /// Whether a transition from `self` to `next` follows a declared edge.
    ///
    /// Forward order is Pending -> Queued -> Processing -> Transcribing ->
    /// GeneratingTitles -> GeneratingThumbnails -> Completed. Stage states may
    /// be skipped forward when the corresponding stage was not requested, and
    /// any non-terminal state may move to a terminal one.
    pub fn can_transition_to(&self, next: ProcessingStatus) -> bool {
        use ProcessingStatus::*;

        if self.is_terminal() {
            return false;
        }
        if next.is_terminal() {
            return true;
        }

        // Forward-only edges; skipping stage states is allowed, going back is not.
        let rank = |s: &ProcessingStatus| match s {
            Pending => 0,
            Queued => 1,
            Processing => 2,
            Transcribing => 3,
            GeneratingTitles => 4,
            GeneratingThumbnails => 5,
            Completed | Failed | Cancelled | Expired => 6,
        };

        rank(&next) > rank(self)
    }

    /// Human-readable step label
    pub fn label(&self) -> &'static str {
        match self {
            ProcessingStatus::Pending => "pending",
            ProcessingStatus::Queued => "queued",
            ProcessingStatus::Processing => "processing",
            ProcessingStatus::Transcribing => "transcribing",
            ProcessingStatus::GeneratingTitles => "generating_titles",
            ProcessingStatus::GeneratingThumbnails => "generating_thumbnails",
            ProcessingStatus::Completed => "completed",
            ProcessingStatus::Failed => "failed",
            ProcessingStatus::Cancelled => "cancelled",
            ProcessingStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for ProcessingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessingStatus::*;

    #[test]
    fn test_forward_edges() {
        assert!(Pending.can_transition_to(Queued));
        assert!(Queued.can_transition_to(Processing));
        assert!(Processing.can_transition_to(Transcribing));
        assert!(Transcribing.can_transition_to(GeneratingTitles));
        assert!(GeneratingTitles.can_transition_to(GeneratingThumbnails));
        assert!(GeneratingThumbnails.can_transition_to(Completed));
    }

    #[test]
    fn test_stage_skip_allowed() {
        // A job without subtitles requested goes straight to the title stage
        assert!(Processing.can_transition_to(GeneratingTitles));
        assert!(Processing.can_transition_to(Completed));
    }

    #[test]
    fn test_backward_edges_rejected() {
        assert!(!Transcribing.can_transition_to(Processing));
        assert!(!GeneratingThumbnails.can_transition_to(Transcribing));
        assert!(!Queued.can_transition_to(Pending));
    }

    #[test]
    fn test_terminal_states_immutable() {
        for terminal in [Completed, Failed, Cancelled, Expired] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(Processing));
            assert!(!terminal.can_transition_to(Failed));
        }
    }

    #[test]
    fn test_terminal_reachable_from_any_active_state() {
        for state in [Pending, Queued, Processing, Transcribing, GeneratingTitles] {
            assert!(state.can_transition_to(Cancelled));
            assert!(state.can_transition_to(Failed));
            assert!(state.can_transition_to(Expired));
        }
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&GeneratingTitles).unwrap();
        assert_eq!(json, "\"generating_titles\"");
    }
}
