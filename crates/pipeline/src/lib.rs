//! ClipForge Pipeline
//!
//! Drives one job through its processing stages: transcription, metadata
//! generation, thumbnails, chapters, export. The orchestrator owns every
//! status transition; stage executors are stateless and only compute
//! outputs from a job snapshot plus the provider gateway.

pub mod media;
pub mod orchestrator;
pub mod progress;
pub mod stage;
pub mod stages;

pub use media::{Frame, MediaInfo, MediaInspector, SyntheticInspector};
pub use orchestrator::Orchestrator;
pub use progress::ProgressPlan;
pub use stage::{Stage, StageContext, StageError, StageKind, StageOutput};
