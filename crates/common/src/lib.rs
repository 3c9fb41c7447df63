//! ClipForge Common Library
//!
//! Shared code for the ClipForge media pipeline including:
//! - Job entity and processing state machine
//! - Job store abstraction (in-memory implementation)
//! - Lifecycle event publishing
//! - Artifact storage abstraction
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod events;
pub mod job;
pub mod metrics;
pub mod storage;
pub mod store;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{AppError, Result};
pub use events::{EventPublisher, JobEvent};
pub use job::{Job, JobSubmission, ProcessingStatus};
pub use store::JobStore;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default number of pipeline workers
pub const DEFAULT_WORKER_COUNT: usize = 4;

/// Default submission queue capacity
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;
