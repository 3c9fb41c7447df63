//! Stage executors, one module per pipeline stage

pub mod chapters;
pub mod export;
pub mod thumbnail;
pub mod titles;
pub mod transcription;

pub use chapters::ChapterStage;
pub use export::ExportStage;
pub use thumbnail::ThumbnailStage;
pub use titles::TitleStage;
pub use transcription::TranscriptionStage;
