//! ClipForge Provider Gateway
//!
//! Uniform capability interfaces over external AI services:
//! - `Transcriber` (speech-to-text)
//! - `TextGenerator` (titles, descriptions, tags, summaries)
//! - `ImageGenerator` (thumbnail art)
//!
//! The `gateway` module resolves a capability plus an optional language hint
//! to an ordered provider chain and invokes it with per-call timeouts,
//! bounded same-provider retries, and fallback to the next provider. The
//! `classify` module decides which failures are worth retrying.

pub mod adapters;
pub mod classify;
pub mod error;
pub mod gateway;
pub mod image;
pub mod mock;
pub mod text;
pub mod transcribe;

pub use classify::{classify, Disposition};
pub use error::{ProviderError, ProviderResult};
pub use gateway::{GatewayError, GatewayOutcome, ProviderGateway, RetryPolicy};
pub use image::{GeneratedImage, ImageGenerator, ImageRequest};
pub use text::{TextGenerator, TextRequest};
pub use transcribe::{TranscribeRequest, Transcriber, Transcript};
