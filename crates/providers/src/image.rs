//! Image generation capability

use crate::error::ProviderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request for one image-generation call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    /// Style hint passed through to the provider prompt
    pub style: String,
}

impl ImageRequest {
    pub fn thumbnail(prompt: impl Into<String>, style: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            width: 1280,
            height: 720,
            style: style.into(),
        }
    }
}

/// A generated image returned by a provider
#[derive(Clone, Debug, PartialEq)]
pub struct GeneratedImage {
    pub bytes: Vec<u8>,
    /// e.g. "png", "jpg"
    pub format: String,
}

/// Trait for image-generation providers
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Provider name used in chains, attempt records, and metrics
    fn name(&self) -> &str;

    /// Generate one image for the prompt
    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedImage>;
}
