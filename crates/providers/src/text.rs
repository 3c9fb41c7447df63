//! Text generation capability

use crate::error::ProviderResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Request for one text-generation call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TextRequest {
    pub prompt: String,
    /// System/context framing, where the provider supports it
    pub system: Option<String>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl TextRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system: None,
            max_tokens: 1024,
            temperature: 0.7,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }
}

/// Trait for text-generation providers
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Provider name used in chains, attempt records, and metrics
    fn name(&self) -> &str;

    /// Generate text for the prompt
    async fn generate_text(&self, request: &TextRequest) -> ProviderResult<String>;
}
