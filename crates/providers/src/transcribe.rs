//! Speech-to-text capability

use crate::error::ProviderResult;
use async_trait::async_trait;
use clipforge_common::job::WordTiming;
use serde::{Deserialize, Serialize};

/// Request for one transcription call
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TranscribeRequest {
    /// Storage reference of the media/audio to transcribe
    pub media: String,
    /// Language code, or None to let the provider detect it
    pub language: Option<String>,
    /// Media duration in seconds, used by adapters for chunking decisions
    pub duration_secs: f64,
}

/// Provider-agnostic transcription result
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub text: String,
    pub words: Vec<WordTiming>,
    pub language: String,
    pub confidence: f64,
}

impl Transcript {
    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }
}

/// Trait for transcription providers
#[async_trait]
pub trait Transcriber: Send + Sync {
    /// Provider name used in chains, attempt records, and metrics
    fn name(&self) -> &str;

    /// Transcribe the referenced media
    async fn transcribe(&self, request: &TranscribeRequest) -> ProviderResult<Transcript>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_count() {
        let transcript = Transcript {
            text: "one two  three".into(),
            words: vec![],
            language: "en".into(),
            confidence: 0.9,
        };
        assert_eq!(transcript.word_count(), 3);
    }
}
