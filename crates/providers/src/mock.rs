//! Scripted provider mocks for tests
//!
//! Each mock either always succeeds, always fails, plays back a scripted
//! sequence of outcomes, or stalls to exercise timeouts. Call counts are
//! tracked so tests can assert retry and fallback behavior.

use crate::error::{ProviderError, ProviderResult};
use crate::image::{GeneratedImage, ImageGenerator, ImageRequest};
use crate::text::{TextGenerator, TextRequest};
use crate::transcribe::{TranscribeRequest, Transcriber, Transcript};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

enum Behavior<T> {
    Succeed(T),
    Fail(ProviderError),
    Script(Mutex<VecDeque<Result<T, ProviderError>>>),
    Stall(Duration),
    SlowSucceed(T, Duration),
}

struct MockInner<T> {
    name: String,
    behavior: Behavior<T>,
    calls: AtomicUsize,
}

impl<T: Clone> MockInner<T> {
    fn new(name: &str, behavior: Behavior<T>) -> Self {
        Self {
            name: name.to_string(),
            behavior,
            calls: AtomicUsize::new(0),
        }
    }

    async fn invoke(&self) -> ProviderResult<T> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Succeed(value) => Ok(value.clone()),
            Behavior::Fail(err) => Err(err.clone()),
            Behavior::Script(script) => {
                let next = script.lock().unwrap().pop_front();
                next.unwrap_or_else(|| {
                    Err(ProviderError::InvalidResponse {
                        message: "mock script exhausted".into(),
                    })
                })
            }
            Behavior::Stall(delay) => {
                tokio::time::sleep(*delay).await;
                Err(ProviderError::Timeout {
                    timeout_ms: delay.as_millis() as u64,
                })
            }
            Behavior::SlowSucceed(value, delay) => {
                tokio::time::sleep(*delay).await;
                Ok(value.clone())
            }
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

/// Transcription mock
pub struct MockTranscriber {
    inner: MockInner<Transcript>,
}

impl MockTranscriber {
    pub fn succeeding(name: &str, text: &str) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Succeed(sample_transcript(text))),
        }
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Fail(error)),
        }
    }

    /// Plays back the given outcomes in order, then fails
    pub fn scripted(name: &str, outcomes: Vec<Result<Transcript, ProviderError>>) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Script(Mutex::new(outcomes.into()))),
        }
    }

    /// Succeeds after the given delay; used for stage-boundary tests
    pub fn slow_succeeding(name: &str, text: &str, delay: Duration) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::SlowSucceed(sample_transcript(text), delay)),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

#[async_trait]
impl Transcriber for MockTranscriber {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn transcribe(&self, _request: &TranscribeRequest) -> ProviderResult<Transcript> {
        self.inner.invoke().await
    }
}

/// Text-generation mock
pub struct MockTextGenerator {
    inner: MockInner<String>,
}

impl MockTextGenerator {
    pub fn succeeding(name: &str, response: &str) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Succeed(response.to_string())),
        }
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Fail(error)),
        }
    }

    pub fn scripted(name: &str, outcomes: Vec<Result<String, ProviderError>>) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Script(Mutex::new(outcomes.into()))),
        }
    }

    /// Never answers within the given delay; used for timeout tests
    pub fn slow(name: &str, delay: Duration) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Stall(delay)),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn generate_text(&self, _request: &TextRequest) -> ProviderResult<String> {
        self.inner.invoke().await
    }
}

/// Image-generation mock
pub struct MockImageGenerator {
    inner: MockInner<GeneratedImage>,
}

impl MockImageGenerator {
    pub fn succeeding(name: &str) -> Self {
        Self {
            inner: MockInner::new(
                name,
                Behavior::Succeed(GeneratedImage {
                    bytes: vec![0x89, 0x50, 0x4e, 0x47],
                    format: "png".into(),
                }),
            ),
        }
    }

    pub fn failing(name: &str, error: ProviderError) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Fail(error)),
        }
    }

    pub fn scripted(name: &str, outcomes: Vec<Result<GeneratedImage, ProviderError>>) -> Self {
        Self {
            inner: MockInner::new(name, Behavior::Script(Mutex::new(outcomes.into()))),
        }
    }

    pub fn calls(&self) -> usize {
        self.inner.calls()
    }
}

#[async_trait]
impl ImageGenerator for MockImageGenerator {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn generate_image(&self, _request: &ImageRequest) -> ProviderResult<GeneratedImage> {
        self.inner.invoke().await
    }
}

fn sample_transcript(text: &str) -> Transcript {
    Transcript {
        text: text.to_string(),
        words: vec![],
        language: "en".into(),
        confidence: 0.95,
    }
}
