//! AssemblyAI adapter: upload, submit, poll
//!
//! The API is asynchronous: media bytes are uploaded first, a transcript
//! job is created against the upload URL, then the job is polled until it
//! settles. The gateway's per-call timeout bounds the whole sequence.

use crate::error::{ProviderError, ProviderResult};
use crate::transcribe::{TranscribeRequest, Transcriber, Transcript};
use async_trait::async_trait;
use clipforge_common::job::WordTiming;
use clipforge_common::storage::StorageService;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

const DEFAULT_BASE_URL: &str = "https://api.assemblyai.com";
const POLL_INTERVAL: Duration = Duration::from_secs(2);

pub struct AssemblyAiProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    storage: Arc<dyn StorageService>,
}

#[derive(Deserialize)]
struct UploadResponse {
    upload_url: String,
}

#[derive(Deserialize)]
struct TranscriptResponse {
    id: String,
    status: String,
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    words: Vec<AssemblyWord>,
    #[serde(default)]
    language_code: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct AssemblyWord {
    text: String,
    /// Milliseconds
    start: u64,
    /// Milliseconds
    end: u64,
}

impl AssemblyAiProvider {
    pub fn new(
        name: &str,
        api_key: String,
        base_url: Option<String>,
        storage: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            name: name.to_string(),
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            storage,
        }
    }

    async fn check<R: for<'de> Deserialize<'de>>(
        response: reqwest::Response,
    ) -> ProviderResult<R> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }
        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::InvalidResponse {
                message: e.to_string(),
            })
    }

    async fn upload(&self, bytes: Vec<u8>) -> ProviderResult<String> {
        let response = self
            .client
            .post(format!("{}/v2/upload", self.base_url))
            .header("authorization", &self.api_key)
            .header("content-type", "application/octet-stream")
            .body(bytes)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let parsed: UploadResponse = Self::check(response).await?;
        Ok(parsed.upload_url)
    }

    async fn submit(
        &self,
        audio_url: &str,
        language: Option<&str>,
    ) -> ProviderResult<TranscriptResponse> {
        let body = match language {
            Some(code) => json!({ "audio_url": audio_url, "language_code": code }),
            None => json!({ "audio_url": audio_url, "language_detection": true }),
        };

        let response = self
            .client
            .post(format!("{}/v2/transcript", self.base_url))
            .header("authorization", &self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        Self::check(response).await
    }

    async fn poll(&self, id: &str) -> ProviderResult<TranscriptResponse> {
        loop {
            let response = self
                .client
                .get(format!("{}/v2/transcript/{}", self.base_url, id))
                .header("authorization", &self.api_key)
                .send()
                .await
                .map_err(ProviderError::from_reqwest)?;

            let parsed: TranscriptResponse = Self::check(response).await?;
            match parsed.status.as_str() {
                "completed" => return Ok(parsed),
                "error" => {
                    return Err(ProviderError::Upstream {
                        status: 200,
                        message: parsed.error.unwrap_or_else(|| "transcript error".into()),
                    })
                }
                other => {
                    debug!(provider = %self.name, id, status = other, "transcript pending");
                    tokio::time::sleep(POLL_INTERVAL).await;
                }
            }
        }
    }
}

#[async_trait]
impl Transcriber for AssemblyAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn transcribe(&self, request: &TranscribeRequest) -> ProviderResult<Transcript> {
        let bytes = self
            .storage
            .retrieve(&request.media)
            .await
            .map_err(|e| ProviderError::InvalidRequest {
                message: format!("media not readable: {e}"),
            })?;

        let upload_url = self.upload(bytes).await?;
        let created = self
            .submit(&upload_url, request.language.as_deref())
            .await?;
        let done = self.poll(&created.id).await?;

        Ok(Transcript {
            text: done.text.unwrap_or_default(),
            words: done
                .words
                .into_iter()
                .map(|w| WordTiming {
                    word: w.text,
                    start_secs: w.start as f64 / 1000.0,
                    end_secs: w.end as f64 / 1000.0,
                })
                .collect(),
            language: done
                .language_code
                .or_else(|| request.language.clone())
                .unwrap_or_else(|| "en".to_string()),
            confidence: done.confidence.unwrap_or(0.9),
        })
    }
}
