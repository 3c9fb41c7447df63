//! Google adapter: Gemini text and audio understanding, Imagen generation
//!
//! Gemini transcribes audio shipped inline as base64. It returns plain
//! text without word-level timestamps, so transcripts from this adapter
//! carry no timing and downstream chapter detection falls back to
//! duration-based splitting.

use crate::error::{ProviderError, ProviderResult};
use crate::image::{GeneratedImage, ImageGenerator, ImageRequest};
use crate::text::{TextGenerator, TextRequest};
use crate::transcribe::{TranscribeRequest, Transcriber, Transcript};
use async_trait::async_trait;
use base64::Engine;
use clipforge_common::storage::StorageService;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_TEXT_MODEL: &str = "gemini-1.5-flash";
const IMAGE_MODEL: &str = "imagen-3.0-generate-001";

pub struct GoogleProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    storage: Arc<dyn StorageService>,
}

impl GoogleProvider {
    pub fn new(
        name: &str,
        api_key: String,
        base_url: Option<String>,
        model: Option<String>,
        storage: Arc<dyn StorageService>,
    ) -> Self {
        Self {
            name: name.to_string(),
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            model: model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            storage,
        }
    }

    async fn post<R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        body: &serde_json::Value,
    ) -> ProviderResult<R> {
        let response = self
            .client
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(body)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

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

    async fn generate_content(&self, body: serde_json::Value) -> ProviderResult<String> {
        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        let parsed: GenerateContentResponse = self.post(&url, &body).await?;

        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(ProviderError::InvalidResponse {
                message: "empty candidate text".into(),
            });
        }
        Ok(text)
    }
}

#[derive(Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    bytes_base64_encoded: String,
}

#[derive(Serialize)]
struct GenerationConfig {
    #[serde(rename = "maxOutputTokens")]
    max_output_tokens: u32,
    temperature: f32,
}

fn mime_type_for(key: &str) -> &'static str {
    match key.rsplit('.').next().unwrap_or_default() {
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "m4a" => "audio/mp4",
        "flac" => "audio/flac",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "webm" => "video/webm",
        _ => "application/octet-stream",
    }
}

#[async_trait]
impl Transcriber for GoogleProvider {
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

        let prompt = match &request.language {
            Some(lang) => format!(
                "Transcribe this audio verbatim. The spoken language is {lang}. \
                 Return only the transcript text."
            ),
            None => "Transcribe this audio verbatim. Return only the transcript text."
                .to_string(),
        };

        let body = json!({
            "contents": [{
                "parts": [
                    { "text": prompt },
                    {
                        "inline_data": {
                            "mime_type": mime_type_for(&request.media),
                            "data": base64::engine::general_purpose::STANDARD.encode(&bytes),
                        }
                    }
                ]
            }]
        });

        let text = self.generate_content(body).await?;

        Ok(Transcript {
            text,
            words: vec![],
            language: request.language.clone().unwrap_or_else(|| "en".to_string()),
            confidence: 0.8,
        })
    }
}

#[async_trait]
impl TextGenerator for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_text(&self, request: &TextRequest) -> ProviderResult<String> {
        let mut body = json!({
            "contents": [{
                "parts": [{ "text": request.prompt }]
            }],
            "generationConfig": GenerationConfig {
                max_output_tokens: request.max_tokens,
                temperature: request.temperature,
            },
        });

        if let Some(system) = &request.system {
            body["systemInstruction"] = json!({ "parts": [{ "text": system }] });
        }

        self.generate_content(body).await
    }
}

#[async_trait]
impl ImageGenerator for GoogleProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedImage> {
        let aspect_ratio = if request.width > request.height {
            "16:9"
        } else if request.height > request.width {
            "9:16"
        } else {
            "1:1"
        };

        let url = format!("{}/models/{}:predict", self.base_url, IMAGE_MODEL);
        let body = json!({
            "instances": [{
                "prompt": format!("{}, {} style", request.prompt, request.style),
            }],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": aspect_ratio,
            },
        });

        let parsed: PredictResponse = self.post(&url, &body).await?;
        let prediction = parsed
            .predictions
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "no predictions in response".into(),
            })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(prediction.bytes_base64_encoded)
            .map_err(|e| ProviderError::InvalidResponse {
                message: format!("invalid base64 image: {e}"),
            })?;

        Ok(GeneratedImage {
            bytes,
            format: "png".into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_mapping() {
        assert_eq!(mime_type_for("uploads/a.mp3"), "audio/mpeg");
        assert_eq!(mime_type_for("uploads/clip.mp4"), "video/mp4");
        assert_eq!(mime_type_for("noextension"), "application/octet-stream");
    }
}
