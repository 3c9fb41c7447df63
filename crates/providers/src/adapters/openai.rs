//! OpenAI adapter: Whisper transcription, chat completions, image generation

use crate::error::{ProviderError, ProviderResult};
use crate::image::{GeneratedImage, ImageGenerator, ImageRequest};
use crate::text::{TextGenerator, TextRequest};
use crate::transcribe::{TranscribeRequest, Transcriber, Transcript};
use async_trait::async_trait;
use base64::Engine;
use clipforge_common::job::WordTiming;
use clipforge_common::storage::StorageService;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const WHISPER_MODEL: &str = "whisper-1";
const DEFAULT_TEXT_MODEL: &str = "gpt-4o-mini";
const IMAGE_MODEL: &str = "dall-e-3";

pub struct OpenAiProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    text_model: String,
    storage: Arc<dyn StorageService>,
}

impl OpenAiProvider {
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
            text_model: model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
            storage,
        }
    }

    async fn post_json<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> ProviderResult<R> {
        let url = format!("{}{}", self.base_url, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
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
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: String,
}

#[derive(Deserialize)]
struct WhisperResponse {
    text: String,
    #[serde(default)]
    language: Option<String>,
    #[serde(default)]
    words: Vec<WhisperWord>,
    #[serde(default)]
    segments: Vec<WhisperSegment>,
}

#[derive(Deserialize)]
struct WhisperWord {
    word: String,
    start: f64,
    end: f64,
}

#[derive(Deserialize)]
struct WhisperSegment {
    #[serde(default)]
    no_speech_prob: f64,
}

#[derive(Serialize)]
struct ImageGenRequest {
    model: String,
    prompt: String,
    n: u32,
    size: String,
    response_format: String,
}

#[derive(Deserialize)]
struct ImageGenResponse {
    data: Vec<ImageDatum>,
}

#[derive(Deserialize)]
struct ImageDatum {
    b64_json: String,
}

/// Closest size the image endpoint accepts for the requested dimensions
fn image_size(width: u32, height: u32) -> &'static str {
    if width > height {
        "1792x1024"
    } else if height > width {
        "1024x1792"
    } else {
        "1024x1024"
    }
}

#[async_trait]
impl Transcriber for OpenAiProvider {
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

        let filename = request
            .media
            .rsplit('/')
            .next()
            .unwrap_or("media")
            .to_string();

        let mut form = reqwest::multipart::Form::new()
            .part(
                "file",
                reqwest::multipart::Part::bytes(bytes).file_name(filename),
            )
            .text("model", WHISPER_MODEL)
            .text("response_format", "verbose_json")
            .text("timestamp_granularities[]", "word");

        if let Some(language) = &request.language {
            form = form.text("language", language.clone());
        }

        let url = format!("{}/audio/transcriptions", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let parsed: WhisperResponse =
            response
                .json()
                .await
                .map_err(|e| ProviderError::InvalidResponse {
                    message: e.to_string(),
                })?;

        let confidence = if parsed.segments.is_empty() {
            0.9
        } else {
            let speech: f64 = parsed
                .segments
                .iter()
                .map(|s| 1.0 - s.no_speech_prob)
                .sum();
            speech / parsed.segments.len() as f64
        };

        Ok(Transcript {
            text: parsed.text,
            words: parsed
                .words
                .into_iter()
                .map(|w| WordTiming {
                    word: w.word,
                    start_secs: w.start,
                    end_secs: w.end,
                })
                .collect(),
            language: parsed
                .language
                .or_else(|| request.language.clone())
                .unwrap_or_else(|| "en".to_string()),
            confidence,
        })
    }
}

#[async_trait]
impl TextGenerator for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_text(&self, request: &TextRequest) -> ProviderResult<String> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &request.system {
            messages.push(ChatMessage {
                role: "system",
                content: system.clone(),
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: request.prompt.clone(),
        });

        let body = ChatRequest {
            model: self.text_model.clone(),
            messages,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        };

        let parsed: ChatResponse = self.post_json("/chat/completions", &body).await?;
        parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "no choices in completion".into(),
            })
    }
}

#[async_trait]
impl ImageGenerator for OpenAiProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedImage> {
        let body = ImageGenRequest {
            model: IMAGE_MODEL.to_string(),
            prompt: format!("{}, {} style", request.prompt, request.style),
            n: 1,
            size: image_size(request.width, request.height).to_string(),
            response_format: "b64_json".to_string(),
        };

        let parsed: ImageGenResponse = self.post_json("/images/generations", &body).await?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::InvalidResponse {
                message: "no image in response".into(),
            })?;

        let bytes = base64::engine::general_purpose::STANDARD
            .decode(datum.b64_json)
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
    fn test_image_size_snaps_to_supported() {
        assert_eq!(image_size(1280, 720), "1792x1024");
        assert_eq!(image_size(720, 1280), "1024x1792");
        assert_eq!(image_size(512, 512), "1024x1024");
    }
}
