//! Stability AI adapter: stable-image generation
//!
//! The generate endpoint takes a multipart form and returns the encoded
//! image bytes directly when asked for `image/*`.

use crate::error::{ProviderError, ProviderResult};
use crate::image::{GeneratedImage, ImageGenerator, ImageRequest};
use async_trait::async_trait;

const DEFAULT_BASE_URL: &str = "https://api.stability.ai";

pub struct StabilityProvider {
    name: String,
    client: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl StabilityProvider {
    pub fn new(name: &str, api_key: String, base_url: Option<String>) -> Self {
        Self {
            name: name.to_string(),
            client: reqwest::Client::new(),
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        }
    }
}

fn aspect_ratio(width: u32, height: u32) -> &'static str {
    if width > height {
        "16:9"
    } else if height > width {
        "9:16"
    } else {
        "1:1"
    }
}

#[async_trait]
impl ImageGenerator for StabilityProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate_image(&self, request: &ImageRequest) -> ProviderResult<GeneratedImage> {
        let form = reqwest::multipart::Form::new()
            .text(
                "prompt",
                format!("{}, {} style", request.prompt, request.style),
            )
            .text("aspect_ratio", aspect_ratio(request.width, request.height))
            .text("output_format", "png");

        let url = format!("{}/v2beta/stable-image/generate/core", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("accept", "image/*")
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from_reqwest)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(ProviderError::from_reqwest)?
            .to_vec();

        if bytes.is_empty() {
            return Err(ProviderError::InvalidResponse {
                message: "empty image body".into(),
            });
        }

        Ok(GeneratedImage {
            bytes,
            format: "png".into(),
        })
    }
}
