//! Gemini image generation.
//!
//! Sends the prompt plus reference photos as `inlineData` parts and decodes
//! the first image part of the response. Keys come from the `gemini` pool.

use std::sync::Arc;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use companion_core::{
    config::ProviderConfig,
    error::CompanionError,
    service::Service,
    traits::{ImageProvider, KeySource},
};
use tracing::{debug, info};

use crate::gemini::{
    safety_settings, GeminiContent, GeminiPart, GeminiRequest, GeminiResponse, GenerationConfig,
    InlineData,
};

/// Image provider backed by the Gemini image-generation model.
pub struct GeminiImageProvider {
    client: reqwest::Client,
    keys: Arc<dyn KeySource>,
    base_url: String,
    model: String,
}

impl GeminiImageProvider {
    /// Create from config values.
    pub fn from_config(keys: Arc<dyn KeySource>, config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            keys,
            base_url: config.gemini_base_url.clone(),
            model: config.image_model.clone(),
        }
    }
}

fn build_request(prompt: &str, references: &[Vec<u8>]) -> GeminiRequest {
    let mut parts = vec![GeminiPart::text(prompt)];
    parts.extend(references.iter().map(|bytes| GeminiPart {
        text: None,
        inline_data: Some(InlineData {
            mime_type: "image/jpeg".to_string(),
            data: STANDARD.encode(bytes),
        }),
    }));

    // Single-reference portraits use near-greedy sampling to hold the face steady.
    let sampling = if references.len() == 1 {
        GenerationConfig {
            temperature: Some(0.1),
            top_p: Some(0.1),
            top_k: Some(8),
            ..Default::default()
        }
    } else {
        GenerationConfig::default()
    };

    GeminiRequest {
        contents: vec![GeminiContent {
            role: Some("user".to_string()),
            parts,
        }],
        generation_config: Some(GenerationConfig {
            response_modalities: vec!["Text".to_string(), "Image".to_string()],
            ..sampling
        }),
        safety_settings: safety_settings(),
    }
}

/// Decode the first inline image of a response.
fn extract_image(resp: GeminiResponse) -> Result<Vec<u8>, CompanionError> {
    let data = resp
        .into_parts("gemini image")?
        .into_iter()
        .find_map(|p| p.inline_data)
        .ok_or_else(|| CompanionError::Provider("gemini image: no image in response".into()))?;
    STANDARD
        .decode(data.data.as_bytes())
        .map_err(|e| CompanionError::Provider(format!("gemini image: invalid base64: {e}")))
}

#[async_trait]
impl ImageProvider for GeminiImageProvider {
    async fn generate(
        &self,
        prompt: &str,
        references: &[Vec<u8>],
    ) -> Result<Vec<u8>, CompanionError> {
        let api_key = self
            .keys
            .next_key(Service::Gemini)
            .await?
            .ok_or_else(|| CompanionError::Provider("gemini image: no API key configured".into()))?;

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!(
            "gemini image: POST models/{}:generateContent refs={}",
            self.model,
            references.len()
        );

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&build_request(prompt, references))
            .send()
            .await
            .map_err(|e| CompanionError::Provider(format!("gemini image request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CompanionError::Provider(format!(
                "gemini image returned {status}: {text}"
            )));
        }

        let parsed: GeminiResponse = resp.json().await.map_err(|e| {
            CompanionError::Provider(format!("gemini image: failed to parse response: {e}"))
        })?;
        let image = extract_image(parsed)?;
        info!("gemini image: generated {} bytes", image.len());
        Ok(image)
    }
}
