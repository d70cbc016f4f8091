use serde::{Deserialize, Serialize};

use super::defaults::*;

/// Model and endpoint settings for the three text providers and the image model.
///
/// Keys are not configured here: they live in the rotating key pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    #[serde(default = "default_gemini_base_url")]
    pub gemini_base_url: String,
    #[serde(default = "default_gemini_flash_model")]
    pub gemini_flash_model: String,
    #[serde(default = "default_gemini_model")]
    pub gemini_model: String,
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_openrouter_base_url")]
    pub openrouter_base_url: String,
    #[serde(default = "default_openrouter_model")]
    pub openrouter_model: String,
    /// Sent as `HTTP-Referer` to OpenRouter.
    #[serde(default = "default_openrouter_referer")]
    pub openrouter_referer: String,
    /// Sent as `X-Title` to OpenRouter.
    #[serde(default = "default_openrouter_title")]
    pub openrouter_title: String,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            gemini_base_url: default_gemini_base_url(),
            gemini_flash_model: default_gemini_flash_model(),
            gemini_model: default_gemini_model(),
            image_model: default_image_model(),
            openrouter_base_url: default_openrouter_base_url(),
            openrouter_model: default_openrouter_model(),
            openrouter_referer: default_openrouter_referer(),
            openrouter_title: default_openrouter_title(),
        }
    }
}
