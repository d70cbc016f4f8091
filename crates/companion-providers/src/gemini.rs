//! Google Gemini API provider.
//!
//! Calls the Gemini `generateContent` endpoint with a key taken from the
//! rotating pool. Auth via the `x-goog-api-key` header.
//!
//! Gemini has no system role on these models, so the persona prompt is
//! folded into user turns. The flash model gets it on the last user turn
//! only; the standard model gets it on every user turn.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use companion_core::{
    config::ProviderConfig,
    context::{ApiMessage, Context},
    error::CompanionError,
    message::{MessageMetadata, OutgoingMessage},
    service::Service,
    traits::{KeySource, Provider},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where the system prompt is placed in the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SystemFold {
    /// Only the last user turn carries the persona.
    LastTurn,
    /// Every user turn carries the persona.
    EveryTurn,
}

/// Google Gemini API provider.
pub struct GeminiProvider {
    client: reqwest::Client,
    keys: Arc<dyn KeySource>,
    service: Service,
    base_url: String,
    model: String,
    fold: SystemFold,
}

impl GeminiProvider {
    /// The fast first-choice model, drawing keys from the `gemini_flash` pool.
    pub fn flash(keys: Arc<dyn KeySource>, config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            keys,
            service: Service::GeminiFlash,
            base_url: config.gemini_base_url.clone(),
            model: config.gemini_flash_model.clone(),
            fold: SystemFold::LastTurn,
        }
    }

    /// The standard model used as the last resort, drawing from the `gemini` pool.
    pub fn standard(keys: Arc<dyn KeySource>, config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            keys,
            service: Service::Gemini,
            base_url: config.gemini_base_url.clone(),
            model: config.gemini_model.clone(),
            fold: SystemFold::EveryTurn,
        }
    }
}

// Wire types, shared with the image provider.

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiRequest {
    pub contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub safety_settings: Vec<SafetySetting>,
}

#[derive(Serialize, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<GeminiPart>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiPart {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<InlineData>,
}

impl GeminiPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            inline_data: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Serialize, Default)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_k: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub response_modalities: Vec<String>,
}

#[derive(Serialize)]
pub(crate) struct SafetySetting {
    pub category: &'static str,
    pub threshold: &'static str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiResponse {
    pub candidates: Option<Vec<GeminiCandidate>>,
    pub prompt_feedback: Option<PromptFeedback>,
    pub usage_metadata: Option<GeminiUsage>,
}

#[derive(Deserialize)]
pub(crate) struct GeminiCandidate {
    pub content: Option<GeminiContent>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PromptFeedback {
    pub block_reason: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiUsage {
    #[serde(default)]
    pub total_token_count: u64,
}

impl GeminiResponse {
    /// Parts of the first candidate, or an error naming why there are none.
    pub fn into_parts(self, provider: &str) -> Result<Vec<GeminiPart>, CompanionError> {
        if let Some(reason) = self.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(CompanionError::Provider(format!(
                "{provider}: prompt blocked ({reason})"
            )));
        }
        self.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .map(|c| c.parts)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| CompanionError::Provider(format!("{provider}: empty candidates")))
    }
}

/// Standard safety thresholds sent with every request.
pub(crate) fn safety_settings() -> Vec<SafetySetting> {
    [
        "HARM_CATEGORY_HARASSMENT",
        "HARM_CATEGORY_HATE_SPEECH",
        "HARM_CATEGORY_SEXUALLY_EXPLICIT",
        "HARM_CATEGORY_DANGEROUS_CONTENT",
    ]
    .into_iter()
    .map(|category| SafetySetting {
        category,
        threshold: "BLOCK_ONLY_HIGH",
    })
    .collect()
}

fn persona_turn(system: &str, message: &str) -> String {
    format!(
        "{system}\n\nUser message: {message}\n\n\
         Respond as the character described above, maintaining the personality and context."
    )
}

/// Map API messages onto Gemini contents, folding the system prompt in.
pub(crate) fn build_contents(
    system: &str,
    messages: &[ApiMessage],
    fold: SystemFold,
) -> Vec<GeminiContent> {
    let last_user = messages.iter().rposition(|m| m.role != "assistant");

    let mut contents: Vec<GeminiContent> = messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let is_user = m.role != "assistant";
            let folded = !system.is_empty()
                && is_user
                && match fold {
                    SystemFold::EveryTurn => true,
                    SystemFold::LastTurn => Some(i) == last_user,
                };
            let text = if folded {
                persona_turn(system, &m.content)
            } else {
                m.content.clone()
            };
            GeminiContent {
                role: Some(if is_user { "user" } else { "model" }.to_string()),
                parts: vec![GeminiPart::text(text)],
            }
        })
        .collect();

    if last_user.is_none() && !system.is_empty() {
        contents.push(GeminiContent {
            role: Some("user".to_string()),
            parts: vec![GeminiPart::text(format!(
                "{system}\n\nPlease respond as the character described above."
            ))],
        });
    }
    contents
}

#[async_trait]
impl Provider for GeminiProvider {
    fn name(&self) -> &str {
        self.service.as_str()
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn complete(&self, context: &Context) -> Result<OutgoingMessage, CompanionError> {
        let name = self.name();
        let api_key = self
            .keys
            .next_key(self.service)
            .await?
            .ok_or_else(|| CompanionError::Provider(format!("{name}: no API key configured")))?;
        let start = Instant::now();

        let (system, api_messages) = context.to_api_messages();
        let body = GeminiRequest {
            contents: build_contents(&system, &api_messages, self.fold),
            generation_config: Some(GenerationConfig {
                temperature: Some(0.7),
                top_p: Some(0.95),
                top_k: Some(40),
                max_output_tokens: Some(1024),
                ..Default::default()
            }),
            safety_settings: Vec::new(),
        };

        let url = format!("{}/models/{}:generateContent", self.base_url, self.model);
        debug!("{name}: POST models/{}:generateContent", self.model);

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompanionError::Provider(format!("{name} request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CompanionError::Provider(format!(
                "{name} returned {status}: {text}"
            )));
        }

        let parsed: GeminiResponse = resp
            .json()
            .await
            .map_err(|e| CompanionError::Provider(format!("{name}: failed to parse response: {e}")))?;

        let tokens = parsed.usage_metadata.as_ref().map(|u| u.total_token_count);
        let text = parsed
            .into_parts(name)?
            .into_iter()
            .find_map(|p| p.text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CompanionError::Provider(format!("{name}: no text in response")))?;

        Ok(OutgoingMessage {
            text,
            metadata: MessageMetadata {
                provider_used: name.to_string(),
                tokens_used: tokens,
                processing_time_ms: start.elapsed().as_millis() as u64,
                model: Some(self.model.clone()),
            },
            reply_target: None,
        })
    }

    async fn is_available(&self) -> bool {
        self.keys.has_keys(self.service).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct NoKeys;

    #[async_trait]
    impl KeySource for NoKeys {
        async fn next_key(&self, _service: Service) -> Result<Option<String>, CompanionError> {
            Ok(None)
        }

        async fn has_keys(&self, _service: Service) -> bool {
            false
        }
    }

    fn msgs(pairs: &[(&str, &str)]) -> Vec<ApiMessage> {
        pairs
            .iter()
            .map(|(role, content)| ApiMessage {
                role: role.to_string(),
                content: content.to_string(),
            })
            .collect()
    }

    fn text_of(content: &GeminiContent) -> &str {
        content.parts[0].text.as_deref().unwrap_or_default()
    }

    #[test]
    fn test_gemini_provider_names_follow_pool() {
        let config = ProviderConfig::default();
        let flash = GeminiProvider::flash(Arc::new(NoKeys), &config);
        let standard = GeminiProvider::standard(Arc::new(NoKeys), &config);
        assert_eq!(flash.name(), "gemini_flash");
        assert_eq!(standard.name(), "gemini");
        assert!(flash.requires_api_key());
    }

    #[tokio::test]
    async fn test_complete_without_key_fails_fast() {
        let p = GeminiProvider::flash(Arc::new(NoKeys), &ProviderConfig::default());
        let err = p.complete(&Context::new("hi")).await.unwrap_err();
        assert!(err.to_string().contains("no API key"));
        assert!(!p.is_available().await);
    }

    #[test]
    fn test_last_turn_fold_only_touches_final_user_message() {
        let messages = msgs(&[("user", "hi"), ("assistant", "hey!"), ("user", "how are you?")]);
        let contents = build_contents("You are Rin.", &messages, SystemFold::LastTurn);
        assert_eq!(contents.len(), 3);
        assert_eq!(text_of(&contents[0]), "hi");
        assert_eq!(contents[1].role.as_deref(), Some("model"));
        assert!(text_of(&contents[2]).starts_with("You are Rin.\n\nUser message: how are you?"));
    }

    #[test]
    fn test_every_turn_fold_touches_all_user_messages() {
        let messages = msgs(&[("user", "hi"), ("assistant", "hey!"), ("user", "bye")]);
        let contents = build_contents("You are Rin.", &messages, SystemFold::EveryTurn);
        assert!(text_of(&contents[0]).contains("User message: hi"));
        assert_eq!(text_of(&contents[1]), "hey!");
        assert!(text_of(&contents[2]).contains("User message: bye"));
    }

    #[test]
    fn test_fold_with_only_model_turns_appends_persona_request() {
        let messages = msgs(&[("assistant", "hello")]);
        let contents = build_contents("You are Rin.", &messages, SystemFold::LastTurn);
        assert_eq!(contents.len(), 2);
        assert!(text_of(&contents[1]).ends_with("Please respond as the character described above."));
    }

    #[test]
    fn test_gemini_request_serialization() {
        let body = GeminiRequest {
            contents: vec![GeminiContent {
                role: Some("user".into()),
                parts: vec![GeminiPart::text("Hello")],
            }],
            generation_config: Some(GenerationConfig {
                temperature: Some(0.7),
                max_output_tokens: Some(1024),
                ..Default::default()
            }),
            safety_settings: Vec::new(),
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["contents"][0]["parts"][0]["text"], "Hello");
        assert!(json["contents"][0]["parts"][0].get("inlineData").is_none());
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
        assert!(json["generationConfig"].get("responseModalities").is_none());
        assert!(json.get("safetySettings").is_none());
    }

    #[test]
    fn test_gemini_response_parsing() {
        let json = r#"{"candidates":[{"content":{"role":"model","parts":[{"text":"Hi there!"}]}}],"usageMetadata":{"totalTokenCount":25}}"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.usage_metadata.as_ref().map(|u| u.total_token_count), Some(25));
        let parts = resp.into_parts("gemini").unwrap();
        assert_eq!(parts[0].text.as_deref(), Some("Hi there!"));
    }

    #[test]
    fn test_blocked_prompt_is_an_error() {
        let json = r#"{"promptFeedback":{"blockReason":"SAFETY"}}"#;
        let resp: GeminiResponse = serde_json::from_str(json).unwrap();
        let err = resp.into_parts("gemini").unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_empty_candidates_is_an_error() {
        let resp: GeminiResponse = serde_json::from_str(r#"{"candidates":[]}"#).unwrap();
        assert!(resp.into_parts("gemini_flash").is_err());
    }
}
