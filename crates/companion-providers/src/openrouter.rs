//! OpenRouter proxy provider.
//!
//! OpenAI-compatible `chat/completions` with a native system message.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use companion_core::{
    config::ProviderConfig,
    context::Context,
    error::CompanionError,
    message::{MessageMetadata, OutgoingMessage},
    service::Service,
    traits::{KeySource, Provider},
};
use serde::{Deserialize, Serialize};
use tracing::debug;

const MAX_TOKENS: u32 = 8000;

/// OpenRouter provider, second in the fallback order.
pub struct OpenRouterProvider {
    client: reqwest::Client,
    keys: Arc<dyn KeySource>,
    base_url: String,
    model: String,
    referer: String,
    title: String,
}

impl OpenRouterProvider {
    /// Create from config values.
    pub fn from_config(keys: Arc<dyn KeySource>, config: &ProviderConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            keys,
            base_url: config.openrouter_base_url.clone(),
            model: config.openrouter_model.clone(),
            referer: config.openrouter_referer.clone(),
            title: config.openrouter_title.clone(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Option<Vec<ChatChoice>>,
    model: Option<String>,
    usage: Option<ChatUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: Option<ChatMessage>,
}

#[derive(Deserialize)]
struct ChatUsage {
    total_tokens: Option<u64>,
}

/// System message first (when set), then the conversation.
fn build_messages(context: &Context) -> Vec<ChatMessage> {
    let (system, api_messages) = context.to_api_messages();
    let mut messages = Vec::with_capacity(api_messages.len() + 1);
    if !system.is_empty() {
        messages.push(ChatMessage {
            role: "system".to_string(),
            content: system,
        });
    }
    messages.extend(api_messages.into_iter().map(|m| ChatMessage {
        role: m.role,
        content: m.content,
    }));
    messages
}

#[async_trait]
impl Provider for OpenRouterProvider {
    fn name(&self) -> &str {
        "openrouter"
    }

    fn requires_api_key(&self) -> bool {
        true
    }

    async fn complete(&self, context: &Context) -> Result<OutgoingMessage, CompanionError> {
        let api_key = self
            .keys
            .next_key(Service::OpenRouter)
            .await?
            .ok_or_else(|| CompanionError::Provider("openrouter: no API key configured".into()))?;
        let start = Instant::now();

        let body = ChatCompletionRequest {
            model: self.model.clone(),
            messages: build_messages(context),
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.base_url);
        debug!("openrouter: POST chat/completions model={}", self.model);

        let resp = self
            .client
            .post(&url)
            .bearer_auth(api_key)
            .header("HTTP-Referer", &self.referer)
            .header("X-Title", &self.title)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompanionError::Provider(format!("openrouter request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CompanionError::Provider(format!(
                "openrouter returned {status}: {text}"
            )));
        }

        let parsed: ChatCompletionResponse = resp.json().await.map_err(|e| {
            CompanionError::Provider(format!("openrouter: failed to parse response: {e}"))
        })?;

        let text = parsed
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .map(|m| m.content)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| CompanionError::Provider("openrouter: empty choices".into()))?;

        Ok(OutgoingMessage {
            text,
            metadata: MessageMetadata {
                provider_used: "openrouter".to_string(),
                tokens_used: parsed.usage.and_then(|u| u.total_tokens),
                processing_time_ms: start.elapsed().as_millis() as u64,
                model: parsed.model.or_else(|| Some(self.model.clone())),
            },
            reply_target: None,
        })
    }

    async fn is_available(&self) -> bool {
        self.keys.has_keys(Service::OpenRouter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use companion_core::context::ContextEntry;

    #[test]
    fn test_build_messages_puts_system_first() {
        let ctx = Context::new("and you?")
            .with_system("You are Rin.")
            .with_history(vec![ContextEntry::user("hi"), ContextEntry::assistant("hey")]);
        let messages = build_messages(&ctx);
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[0].role, "system");
        assert_eq!(messages[0].content, "You are Rin.");
        assert_eq!(messages[3].content, "and you?");
    }

    #[test]
    fn test_build_messages_without_system() {
        let messages = build_messages(&Context::new("hi"));
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].role, "user");
    }

    #[test]
    fn test_request_serialization() {
        let body = ChatCompletionRequest {
            model: "google/gemini-2.0-flash-exp:free".into(),
            messages: build_messages(&Context::new("hello")),
            max_tokens: MAX_TOKENS,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["max_tokens"], 8000);
        assert_eq!(json["messages"][0]["content"], "hello");
    }

    #[test]
    fn test_response_parsing() {
        let json = r#"{"choices":[{"message":{"role":"assistant","content":"Hey you!"}}],"model":"google/gemini-2.0-flash-exp:free","usage":{"total_tokens":12}}"#;
        let resp: ChatCompletionResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.usage.as_ref().and_then(|u| u.total_tokens), Some(12));
        let text = resp
            .choices
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.message)
            .map(|m| m.content);
        assert_eq!(text.as_deref(), Some("Hey you!"));
    }
}
