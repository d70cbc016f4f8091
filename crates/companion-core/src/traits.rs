use crate::{
    context::Context,
    error::CompanionError,
    message::{IncomingMessage, OutgoingMessage},
    service::Service,
};
use async_trait::async_trait;

/// AI Provider trait.
///
/// Every text backend (Gemini, OpenRouter) implements this trait so the
/// fallback chain can treat them uniformly.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Human-readable provider name.
    fn name(&self) -> &str;

    /// Whether this provider requires an API key to function.
    fn requires_api_key(&self) -> bool;

    /// Send a conversation context to the provider and get a response.
    async fn complete(&self, context: &Context) -> Result<OutgoingMessage, CompanionError>;

    /// Check if the provider is available and ready.
    async fn is_available(&self) -> bool;
}

/// Image generation backend.
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Generate an image from a prompt and one or more reference photos.
    ///
    /// Returns the encoded image bytes as delivered by the model.
    async fn generate(
        &self,
        prompt: &str,
        references: &[Vec<u8>],
    ) -> Result<Vec<u8>, CompanionError>;
}

/// Source of rotating API keys.
#[async_trait]
pub trait KeySource: Send + Sync {
    /// Take the next key for a service, advancing its rotation index.
    ///
    /// `Ok(None)` means the pool for that service is empty.
    async fn next_key(&self, service: Service) -> Result<Option<String>, CompanionError>;

    /// Whether any key is configured, without rotating.
    async fn has_keys(&self, service: Service) -> bool;
}

/// Messaging Channel trait.
///
/// Every messaging platform implements this trait to receive and send messages.
#[async_trait]
pub trait Channel: Send + Sync {
    /// Human-readable channel name.
    fn name(&self) -> &str;

    /// Start listening for incoming messages.
    /// Returns a receiver that yields incoming messages.
    async fn start(&self) -> Result<tokio::sync::mpsc::Receiver<IncomingMessage>, CompanionError>;

    /// Send a response back through this channel.
    async fn send(&self, message: OutgoingMessage) -> Result<(), CompanionError>;

    /// Send a typing indicator to show the bot is processing.
    async fn send_typing(&self, _target: &str) -> Result<(), CompanionError> {
        Ok(())
    }

    /// Send a photo with a caption.
    async fn send_photo(
        &self,
        _target: &str,
        _image: &[u8],
        _caption: &str,
    ) -> Result<(), CompanionError> {
        Ok(())
    }

    /// Send an image as a sticker. The channel converts it to its sticker format.
    async fn send_sticker(&self, _target: &str, _image: &[u8]) -> Result<(), CompanionError> {
        Ok(())
    }

    /// Graceful shutdown.
    async fn stop(&self) -> Result<(), CompanionError>;
}
