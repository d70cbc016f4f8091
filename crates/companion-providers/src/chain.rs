//! Ordered provider fallback.

use std::sync::Arc;

use companion_core::{
    context::Context, error::CompanionError, message::OutgoingMessage, traits::Provider,
};
use tracing::{info, warn};

/// Reply used when every provider in the chain failed.
pub const APOLOGY: &str = "I'm having trouble connecting right now. Please try again in a moment.";

/// Tries each provider once, in priority order.
#[derive(Clone)]
pub struct FallbackChain {
    providers: Vec<Arc<dyn Provider>>,
}

impl FallbackChain {
    pub fn new(providers: Vec<Arc<dyn Provider>>) -> Self {
        Self { providers }
    }

    /// Provider names in priority order.
    pub fn names(&self) -> Vec<&str> {
        self.providers.iter().map(|p| p.name()).collect()
    }

    /// First successful response, or the last error seen.
    pub async fn try_complete(&self, context: &Context) -> Result<OutgoingMessage, CompanionError> {
        let mut last_err = CompanionError::Provider("no providers configured".into());
        for provider in &self.providers {
            match provider.complete(context).await {
                Ok(response) => {
                    info!(
                        "chain: {} answered in {}ms",
                        provider.name(),
                        response.metadata.processing_time_ms
                    );
                    return Ok(response);
                }
                Err(e) => {
                    warn!("chain: {} failed: {e}", provider.name());
                    last_err = e;
                }
            }
        }
        Err(last_err)
    }

    /// Response text, falling back to a fixed apology when every provider fails.
    pub async fn complete(&self, context: &Context) -> String {
        match self.try_complete(context).await {
            Ok(response) => response.text,
            Err(_) => APOLOGY.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use companion_core::message::MessageMetadata;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        name: &'static str,
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(name: &'static str, reply: Option<&'static str>) -> Arc<Self> {
            Arc::new(Self {
                name,
                reply,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Provider for Scripted {
        fn name(&self) -> &str {
            self.name
        }

        fn requires_api_key(&self) -> bool {
            false
        }

        async fn complete(&self, _context: &Context) -> Result<OutgoingMessage, CompanionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.reply {
                Some(text) => Ok(OutgoingMessage {
                    text: text.to_string(),
                    metadata: MessageMetadata {
                        provider_used: self.name.to_string(),
                        ..Default::default()
                    },
                    reply_target: None,
                }),
                None => Err(CompanionError::Provider(format!("{} returned 503", self.name))),
            }
        }

        async fn is_available(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_first_success_stops_the_chain() {
        let flash = Scripted::new("gemini_flash", None);
        let router = Scripted::new("openrouter", Some("hey there"));
        let gemini = Scripted::new("gemini", Some("unused"));
        let providers: Vec<Arc<dyn Provider>> = vec![flash.clone(), router.clone(), gemini.clone()];
        let chain = FallbackChain::new(providers);

        let reply = chain.try_complete(&Context::new("hi")).await.unwrap();
        assert_eq!(reply.text, "hey there");
        assert_eq!(reply.metadata.provider_used, "openrouter");
        assert_eq!(flash.calls.load(Ordering::SeqCst), 1);
        assert_eq!(gemini.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_all_failures_yield_apology_after_one_attempt_each() {
        let a = Scripted::new("gemini_flash", None);
        let b = Scripted::new("openrouter", None);
        let providers: Vec<Arc<dyn Provider>> = vec![a.clone(), b.clone()];
        let chain = FallbackChain::new(providers);

        assert_eq!(chain.complete(&Context::new("hi")).await, APOLOGY);
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
        assert_eq!(b.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_try_complete_returns_last_error() {
        let providers: Vec<Arc<dyn Provider>> = vec![
            Scripted::new("gemini_flash", None),
            Scripted::new("gemini", None),
        ];
        let chain = FallbackChain::new(providers);
        let err = chain.try_complete(&Context::new("hi")).await.unwrap_err();
        assert!(err.to_string().contains("gemini returned 503"));
        assert_eq!(chain.names(), vec!["gemini_flash", "gemini"]);
    }

    #[tokio::test]
    async fn test_empty_chain_is_an_error() {
        let chain = FallbackChain::new(Vec::new());
        assert!(chain.try_complete(&Context::new("hi")).await.is_err());
    }
}
