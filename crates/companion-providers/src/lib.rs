//! # companion-providers
//!
//! Text providers, the fallback chain and image generation.

pub mod chain;
pub mod gemini;
pub mod image;
pub mod openrouter;

use std::sync::Arc;

use companion_core::{
    config::ProviderConfig,
    traits::{KeySource, Provider},
};

pub use chain::{FallbackChain, APOLOGY};
pub use image::GeminiImageProvider;

/// Build the chain in its fixed priority order: flash, openrouter, standard gemini.
pub fn default_chain(keys: Arc<dyn KeySource>, config: &ProviderConfig) -> FallbackChain {
    let providers: Vec<Arc<dyn Provider>> = vec![
        Arc::new(gemini::GeminiProvider::flash(keys.clone(), config)),
        Arc::new(openrouter::OpenRouterProvider::from_config(keys.clone(), config)),
        Arc::new(gemini::GeminiProvider::standard(keys, config)),
    ];
    FallbackChain::new(providers)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use companion_core::{error::CompanionError, service::Service};

    struct EmptyPool;

    #[async_trait]
    impl KeySource for EmptyPool {
        async fn next_key(&self, _service: Service) -> Result<Option<String>, CompanionError> {
            Ok(None)
        }

        async fn has_keys(&self, _service: Service) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_default_chain_order_and_empty_pool_apology() {
        let chain = default_chain(Arc::new(EmptyPool), &ProviderConfig::default());
        assert_eq!(chain.names(), vec!["gemini_flash", "openrouter", "gemini"]);
        let ctx = companion_core::context::Context::new("hi");
        assert_eq!(chain.complete(&ctx).await, APOLOGY);
    }
}
