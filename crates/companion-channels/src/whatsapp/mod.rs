//! WhatsApp channel over the Cloud API.
//!
//! Inbound messages arrive as webhooks on an axum server (`GET /webhook`
//! answers the verification handshake, `POST /webhook` carries events).
//! Outbound text, photos and stickers go through the Graph API.

mod channel;
mod send;
mod sticker;
pub mod types;
mod webhook;

#[cfg(test)]
mod tests;

use companion_core::config::WhatsAppConfig;
use std::sync::Arc;
use tokio::sync::{oneshot, Mutex};

use send::GraphApi;

/// WhatsApp channel using the Cloud API.
pub struct WhatsAppChannel {
    pub(super) config: WhatsAppConfig,
    /// Shared with the webhook handlers for media downloads.
    pub(super) api: Arc<GraphApi>,
    /// Stops the webhook server, set after `start()`.
    pub(super) shutdown: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl WhatsAppChannel {
    /// Create a new WhatsApp channel from config.
    pub fn new(config: WhatsAppConfig) -> Self {
        let api = Arc::new(GraphApi::new(&config));
        Self {
            config,
            api,
            shutdown: Arc::new(Mutex::new(None)),
        }
    }

    /// Address the webhook server binds to.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }
}
