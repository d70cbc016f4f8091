//! Channel trait implementation for WhatsApp.

use super::sticker::to_sticker;
use super::webhook::{router, WebhookState};
use super::WhatsAppChannel;
use async_trait::async_trait;
use companion_core::{
    error::CompanionError,
    message::{IncomingMessage, OutgoingMessage},
    traits::Channel,
};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info};

#[async_trait]
impl Channel for WhatsAppChannel {
    fn name(&self) -> &str {
        "whatsapp"
    }

    async fn start(&self) -> Result<mpsc::Receiver<IncomingMessage>, CompanionError> {
        let (tx, rx) = mpsc::channel(64);
        let state = Arc::new(WebhookState {
            verify_token: self.config.verify_token.clone(),
            tx,
            api: self.api.clone(),
        });

        let addr = self.bind_addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| CompanionError::Channel(format!("failed to bind webhook server: {e}")))?;

        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        *self.shutdown.lock().await = Some(stop_tx);

        tokio::spawn(async move {
            let served = axum::serve(listener, router(state))
                .with_graceful_shutdown(async {
                    let _ = stop_rx.await;
                })
                .await;
            if let Err(e) = served {
                error!("whatsapp: webhook server error: {e}");
            }
        });

        info!("WhatsApp channel listening on {addr}");
        Ok(rx)
    }

    async fn send(&self, message: OutgoingMessage) -> Result<(), CompanionError> {
        let target = message
            .reply_target
            .as_deref()
            .ok_or_else(|| CompanionError::Channel("no reply_target on outgoing message".into()))?;

        self.api.send_text(target, &message.text).await
    }

    async fn send_photo(
        &self,
        target: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<(), CompanionError> {
        self.api.send_image(target, image, caption).await
    }

    async fn send_sticker(&self, target: &str, image: &[u8]) -> Result<(), CompanionError> {
        let webp = to_sticker(image)?;
        self.api.send_sticker(target, &webp).await
    }

    async fn stop(&self) -> Result<(), CompanionError> {
        if let Some(stop) = self.shutdown.lock().await.take() {
            let _ = stop.send(());
        }
        info!("WhatsApp channel stopped");
        Ok(())
    }
}
