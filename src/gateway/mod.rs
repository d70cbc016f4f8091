//! Gateway: the main event loop connecting channels, the store, and providers.
//!
//! Includes: license gating, the onboarding interceptor, command dispatch,
//! conversation turns, photo and sticker generation, background memory summarization,
//! the scheduler, and graceful shutdown.

mod conversation;
mod images;
mod pipeline;
mod scheduler;
mod stickers;
mod summarizer;


use std::collections::HashMap;
use std::sync::Arc;

use companion_core::{
    config::Config,
    error::CompanionError,
    message::{IncomingMessage, MessageMetadata, OutgoingMessage},
    traits::{Channel, ImageProvider},
};
use companion_providers::FallbackChain;
use companion_store::{Notice, Store};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};

use crate::license::LicenseGate;
use crate::onboarding::PendingState;

/// The central gateway that routes messages between channels and providers.
pub struct Gateway {
    pub(super) config: Config,
    pub(super) store: Store,
    pub(super) chain: Arc<FallbackChain>,
    pub(super) images: Arc<dyn ImageProvider>,
    pub(super) channels: HashMap<String, Arc<dyn Channel>>,
    pub(super) license: LicenseGate,
    /// Onboarding and reset conversations in progress, keyed by user id.
    pub(super) pending: Mutex<HashMap<String, PendingState>>,
    /// Tracks senders with a message in flight. New messages are buffered here.
    pub(super) active_senders: Mutex<HashMap<String, Vec<IncomingMessage>>>,
}

impl Gateway {
    /// Create a new gateway.
    pub fn new(
        config: Config,
        store: Store,
        chain: FallbackChain,
        images: Arc<dyn ImageProvider>,
        channels: HashMap<String, Arc<dyn Channel>>,
        license: LicenseGate,
    ) -> Self {
        Self {
            config,
            store,
            chain: Arc::new(chain),
            images,
            channels,
            license,
            pending: Mutex::new(HashMap::new()),
            active_senders: Mutex::new(HashMap::new()),
        }
    }

    /// Run the main event loop.
    pub async fn run(self: Arc<Self>) -> anyhow::Result<()> {
        info!(
            "{} gateway running | providers: {} | channels: {} | license: {}",
            self.config.bot.name,
            self.chain.names().join(" -> "),
            self.channels.keys().cloned().collect::<Vec<_>>().join(", "),
            if self.license.enabled() {
                "enforced"
            } else {
                "disabled"
            },
        );

        let (tx, mut rx) = mpsc::channel::<IncomingMessage>(256);

        for (name, channel) in &self.channels {
            let mut channel_rx = channel
                .start()
                .await
                .map_err(|e| anyhow::anyhow!("failed to start channel {name}: {e}"))?;
            let tx = tx.clone();
            let channel_name = name.clone();

            tokio::spawn(async move {
                while let Some(msg) = channel_rx.recv().await {
                    if tx.send(msg).await.is_err() {
                        info!("gateway receiver dropped, stopping {channel_name} forwarder");
                        break;
                    }
                }
            });

            info!("Channel started: {name}");
        }

        drop(tx);

        // Spawn scheduler loop.
        let sched_handle = if self.config.scheduler.enabled {
            let gw = self.clone();
            Some(tokio::spawn(async move {
                gw.scheduler_loop().await;
            }))
        } else {
            None
        };

        // Main event loop with graceful shutdown.
        loop {
            tokio::select! {
                maybe = rx.recv() => {
                    let Some(incoming) = maybe else {
                        warn!("all channels closed");
                        break;
                    };
                    let gw = self.clone();
                    tokio::spawn(async move {
                        gw.dispatch_message(incoming).await;
                    });
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("Received shutdown signal");
                    break;
                }
            }
        }

        self.shutdown(&sched_handle).await;
        Ok(())
    }

    /// Dispatch a message: buffer if the sender is busy, otherwise process.
    pub(super) async fn dispatch_message(self: Arc<Self>, incoming: IncomingMessage) {
        let sender_key = format!("{}:{}", incoming.channel, incoming.sender_id);

        {
            let mut active = self.active_senders.lock().await;
            if let Some(buffer) = active.get_mut(&sender_key) {
                info!("buffered message from {sender_key} (message in flight)");
                buffer.push(incoming);
                return;
            }
            active.insert(sender_key.clone(), Vec::new());
        }

        self.process_isolated(&sender_key, incoming).await;

        // Drain buffered messages in arrival order.
        loop {
            let next = {
                let mut active = self.active_senders.lock().await;
                match active.get_mut(&sender_key) {
                    Some(buf) if !buf.is_empty() => Some(buf.remove(0)),
                    _ => {
                        active.remove(&sender_key);
                        None
                    }
                }
            };

            match next {
                Some(buffered) => {
                    info!("processing buffered message from {sender_key}");
                    self.process_isolated(&sender_key, buffered).await;
                }
                None => break,
            }
        }
    }

    /// Run one message on its own task so a panicking handler cannot leave
    /// the sender marked active.
    async fn process_isolated(self: &Arc<Self>, sender_key: &str, incoming: IncomingMessage) {
        let gw = self.clone();
        let handle = tokio::spawn(async move { gw.handle_message(incoming).await });
        if let Err(e) = handle.await {
            error!("message handler for {sender_key} failed: {e}");
        }
    }

    /// Graceful shutdown: stop background work, stop channels.
    async fn shutdown(&self, sched_handle: &Option<tokio::task::JoinHandle<()>>) {
        info!("Shutting down...");

        if let Some(h) = sched_handle {
            h.abort();
        }

        // Anything queued for other users still goes out.
        self.flush_notices().await;

        for (name, channel) in &self.channels {
            if let Err(e) = channel.stop().await {
                warn!("failed to stop channel {name}: {e}");
            }
        }

        info!("Shutdown complete.");
    }

    /// Send a plain text message back to the sender.
    pub(super) async fn send_text(&self, incoming: &IncomingMessage, text: &str) {
        let msg = OutgoingMessage {
            text: text.to_string(),
            metadata: MessageMetadata::default(),
            reply_target: incoming.reply_target.clone(),
        };

        if let Some(channel) = self.channels.get(&incoming.channel) {
            if let Err(e) = channel.send(msg).await {
                error!("failed to send message: {e}");
            }
        }
    }

    pub(super) async fn send_typing(&self, incoming: &IncomingMessage) {
        if let Some(channel) = self.channels.get(&incoming.channel) {
            if let Err(e) = channel.send_typing(incoming.target()).await {
                debug!("typing indicator failed: {e}");
            }
        }
    }

    pub(super) async fn send_photo(
        &self,
        incoming: &IncomingMessage,
        image: &[u8],
        caption: &str,
    ) -> Result<(), CompanionError> {
        let channel = self
            .channels
            .get(&incoming.channel)
            .ok_or_else(|| CompanionError::Channel(format!("unknown channel {}", incoming.channel)))?;
        channel.send_photo(incoming.target(), image, caption).await
    }

    pub(super) async fn send_sticker(
        &self,
        incoming: &IncomingMessage,
        image: &[u8],
    ) -> Result<(), CompanionError> {
        let channel = self
            .channels
            .get(&incoming.channel)
            .ok_or_else(|| CompanionError::Channel(format!("unknown channel {}", incoming.channel)))?;
        channel.send_sticker(incoming.target(), image).await
    }

    /// Channel used for messages nobody asked for: notices, reminders, check-ins.
    fn outbound_channel(&self) -> Option<&Arc<dyn Channel>> {
        self.channels
            .get("whatsapp")
            .or_else(|| self.channels.values().next())
    }

    /// Send a message to a user outside of any reply.
    pub(super) async fn send_to(&self, user_id: &str, text: &str) -> Result<(), CompanionError> {
        let channel = self
            .outbound_channel()
            .ok_or_else(|| CompanionError::Channel("no channel available".into()))?;
        channel
            .send(OutgoingMessage {
                text: text.to_string(),
                metadata: MessageMetadata::default(),
                reply_target: Some(user_id.to_string()),
            })
            .await
    }

    pub(super) async fn send_notice(&self, notice: &Notice) {
        if notice.to.is_empty() {
            return;
        }
        if let Err(e) = self.send_to(&notice.to, &notice.text).await {
            warn!("failed to deliver notice to {}: {e}", notice.to);
        }
    }

    /// Deliver notices the store queued (grants, trial expiry).
    pub(super) async fn flush_notices(&self) {
        for notice in self.store.take_notices().await {
            self.send_notice(&notice).await;
        }
    }
}
