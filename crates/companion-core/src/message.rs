use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An incoming message from a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name (e.g. "whatsapp").
    pub channel: String,
    /// Platform-specific user ID (bare international phone number on WhatsApp).
    pub sender_id: String,
    /// Human-readable sender name, when the platform provides a profile.
    pub sender_name: Option<String>,
    /// Message text, or the caption of a media message.
    pub text: String,
    pub timestamp: DateTime<Utc>,
    pub attachments: Vec<Attachment>,
    /// Platform-specific target for routing the response.
    #[serde(default)]
    pub reply_target: Option<String>,
}

impl IncomingMessage {
    /// Build a plain text message, stamped now.
    pub fn text(channel: &str, sender_id: &str, text: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            sender_id: sender_id.to_string(),
            sender_name: None,
            text: text.to_string(),
            timestamp: Utc::now(),
            attachments: Vec::new(),
            reply_target: Some(sender_id.to_string()),
        }
    }

    /// First image attachment carrying downloaded bytes.
    pub fn image(&self) -> Option<&[u8]> {
        self.attachments
            .iter()
            .filter(|a| matches!(a.file_type, AttachmentType::Image))
            .find_map(|a| a.data.as_deref())
    }

    /// Where replies to this message should go.
    pub fn target(&self) -> &str {
        self.reply_target.as_deref().unwrap_or(&self.sender_id)
    }
}

/// An outgoing message to send back through a channel.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutgoingMessage {
    pub text: String,
    pub metadata: MessageMetadata,
    /// Platform-specific target for routing.
    #[serde(default)]
    pub reply_target: Option<String>,
}

/// Metadata about how a message was generated.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct MessageMetadata {
    /// Which provider produced this response.
    pub provider_used: String,
    /// Token count (if available from the provider).
    pub tokens_used: Option<u64>,
    /// Wall-clock processing time in milliseconds.
    pub processing_time_ms: u64,
    /// Model identifier (if applicable).
    pub model: Option<String>,
}

/// A file attachment on a message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub file_type: AttachmentType,
    pub url: Option<String>,
    pub data: Option<Vec<u8>>,
    pub filename: Option<String>,
}

/// Supported attachment types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum AttachmentType {
    Image,
    Document,
    Audio,
    Video,
    Other,
}

/// Normalize a phone number or WhatsApp JID into a bare user ID.
///
/// `+1 555-0100`, `15550100@s.whatsapp.net` and `15550100` all map to `15550100`.
pub fn normalize_user_id(raw: &str) -> String {
    let bare = raw.split('@').next().unwrap_or(raw);
    bare.chars().filter(|c| c.is_ascii_digit()).collect()
}
