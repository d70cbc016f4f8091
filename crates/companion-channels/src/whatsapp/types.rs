//! Cloud API webhook payloads and Graph API responses.

use serde::Deserialize;

/// Webhook notification posted by the Cloud API.
#[derive(Debug, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookChange {
    pub value: WebhookValue,
}

/// The change body. Delivery receipts arrive as `statuses` and carry no messages.
#[derive(Debug, Deserialize)]
pub struct WebhookValue {
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
}

#[derive(Debug, Deserialize)]
pub struct WebhookContact {
    pub wa_id: String,
    pub profile: Option<ContactProfile>,
}

#[derive(Debug, Deserialize)]
pub struct ContactProfile {
    pub name: Option<String>,
}

/// A single inbound message.
#[derive(Debug, Deserialize)]
pub struct WebhookMessage {
    /// Sender phone number, international format without `+`.
    pub from: String,
    pub id: String,
    /// Unix seconds, as a string.
    #[serde(default)]
    pub timestamp: String,
    #[serde(rename = "type")]
    pub message_type: String,
    pub text: Option<TextBody>,
    pub image: Option<MediaRef>,
}

#[derive(Debug, Deserialize)]
pub struct TextBody {
    pub body: String,
}

#[derive(Debug, Deserialize)]
pub struct MediaRef {
    pub id: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
}

/// `GET /{media-id}` response.
#[derive(Debug, Deserialize)]
pub struct MediaInfo {
    pub url: String,
}

/// `POST /{phone-number-id}/media` response.
#[derive(Debug, Deserialize)]
pub struct UploadedMedia {
    pub id: String,
}
