//! Graph API calls: text, images, stickers, media upload and download.

use super::types::{MediaInfo, UploadedMedia};
use companion_core::{config::WhatsAppConfig, error::CompanionError};
use serde_json::json;
use tracing::debug;

/// Maximum text body length accepted by the Cloud API.
pub(super) const MAX_TEXT_LEN: usize = 4096;

const GRAPH_HOST: &str = "https://graph.facebook.com";

/// Authenticated Graph API client for one business phone number.
pub(super) struct GraphApi {
    client: reqwest::Client,
    /// `https://graph.facebook.com/{version}`.
    base: String,
    access_token: String,
    phone_number_id: String,
}

impl GraphApi {
    pub(super) fn new(config: &WhatsAppConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base: format!("{GRAPH_HOST}/{}", config.api_version),
            access_token: config.access_token.clone(),
            phone_number_id: config.phone_number_id.clone(),
        }
    }

    fn messages_url(&self) -> String {
        format!("{}/{}/messages", self.base, self.phone_number_id)
    }

    async fn post_message(&self, body: serde_json::Value) -> Result<(), CompanionError> {
        let resp = self
            .client
            .post(self.messages_url())
            .bearer_auth(&self.access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompanionError::Channel(format!("whatsapp send failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CompanionError::Channel(format!(
                "whatsapp api returned {status}: {text}"
            )));
        }
        Ok(())
    }

    /// Send a text message, split into API-sized chunks.
    pub(super) async fn send_text(&self, to: &str, text: &str) -> Result<(), CompanionError> {
        for chunk in split_message(text, MAX_TEXT_LEN) {
            self.post_message(text_body(to, chunk)).await?;
        }
        debug!("whatsapp: sent text to {to}");
        Ok(())
    }

    /// Upload image bytes and send them with a caption.
    pub(super) async fn send_image(
        &self,
        to: &str,
        image: &[u8],
        caption: &str,
    ) -> Result<(), CompanionError> {
        let media_id = self.upload_media(image).await?;
        self.post_message(json!({
            "messaging_product": "whatsapp",
            "to": to,
            "type": "image",
            "image": { "id": media_id, "caption": caption },
        }))
        .await?;
        debug!("whatsapp: sent image to {to}");
        Ok(())
    }

    /// Upload WebP sticker bytes and send them.
    pub(super) async fn send_sticker(&self, to: &str, webp: &[u8]) -> Result<(), CompanionError> {
        let media_id = self.upload_media(webp).await?;
        self.post_message(sticker_body(to, &media_id)).await?;
        debug!("whatsapp: sent sticker to {to}");
        Ok(())
    }

    async fn upload_media(&self, image: &[u8]) -> Result<String, CompanionError> {
        let mime = sniff_image_mime(image);
        let file_name = match mime {
            "image/png" => "image.png",
            "image/webp" => "sticker.webp",
            _ => "image.jpg",
        };
        let part = reqwest::multipart::Part::bytes(image.to_vec())
            .file_name(file_name)
            .mime_str(mime)
            .map_err(|e| CompanionError::Channel(format!("whatsapp media part: {e}")))?;
        let form = reqwest::multipart::Form::new()
            .text("messaging_product", "whatsapp")
            .text("type", mime)
            .part("file", part);

        let url = format!("{}/{}/media", self.base, self.phone_number_id);
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.access_token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| CompanionError::Channel(format!("whatsapp media upload failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(CompanionError::Channel(format!(
                "whatsapp media upload returned {status}: {text}"
            )));
        }
        let uploaded: UploadedMedia = resp
            .json()
            .await
            .map_err(|e| CompanionError::Channel(format!("whatsapp media upload parse: {e}")))?;
        Ok(uploaded.id)
    }

    /// Resolve a media id to its URL, then fetch the bytes.
    pub(super) async fn download_media(&self, media_id: &str) -> Result<Vec<u8>, CompanionError> {
        let info: MediaInfo = self
            .client
            .get(format!("{}/{media_id}", self.base))
            .bearer_auth(&self.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CompanionError::Channel(format!("whatsapp media lookup failed: {e}")))?
            .json()
            .await
            .map_err(|e| CompanionError::Channel(format!("whatsapp media lookup parse: {e}")))?;

        let bytes = self
            .client
            .get(&info.url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| CompanionError::Channel(format!("whatsapp media download failed: {e}")))?
            .bytes()
            .await
            .map_err(|e| CompanionError::Channel(format!("whatsapp media read failed: {e}")))?;
        Ok(bytes.to_vec())
    }
}

pub(super) fn text_body(to: &str, text: &str) -> serde_json::Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "text",
        "text": { "body": text, "preview_url": false },
    })
}

pub(super) fn sticker_body(to: &str, media_id: &str) -> serde_json::Value {
    json!({
        "messaging_product": "whatsapp",
        "to": to,
        "type": "sticker",
        "sticker": { "id": media_id },
    })
}

/// PNG or WebP by magic number, JPEG otherwise.
pub(super) fn sniff_image_mime(image: &[u8]) -> &'static str {
    if image.starts_with(b"\x89PNG") {
        "image/png"
    } else if image.len() >= 12 && &image[..4] == b"RIFF" && &image[8..12] == b"WEBP" {
        "image/webp"
    } else {
        "image/jpeg"
    }
}

/// Split text into chunks of at most `max_len` bytes, preferring newline
/// boundaries and never cutting inside a UTF-8 character.
pub(super) fn split_message(text: &str, max_len: usize) -> Vec<&str> {
    if text.len() <= max_len {
        return vec![text];
    }

    let mut chunks = Vec::new();
    let mut start = 0;

    while start < text.len() {
        let mut end = (start + max_len).min(text.len());
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        let break_at = if end < text.len() {
            text[start..end]
                .rfind('\n')
                .map(|i| start + i + 1)
                .unwrap_or(end)
        } else {
            end
        };
        chunks.push(&text[start..break_at]);
        start = break_at;
    }

    chunks
}
