//! Webhook endpoints: verification handshake and inbound events.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{DateTime, TimeZone, Utc};
use companion_core::message::{normalize_user_id, Attachment, AttachmentType, IncomingMessage};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use super::send::GraphApi;
use super::types::{WebhookContact, WebhookMessage, WebhookPayload};

pub(super) struct WebhookState {
    pub verify_token: String,
    pub tx: mpsc::Sender<IncomingMessage>,
    pub api: Arc<GraphApi>,
}

/// Query parameters of the `GET /webhook` verification request.
#[derive(Debug, Deserialize)]
pub(super) struct VerifyQuery {
    #[serde(rename = "hub.mode")]
    pub mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    pub verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    pub challenge: Option<String>,
}

pub(super) fn router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/webhook", get(verify).post(receive))
        .with_state(state)
}

/// Echo `hub.challenge` when the mode and token match.
pub(super) fn check_verification(query: &VerifyQuery, expected: &str) -> Option<String> {
    let subscribed = query.mode.as_deref() == Some("subscribe");
    let token_ok = !expected.is_empty() && query.verify_token.as_deref() == Some(expected);
    if subscribed && token_ok {
        query.challenge.clone()
    } else {
        None
    }
}

async fn verify(
    State(state): State<Arc<WebhookState>>,
    Query(query): Query<VerifyQuery>,
) -> Result<String, StatusCode> {
    match check_verification(&query, &state.verify_token) {
        Some(challenge) => {
            debug!("whatsapp: webhook verified");
            Ok(challenge)
        }
        None => {
            warn!("whatsapp: webhook verification rejected");
            Err(StatusCode::FORBIDDEN)
        }
    }
}

/// Acknowledge immediately; media download and forwarding run in the background.
async fn receive(
    State(state): State<Arc<WebhookState>>,
    Json(payload): Json<WebhookPayload>,
) -> StatusCode {
    tokio::spawn(async move {
        for (mut incoming, media_id) in extract_messages(payload) {
            if let Some(id) = media_id {
                match state.api.download_media(&id).await {
                    Ok(bytes) => {
                        if let Some(att) = incoming.attachments.first_mut() {
                            att.data = Some(bytes);
                        }
                    }
                    Err(e) => warn!("whatsapp: image download failed: {e}"),
                }
            }
            if state.tx.send(incoming).await.is_err() {
                warn!("whatsapp: receiver dropped, discarding message");
                return;
            }
        }
    });
    StatusCode::OK
}

/// Convert a webhook payload into messages, each with the media id to fetch (if any).
///
/// Only text and image messages are forwarded. Delivery receipts and other
/// message types are dropped.
pub(super) fn extract_messages(payload: WebhookPayload) -> Vec<(IncomingMessage, Option<String>)> {
    let mut out = Vec::new();
    for change in payload.entry.into_iter().flat_map(|e| e.changes) {
        let contacts = change.value.contacts;
        for msg in change.value.messages {
            if let Some(converted) = convert(msg, &contacts) {
                out.push(converted);
            }
        }
    }
    out
}

fn convert(
    msg: WebhookMessage,
    contacts: &[WebhookContact],
) -> Option<(IncomingMessage, Option<String>)> {
    let sender_id = normalize_user_id(&msg.from);
    if sender_id.is_empty() {
        return None;
    }
    let sender_name = contacts
        .iter()
        .find(|c| normalize_user_id(&c.wa_id) == sender_id)
        .and_then(|c| c.profile.as_ref())
        .and_then(|p| p.name.clone());

    let (text, media_id) = match msg.message_type.as_str() {
        "text" => (msg.text.map(|t| t.body)?, None),
        "image" => {
            let image = msg.image?;
            (image.caption.unwrap_or_default(), Some(image.id))
        }
        other => {
            debug!("whatsapp: ignoring {other} message from {sender_id}");
            return None;
        }
    };

    let attachments = match &media_id {
        Some(id) => vec![Attachment {
            file_type: AttachmentType::Image,
            url: Some(format!("whatsapp://media/{id}")),
            data: None,
            filename: None,
        }],
        None => Vec::new(),
    };

    Some((
        IncomingMessage {
            id: Uuid::new_v4(),
            channel: "whatsapp".to_string(),
            sender_id: sender_id.clone(),
            sender_name,
            text,
            timestamp: parse_timestamp(&msg.timestamp),
            attachments,
            reply_target: Some(sender_id),
        },
        media_id,
    ))
}

fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<i64>()
        .ok()
        .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
        .unwrap_or_else(Utc::now)
}
