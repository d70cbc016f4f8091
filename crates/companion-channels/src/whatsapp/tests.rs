use super::send::{sniff_image_mime, split_message, sticker_body, text_body, MAX_TEXT_LEN};
use super::sticker::{to_sticker, STICKER_SIZE};
use super::types::WebhookPayload;
use super::webhook::{check_verification, extract_messages, VerifyQuery};
use super::WhatsAppChannel;
use companion_core::config::WhatsAppConfig;
use companion_core::traits::Channel;

fn payload(json: &str) -> WebhookPayload {
    serde_json::from_str(json).unwrap()
}

#[test]
fn test_split_short_message() {
    assert_eq!(split_message("hello", MAX_TEXT_LEN), vec!["hello"]);
}

#[test]
fn test_split_prefers_newlines() {
    let text = format!("{}\n{}", "a".repeat(3000), "b".repeat(3000));
    let chunks = split_message(&text, MAX_TEXT_LEN);
    assert_eq!(chunks.len(), 2);
    assert!(chunks[0].ends_with('\n'));
    assert_eq!(chunks[1], "b".repeat(3000));
}

#[test]
fn test_split_never_cuts_multibyte_chars() {
    let text = "💖".repeat(2000);
    let chunks = split_message(&text, MAX_TEXT_LEN);
    assert!(chunks.iter().all(|c| c.len() <= MAX_TEXT_LEN));
    assert_eq!(chunks.concat(), text);
}

#[test]
fn test_text_body_shape() {
    let body = text_body("15550100", "hi");
    assert_eq!(body["messaging_product"], "whatsapp");
    assert_eq!(body["to"], "15550100");
    assert_eq!(body["text"]["body"], "hi");
}

#[test]
fn test_sniff_image_mime() {
    assert_eq!(sniff_image_mime(b"\x89PNG\r\n\x1a\n"), "image/png");
    assert_eq!(sniff_image_mime(&[0xFF, 0xD8, 0xFF]), "image/jpeg");
    assert_eq!(sniff_image_mime(b"RIFF\x10\0\0\0WEBPVP8L"), "image/webp");
    assert_eq!(sniff_image_mime(b"RIFF"), "image/jpeg");
}

#[test]
fn test_sticker_body_shape() {
    let body = sticker_body("15550100", "media-1");
    assert_eq!(body["type"], "sticker");
    assert_eq!(body["sticker"]["id"], "media-1");
}

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba([200, 40, 90, 255]));
    let mut buf = std::io::Cursor::new(Vec::new());
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut buf, image::ImageFormat::Png)
        .unwrap();
    buf.into_inner()
}

#[test]
fn test_sticker_is_square_webp() {
    let webp = to_sticker(&png(300, 150)).unwrap();
    assert_eq!(sniff_image_mime(&webp), "image/webp");

    let decoded = image::load_from_memory(&webp).unwrap().to_rgba8();
    assert_eq!(decoded.dimensions(), (STICKER_SIZE, STICKER_SIZE));
    // Letterboxed: transparent above, opaque in the middle.
    assert_eq!(decoded.get_pixel(256, 10)[3], 0);
    assert_eq!(decoded.get_pixel(256, 256)[3], 255);
}

#[test]
fn test_sticker_rejects_non_images() {
    assert!(to_sticker(b"not an image").is_err());
}

#[test]
fn test_verification_echoes_challenge() {
    let query = VerifyQuery {
        mode: Some("subscribe".into()),
        verify_token: Some("secret".into()),
        challenge: Some("12345".into()),
    };
    assert_eq!(check_verification(&query, "secret"), Some("12345".into()));
    assert_eq!(check_verification(&query, "other"), None);
}

#[test]
fn test_verification_rejects_empty_expected_token() {
    let query = VerifyQuery {
        mode: Some("subscribe".into()),
        verify_token: Some(String::new()),
        challenge: Some("1".into()),
    };
    assert_eq!(check_verification(&query, ""), None);
}

#[test]
fn test_extract_text_message_with_profile_name() {
    let p = payload(
        r#"{"object":"whatsapp_business_account","entry":[{"changes":[{"value":{
            "contacts":[{"wa_id":"15550100","profile":{"name":"Alex"}}],
            "messages":[{"from":"15550100","id":"wamid.1","timestamp":"1700000000","type":"text","text":{"body":"/help"}}]
        }}]}]}"#,
    );
    let messages = extract_messages(p);
    assert_eq!(messages.len(), 1);
    let (msg, media) = &messages[0];
    assert_eq!(msg.sender_id, "15550100");
    assert_eq!(msg.sender_name.as_deref(), Some("Alex"));
    assert_eq!(msg.text, "/help");
    assert_eq!(msg.timestamp.timestamp(), 1_700_000_000);
    assert_eq!(msg.target(), "15550100");
    assert!(media.is_none());
}

#[test]
fn test_extract_image_message_uses_caption() {
    let p = payload(
        r#"{"entry":[{"changes":[{"value":{
            "messages":[{"from":"15550100","id":"wamid.2","timestamp":"1700000000","type":"image",
                "image":{"id":"MEDIA1","mime_type":"image/jpeg","caption":"/collob at the beach"}}]
        }}]}]}"#,
    );
    let messages = extract_messages(p);
    let (msg, media) = &messages[0];
    assert_eq!(msg.text, "/collob at the beach");
    assert_eq!(media.as_deref(), Some("MEDIA1"));
    assert_eq!(msg.attachments.len(), 1);
}

#[test]
fn test_extract_drops_statuses_and_unsupported_types() {
    let p = payload(
        r#"{"entry":[{"changes":[
            {"value":{"statuses":[{"id":"wamid.3","status":"read"}]}},
            {"value":{"messages":[{"from":"15550100","id":"wamid.4","timestamp":"1","type":"sticker"}]}}
        ]}]}"#,
    );
    assert!(extract_messages(p).is_empty());
}

#[tokio::test]
async fn test_channel_name_and_stop_before_start() {
    let channel = WhatsAppChannel::new(WhatsAppConfig::default());
    assert_eq!(channel.name(), "whatsapp");
    assert_eq!(channel.bind_addr(), "0.0.0.0:8080");
    assert!(channel.stop().await.is_ok());
}
