//! Premium sticker replies.

use companion_core::message::IncomingMessage;
use companion_store::user::UserRecord;
use tracing::{info, warn};

use super::Gateway;
use crate::matchers::Emotion;

/// Sticker prompt that keeps the companion's face from the reference photo.
pub(super) fn sticker_prompt(name: &str, emotion: Emotion) -> String {
    format!(
        "This is a reference photo of a person named {name}.\n\n\
         Create a cute sticker of THIS EXACT SAME PERSON, head and shoulders, {}.\n\
         Keep the same face, hair and skin tone as the reference.\n\
         Use a plain white background with a thin white outline around the person, \
         no text, no watermark. Make it appropriate and SFW.",
        emotion.expression()
    )
}

impl Gateway {
    /// Follow a chat reply with a sticker of the companion.
    ///
    /// Failures are only logged; the text reply already went out.
    pub(super) async fn send_sticker_reply(
        &self,
        incoming: &IncomingMessage,
        sender: &str,
        record: &UserRecord,
        emotion: Emotion,
    ) {
        let Some(reference) = self.character_image(sender, record).await else {
            return;
        };

        let prompt = sticker_prompt(record.companion_name(), emotion);
        let image = match self.images.generate(&prompt, &[reference]).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("stickers: generation failed for {sender}: {e}");
                return;
            }
        };

        match self.send_sticker(incoming, &image).await {
            Ok(()) => info!("stickers: sent {emotion:?} sticker to {sender}"),
            Err(e) => warn!("stickers: failed to send to {sender}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sticker_prompt_names_person_and_mood() {
        let p = sticker_prompt("Rin", Emotion::Laughing);
        assert!(p.contains("person named Rin"));
        assert!(p.contains("laughing out loud"));
        assert!(p.contains("plain white background"));
    }
}
