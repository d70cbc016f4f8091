//! Companion photos: single-reference portraits and `/collob` pictures.

use chrono::{DateTime, Utc};
use companion_core::message::IncomingMessage;
use companion_store::user::UserRecord;
use rand::seq::SliceRandom;
use tracing::{error, info, warn};

use super::Gateway;
use crate::onboarding::CREATION_HINT;

const TAKING_PHOTO: &str = "Wait a minute, let me take a photo for you... 📸";
const PHOTO_CAPTION: &str = "I took this photo just for you! I think it turned out really nice 💖";
const PHOTO_FAILED: &str = "Oh, I'm so embarrassed! 🙈 I couldn't take that photo right now. Let's try something else together later! 💫";
const PHOTO_ERROR: &str = "Oops! 🙈 I'm having a little trouble with the photo right now. Maybe we could try again in a moment? Sometimes my camera can be a bit shy! 📸✨";

const COLLAB_USAGE: &str = "Please provide a description for our collaborative image. For example: '/collob us at the beach'";
const COLLAB_START: &str = "Creating our photo together... This might take a moment! 📸✨";
const COLLAB_CAPTION: &str = "Here's our photo together! I love how it turned out! 💖";
const COLLAB_FAILED: &str = "I'm sorry, I couldn't create our photo together. Let's try again later! 💫";
const COLLAB_ERROR: &str = "Oops! Something went wrong while creating our photo. Let's try again later! 📸✨";

const POSES: &[&str] = &[
    "smiling at the camera",
    "looking thoughtful",
    "laughing",
    "with a gentle expression",
    "waving hello",
    "in a casual pose",
    "looking excited",
    "with a warm smile",
];

fn image_limit_text(contact: &str) -> String {
    format!(
        "You've reached your daily free photo limit! 📸\n\nIf you want to see more of my photos, you'll need to \
         upgrade to a premium package. Premium users enjoy unlimited high-quality images and many other benefits!\n\n\
         To upgrade, contact {contact} or type /premium for more information."
    )
}

fn random_pose() -> &'static str {
    POSES.choose(&mut rand::thread_rng()).copied().unwrap_or(POSES[0])
}

fn after<'a>(lowered: &'a str, word: &str) -> Option<&'a str> {
    lowered
        .split_once(word)
        .map(|(_, rest)| rest.trim())
        .filter(|rest| !rest.is_empty())
}

/// Scene for a photo request that did not describe one.
pub(super) fn scene_from_keywords(message: &str) -> String {
    let lowered = message.to_lowercase();
    if lowered.contains("wearing") || lowered.contains("dressed") {
        format!("wearing {}", after(&lowered, "wearing").unwrap_or("something nice"))
    } else if lowered.contains("doing") {
        after(&lowered, "doing")
            .unwrap_or("doing something interesting")
            .to_string()
    } else if lowered.contains("garden") {
        "in a beautiful flower garden with butterflies".to_string()
    } else if lowered.contains("sleeping") {
        "sleeping peacefully".to_string()
    } else if lowered.contains("beach") {
        "at a beautiful beach".to_string()
    } else {
        random_pose().to_string()
    }
}

/// Portrait prompt that pins the generated face to the reference photo.
pub(super) fn portrait_prompt(name: &str, scene: &str) -> String {
    let lowered = scene.to_lowercase();
    let scene = if (lowered.contains("dress") || lowered.contains("wearing"))
        && !lowered.starts_with("wearing")
    {
        format!("wearing {scene}")
    } else if lowered.contains("sea") || lowered.contains("beach") {
        format!("at the beach or by the sea, {scene}")
    } else if lowered.contains("cosplay") {
        format!("in a cosplay outfit, {scene}")
    } else {
        scene.to_string()
    };

    format!(
        "This is a reference photo of a person named {name}.\n\n\
         TASK: Create a photorealistic image of THIS EXACT SAME PERSON {scene}.\n\n\
         CRITICAL REQUIREMENTS:\n\
         1. The output MUST show the EXACT SAME PERSON as in the reference image\n\
         2. Maintain the EXACT SAME face shape, eyes, nose, lips, and facial structure\n\
         3. Keep the same hair color, style, and length\n\
         4. Preserve the same skin tone and complexion\n\n\
         DO NOT change the person's identity or face in any way.\n\
         Make it appropriate and SFW.\n\n\
         This is a portrait continuation task - the face must be identical to the reference."
    )
}

/// Prompt for a picture of the companion (first reference) and the user (second).
pub(super) fn collab_prompt(user: &str, companion: &str, scene: &str) -> String {
    format!(
        "Create a new image showing these two people {user} and {companion} together {scene}.\n\
         The first image is the AI character, and the second image is the user.\n\
         Make sure both people appear in the output image together in the scenario described.\n\
         Keep their facial features and appearance consistent with the reference images.\n\
         Make it appropriate and SFW."
    )
}

impl Gateway {
    /// Take a photo "of" the companion and send it.
    ///
    /// Counters move only after the photo went out.
    pub(super) async fn send_companion_photo(
        &self,
        incoming: &IncomingMessage,
        sender: &str,
        record: &UserRecord,
        scene: &str,
    ) {
        let now = Utc::now();
        if record.image_limit_reached(now, self.config.limits.daily_images) {
            self.send_text(incoming, &image_limit_text(self.config.bot.contact()))
                .await;
            return;
        }

        self.send_text(incoming, TAKING_PHOTO).await;

        let scene = if scene.is_empty() {
            scene_from_keywords(&incoming.text)
        } else {
            scene.to_string()
        };

        let Some(reference) = self.character_image(sender, record).await else {
            self.send_text(incoming, PHOTO_FAILED).await;
            return;
        };

        info!("images: generating for {sender}: {scene}");
        let prompt = portrait_prompt(record.companion_name(), &scene);
        let image = match self.images.generate(&prompt, &[reference]).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("images: generation failed for {sender}: {e}");
                self.send_text(incoming, PHOTO_FAILED).await;
                return;
            }
        };

        if let Err(e) = self.send_photo(incoming, &image, PHOTO_CAPTION).await {
            error!("images: failed to send photo to {sender}: {e}");
            self.send_text(incoming, PHOTO_ERROR).await;
            return;
        }
        self.record_image(sender, now).await;
    }

    /// Handle a photo captioned `/collob <scene>`.
    pub(super) async fn handle_collab(
        &self,
        incoming: &IncomingMessage,
        sender: &str,
        record: Option<UserRecord>,
        user_photo: &[u8],
    ) {
        let Some(record) = record.filter(UserRecord::has_companion) else {
            self.send_text(incoming, CREATION_HINT).await;
            return;
        };

        let now = Utc::now();
        if record.image_limit_reached(now, self.config.limits.daily_images) {
            self.send_text(incoming, &image_limit_text(self.config.bot.contact()))
                .await;
            return;
        }

        let scene = incoming
            .text
            .trim()
            .trim_start_matches("/collob")
            .trim()
            .to_string();
        if scene.is_empty() {
            self.send_text(incoming, COLLAB_USAGE).await;
            return;
        }

        self.send_text(incoming, COLLAB_START).await;

        let Some(character) = self.character_image(sender, &record).await else {
            self.send_text(incoming, COLLAB_FAILED).await;
            return;
        };

        let prompt = collab_prompt(record.user_name(), record.companion_name(), &scene);
        let image = match self
            .images
            .generate(&prompt, &[character, user_photo.to_vec()])
            .await
        {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("images: collaborative generation failed for {sender}: {e}");
                self.send_text(incoming, COLLAB_FAILED).await;
                return;
            }
        };

        if let Err(e) = self.send_photo(incoming, &image, COLLAB_CAPTION).await {
            error!("images: failed to send collaborative photo to {sender}: {e}");
            self.send_text(incoming, COLLAB_ERROR).await;
            return;
        }
        self.record_image(sender, now).await;
    }

    pub(super) async fn character_image(&self, sender: &str, record: &UserRecord) -> Option<Vec<u8>> {
        let Some(path) = record.character_image_path.as_deref() else {
            info!("images: {sender} has no character image");
            return None;
        };
        match self.store.load_character_image(path).await {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("images: {e}");
                None
            }
        }
    }

    async fn record_image(&self, sender: &str, now: DateTime<Utc>) {
        if let Err(e) = self
            .store
            .update_user(sender, move |r| r.record_image(now))
            .await
        {
            error!("images: failed to count photo for {sender}: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scene_from_keywords() {
        assert_eq!(scene_from_keywords("show me you wearing a red dress"), "wearing a red dress");
        assert_eq!(scene_from_keywords("I'd love a pic in the garden"), "in a beautiful flower garden with butterflies");
        assert_eq!(scene_from_keywords("are you sleeping? pic please"), "sleeping peacefully");
        assert!(POSES.contains(&scene_from_keywords("a photo please").as_str()));
    }

    #[test]
    fn test_random_pose_varies() {
        let seen: std::collections::HashSet<&str> = (0..200).map(|_| random_pose()).collect();
        assert!(seen.len() > 1);
        assert!(seen.iter().all(|p| POSES.contains(p)));
    }

    #[test]
    fn test_portrait_prompt_enhances_scene() {
        let p = portrait_prompt("Rin", "a blue dress");
        assert!(p.contains("person named Rin"));
        assert!(p.contains("THIS EXACT SAME PERSON wearing a blue dress."));
        let p = portrait_prompt("Rin", "wearing a hat");
        assert!(p.contains("PERSON wearing a hat."));
        let p = portrait_prompt("Rin", "by the sea");
        assert!(p.contains("at the beach or by the sea, by the sea"));
    }

    #[test]
    fn test_collab_prompt_orders_people() {
        let p = collab_prompt("Alex", "Rin", "at the beach");
        assert!(p.starts_with("Create a new image showing these two people Alex and Rin together at the beach."));
        assert!(p.contains("The first image is the AI character"));
    }
}
