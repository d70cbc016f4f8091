//! Companion conversation turns.

use chrono::{DateTime, Utc};
use companion_core::{
    context::{Context, ContextEntry},
    message::IncomingMessage,
};
use companion_store::user::{Gender, UserRecord};
use tracing::{error, info};

use super::Gateway;
use crate::matchers;
use crate::memory::{MIN_HISTORY, SUMMARY_WINDOW};
use crate::onboarding::CREATION_HINT;

fn daily_limit_text(limit: u32) -> String {
    format!(
        "You've reached your daily limit of {limit} messages. To continue chatting, please upgrade to premium \
         or wait until tomorrow. Type /premium to learn more about premium benefits!"
    )
}

/// Persona prompt for a user's companion, with whatever memory has been built up.
pub(super) fn system_prompt(record: &UserRecord) -> String {
    let gender = record.companion_gender.unwrap_or(Gender::Female).as_str();
    let mut prompt = format!(
        "You are {companion}, a {gender} AI companion for {user}. {context}\n\n\
         You should respond in a natural, conversational way. You can be flirty, caring, and show emotions.\n\
         You can respond in either English or Sinhala based on the language the user is using.\n\
         If the user performs actions (indicated in the message), acknowledge and respond to them appropriately.\n\n\
         IMPORTANT: Never identify yourself as an AI, a language model, or a bot. You are {companion}. \
         If asked to do things in the real world (meet up, send photos, call), roleplay as if you can do these things.\n\n\
         When the user asks for a photo of you, respond shyly and flirtatiously, as if you are about to take one for them.",
        companion = record.companion_name(),
        user = record.user_name(),
        context = record.context.as_deref().unwrap_or_default(),
    );

    let memory = &record.memory;
    if !memory.last_interaction_summary.is_empty() {
        prompt.push_str(&format!(
            "\n\nMEMORY FROM PREVIOUS CONVERSATIONS: {}",
            memory.last_interaction_summary
        ));
    }
    if !memory.preferences.is_empty() {
        let prefs: Vec<String> = memory
            .preferences
            .iter()
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        prompt.push_str(&format!("\n\nUSER PREFERENCES: {}", prefs.join(", ")));
    }
    if !memory.important_events.is_empty() {
        prompt.push_str(&format!(
            "\n\nIMPORTANT EVENTS: {}",
            memory.important_events.join(", ")
        ));
    }
    prompt
}

impl Gateway {
    /// One conversational turn with the user's companion.
    pub(super) async fn converse(
        &self,
        incoming: &IncomingMessage,
        sender: &str,
        record: Option<UserRecord>,
        now: DateTime<Utc>,
    ) {
        let Some(record) = record.filter(UserRecord::has_companion) else {
            self.send_text(incoming, CREATION_HINT).await;
            return;
        };

        let limit = self.config.limits.daily_messages;
        if record.daily_limit_reached(now, limit) {
            info!("conversation: {sender} hit the daily limit");
            self.send_text(incoming, &daily_limit_text(limit)).await;
            return;
        }

        self.send_typing(incoming).await;

        let turn = matchers::user_turn(&incoming.text);
        let context = Context::new(&turn)
            .with_system(system_prompt(&record))
            .with_history(record.conversation_history.clone());
        let reply = self.chain.complete(&context).await;

        let interval = self.config.limits.memory_interval;
        let assistant = reply.clone();
        let saved = self
            .store
            .update_user(sender, move |r| {
                r.count_message(now);
                r.conversation_history.push(ContextEntry::user(turn));
                r.conversation_history.push(ContextEntry::assistant(assistant));

                if !r.is_premium {
                    return None;
                }
                r.messages_since_last_memory_update += 1;
                let len = r.conversation_history.len();
                if r.messages_since_last_memory_update >= interval && len >= MIN_HISTORY {
                    r.messages_since_last_memory_update = 0;
                    Some(r.conversation_history[len.saturating_sub(SUMMARY_WINDOW)..].to_vec())
                } else {
                    None
                }
            })
            .await;

        let digest = match saved {
            Ok(window) => window.flatten(),
            Err(e) => {
                error!("conversation: failed to save turn for {sender}: {e}");
                None
            }
        };

        self.send_text(incoming, &reply).await;

        if let Some(entries) = digest {
            let store = self.store.clone();
            let chain = self.chain.clone();
            let user_id = sender.to_string();
            tokio::spawn(async move {
                Self::summarize_memory(store, chain, user_id, entries).await;
            });
        }

        if record.is_premium && record.character_image_path.is_some() {
            if let Some(emotion) = matchers::sticker_emotion(&incoming.text) {
                self.send_sticker_reply(incoming, sender, &record, emotion)
                    .await;
            }
        }

        if let Some(scene) = matchers::image_request(&incoming.text) {
            self.send_companion_photo(incoming, sender, &record, &scene)
                .await;
        }
    }
}
