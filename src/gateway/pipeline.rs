//! Message processing pipeline: one incoming message, start to finish.

use chrono::{DateTime, Local, Utc};
use companion_core::message::{normalize_user_id, IncomingMessage};
use companion_store::user::UserRecord;
use tracing::{error, info, warn};

use super::Gateway;
use crate::commands::{self, Command, CommandContext, PendingChange, Reply};
use crate::matchers::{self, NaturalReminder};
use crate::onboarding::{self, Companion, PendingState, Step, CREATION_HINT};

const REMINDER_TIME_HINT: &str = "I understood you want to set a reminder, but I couldn't understand the time. \
Try using the /remind command instead, like:\n\n/remind today at 12:02pm to eat lunch";

const COMMIT_ERROR: &str = "There was an error creating your AI companion. Please try again.";
const IMAGE_SAVE_ERROR: &str = "There was an error processing your image. Please try again.";
const RESET_ERROR: &str = "There was an error resetting your AI companion. Please try again later.";
const RESET_CANCELED: &str = "Reset canceled. Your AI companion is safe!";

fn not_registered(owner: &str) -> String {
    format!(
        "⚠️ *Bot Not Registered* ⚠️\n\nThis bot is currently not registered. \
         Please contact the bot owner at wa.me/{owner} to request registration."
    )
}

/// Text sent after a confirmed reset.
fn reset_done(record: &UserRecord, now: DateTime<Utc>) -> String {
    let mut text = String::from(
        "Your AI companion has been reset. You can create a new one by typing /create.",
    );
    let remaining = record
        .premium_expiry
        .filter(|at| *at > now)
        .map(|at| (at - now).num_minutes().max(1));
    if let (true, Some(minutes)) = (record.is_on_trial(), remaining) {
        let (kind, origin) = if record.is_task_trial {
            let origin = record
                .task_trial_task_name
                .as_deref()
                .map(|t| format!(" from task \"{t}\""))
                .unwrap_or_default();
            ("TASK", origin)
        } else {
            ("FREE", String::new())
        };
        text.push_str(&format!(
            "\n\n🎁 *{kind} TRIAL CONTINUES!* 🎁\nYour premium trial{origin} will continue with your new character. \
             You have approximately {minutes} {} remaining.",
            if minutes == 1 { "minute" } else { "minutes" }
        ));
    }
    text
}

impl Gateway {
    /// Process a single incoming message.
    pub(super) async fn handle_message(&self, incoming: IncomingMessage) {
        let sender = normalize_user_id(&incoming.sender_id);
        let text = incoming.text.trim().to_string();

        // --- 1. FILTER ---
        let own_number = normalize_user_id(&self.config.bot.bot_number);
        if sender.is_empty() || (!own_number.is_empty() && sender == own_number) {
            return;
        }
        if text.is_empty() && incoming.image().is_none() {
            return;
        }

        let preview = if text.chars().count() > 60 {
            format!("{}...", text.chars().take(60).collect::<String>())
        } else {
            text.clone()
        };
        info!("[{}] {sender}: {preview}", incoming.channel);

        let now = Utc::now();

        // --- 2. LICENSE GATE ---
        let command = Command::parse(&text);
        if command != Some(Command::Register) && !self.license.is_registered(now).await {
            self.send_text(&incoming, &not_registered(&self.config.bot.owner))
                .await;
            return;
        }

        // --- 3. ACTIVITY ---
        let record = match self
            .store
            .update_user(&sender, move |r| {
                r.last_interaction = Some(now);
                r.clone()
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!("failed to load user {sender}: {e}");
                None
            }
        };

        // --- 4. PENDING STATE ---
        if command != Some(Command::Cancel) {
            let pending = self.pending.lock().await.remove(&sender);
            if let Some(state) = pending {
                self.advance_pending(&incoming, &sender, state, now).await;
                self.flush_notices().await;
                return;
            }
        }

        // --- 5. COMMANDS ---
        if let Some(cmd) = command {
            let ctx = CommandContext {
                store: &self.store,
                config: &self.config,
                license: &self.license,
                sender_id: &sender,
                text: &text,
                now,
            };
            let reply = commands::handle(cmd, &ctx).await;
            self.deliver(&incoming, &sender, reply).await;
            self.flush_notices().await;
            return;
        }

        // --- 6. COLLABORATIVE PHOTO ---
        if text.starts_with("/collob") {
            if let Some(photo) = incoming.image() {
                self.handle_collab(&incoming, &sender, record, photo).await;
                self.flush_notices().await;
                return;
            }
        }

        // --- 7. NATURAL-LANGUAGE REMINDER ---
        if record.as_ref().is_some_and(UserRecord::has_companion) {
            let local_now = now.with_timezone(&Local);
            match matchers::natural_reminder(&text, &local_now) {
                Some(NaturalReminder::Parsed(req)) => {
                    let reply = match self
                        .store
                        .create_reminder(&sender, &req.text, req.time, req.recurring)
                        .await
                    {
                        Ok(reminder) => {
                            info!("reminders: {sender} set {} from chat", reminder.id);
                            commands::reminder_confirmation("I've set a reminder for you!", &req)
                        }
                        Err(e) => {
                            error!("reminders: failed to create for {sender}: {e}");
                            "❌ Sorry, I couldn't set that reminder. Please try again.".to_string()
                        }
                    };
                    self.send_text(&incoming, &reply).await;
                    return;
                }
                Some(NaturalReminder::BadTime) => {
                    self.send_text(&incoming, REMINDER_TIME_HINT).await;
                    return;
                }
                None => {}
            }
        }

        // --- 8. CONVERSATION ---
        self.converse(&incoming, &sender, record, now).await;
        self.flush_notices().await;
    }

    /// Apply everything a command asked for.
    async fn deliver(&self, incoming: &IncomingMessage, sender: &str, reply: Reply) {
        match reply.pending {
            Some(PendingChange::Enter(state)) => {
                self.pending.lock().await.insert(sender.to_string(), state);
            }
            Some(PendingChange::Clear) => {
                self.pending.lock().await.remove(sender);
            }
            None => {}
        }

        for text in &reply.messages {
            self.send_text(incoming, text).await;
        }
        for notice in &reply.notices {
            self.send_notice(notice).await;
        }

        if let Some(broadcast) = reply.broadcast {
            let mut sent = 0usize;
            let mut failed = 0usize;
            for to in &broadcast.recipients {
                match self.send_to(to, &broadcast.text).await {
                    Ok(()) => sent += 1,
                    Err(e) => {
                        warn!("broadcast to {to} failed: {e}");
                        failed += 1;
                    }
                }
            }
            info!("broadcast: delivered to {sent}, failed {failed}");
            let mut report = format!("📢 Task announcement sent to {sent} users.");
            if failed > 0 {
                report.push_str(&format!(" Failed for {failed} users."));
            }
            self.send_text(incoming, &report).await;
        }
    }

    async fn keep_pending(&self, sender: &str, state: PendingState) {
        self.pending.lock().await.insert(sender.to_string(), state);
    }

    /// Feed a message into the sender's onboarding or reset conversation.
    async fn advance_pending(
        &self,
        incoming: &IncomingMessage,
        sender: &str,
        state: PendingState,
        now: DateTime<Utc>,
    ) {
        let has_image = incoming.image().is_some();
        match state.clone().advance(&incoming.text, has_image) {
            Step::Prompt { next, reply } => {
                self.keep_pending(sender, next).await;
                self.send_text(incoming, &reply).await;
            }
            Step::Commit {
                companion,
                with_image,
            } => {
                self.commit_companion(incoming, sender, state, companion, with_image, now)
                    .await;
            }
            Step::ConfirmReset => self.confirm_reset(incoming, sender, now).await,
            Step::CancelReset => self.send_text(incoming, RESET_CANCELED).await,
        }
    }

    /// Persist a finished companion. On failure the state is kept for a retry.
    async fn commit_companion(
        &self,
        incoming: &IncomingMessage,
        sender: &str,
        state: PendingState,
        companion: Companion,
        with_image: bool,
        now: DateTime<Utc>,
    ) {
        let image_path = match incoming.image().filter(|_| with_image) {
            Some(bytes) => match self.store.save_character_image(sender, bytes).await {
                Ok(path) => Some(path),
                Err(e) => {
                    error!("onboarding: failed to save image for {sender}: {e}");
                    self.keep_pending(sender, state).await;
                    self.send_text(incoming, IMAGE_SAVE_ERROR).await;
                    return;
                }
            },
            None => None,
        };

        let trial_minutes = self.config.limits.trial_minutes;
        let saved = companion.clone();
        let result = self
            .store
            .upsert_user(sender, move |r| {
                onboarding::apply_commit(r, &saved, image_path, now, trial_minutes)
            })
            .await;

        match result {
            Ok(granted) => {
                info!(
                    "onboarding: {sender} created {} (trial: {granted})",
                    companion.companion_name
                );
                let welcome = onboarding::welcome_text(
                    &companion.companion_name,
                    with_image,
                    granted.then_some(trial_minutes),
                );
                self.send_text(incoming, &welcome).await;
                self.send_text(
                    incoming,
                    &onboarding::greeting(&companion.user_name, &companion.companion_name),
                )
                .await;
            }
            Err(e) => {
                error!("onboarding: failed to save companion for {sender}: {e}");
                self.keep_pending(sender, state).await;
                self.send_text(incoming, COMMIT_ERROR).await;
            }
        }
    }

    /// Drop the companion while keeping tier and quota bookkeeping.
    async fn confirm_reset(&self, incoming: &IncomingMessage, sender: &str, now: DateTime<Utc>) {
        let result = self
            .store
            .update_user(sender, move |r| {
                let old_image = r.character_image_path.take();
                *r = r.after_reset(now);
                (old_image, r.clone())
            })
            .await;

        let (old_image, record) = match result {
            Ok(Some(out)) => out,
            Ok(None) => {
                self.send_text(incoming, CREATION_HINT).await;
                return;
            }
            Err(e) => {
                error!("onboarding: reset failed for {sender}: {e}");
                self.keep_pending(sender, PendingState::ResetConfirmation)
                    .await;
                self.send_text(incoming, RESET_ERROR).await;
                return;
            }
        };

        if let Some(path) = old_image {
            if let Err(e) = self.store.delete_character_image(&path).await {
                warn!("onboarding: failed to delete {path}: {e}");
            }
        }
        info!("onboarding: {sender} reset (count {})", record.reset_count);

        self.send_text(incoming, &reset_done(&record, now)).await;

        let free_resets = self.config.limits.free_resets;
        if !record.is_premium && record.reset_count >= free_resets {
            self.send_text(
                incoming,
                &format!(
                    "Note: You've used {}/{free_resets} free resets. Your next reset will require a premium subscription.",
                    record.reset_count
                ),
            )
            .await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_reset_done_mentions_running_task_trial() {
        let now = Utc::now();
        let record = UserRecord {
            is_premium: true,
            is_task_trial: true,
            task_trial_task_name: Some("launch".into()),
            premium_expiry: Some(now + Duration::minutes(30)),
            ..Default::default()
        };
        let text = reset_done(&record, now);
        assert!(text.contains("*TASK TRIAL CONTINUES!*"));
        assert!(text.contains("from task \"launch\""));
        assert!(text.contains("approximately 30 minutes"));
    }

    #[test]
    fn test_reset_done_plain_without_trial() {
        let text = reset_done(&UserRecord::default(), Utc::now());
        assert!(!text.contains("TRIAL"));
        assert!(text.ends_with("/create."));
    }
}
