//! Periodic jobs: reminders, auto-messages, task and premium expiry, auto-backup.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use companion_core::context::{Context, ContextEntry};
use companion_store::UserRecord;
use tracing::{error, info, warn};

use super::conversation::system_prompt;
use super::Gateway;

/// Ask for a check-in after `hours` of silence.
fn check_in_request(hours: i64) -> String {
    format!(
        "(The user has been away for about {hours} hours. Send them a short, caring message in character \
         to check in on them. One or two sentences, no questions about being an AI.)"
    )
}

fn check_in_fallback(record: &UserRecord) -> String {
    format!(
        "Hey {}! I've been thinking about you. How's your day going? 💭",
        record.user_name()
    )
}

/// Whether a user is due an auto-message at `now`.
pub(super) fn wants_check_in(record: &UserRecord, now: DateTime<Utc>, inactivity_hours: i64) -> bool {
    if !record.auto_message_enabled || !record.has_companion() {
        return false;
    }
    let Some(last) = record.last_interaction else {
        return false;
    };
    now - last >= Duration::hours(inactivity_hours)
        && record.last_auto_message.map_or(true, |sent| sent < last)
}

impl Gateway {
    /// Background task: run every job once per poll interval.
    pub(super) async fn scheduler_loop(self: Arc<Self>) {
        let poll = std::time::Duration::from_secs(self.config.scheduler.poll_interval_secs.max(1));
        loop {
            tokio::time::sleep(poll).await;
            self.scheduler_tick(Utc::now()).await;
        }
    }

    pub(super) async fn scheduler_tick(&self, now: DateTime<Utc>) {
        self.deliver_reminders(now).await;
        self.send_check_ins(now).await;
        self.sweep_tasks(now).await;

        match self.store.sweep_premium_expiry().await {
            Ok(0) => {}
            Ok(n) => info!("scheduler: expired premium for {n} users"),
            Err(e) => error!("scheduler: premium sweep failed: {e}"),
        }

        self.auto_backup(now).await;
        self.flush_notices().await;
    }

    async fn deliver_reminders(&self, now: DateTime<Utc>) {
        let due = match self.store.due_reminders(now).await {
            Ok(d) => d,
            Err(e) => {
                error!("scheduler: failed to read reminders: {e}");
                return;
            }
        };

        for reminder in due {
            let companion = match self.store.get_user(&reminder.user_id).await {
                Ok(Some(r)) => r.companion_name().to_string(),
                _ => "your companion".to_string(),
            };
            match self
                .send_to(&reminder.user_id, &reminder.delivery_text(&companion))
                .await
            {
                Ok(()) => info!("scheduler: delivered reminder {}", reminder.id),
                Err(e) => warn!("scheduler: failed to deliver reminder {}: {e}", reminder.id),
            }
            if let Err(e) = self.store.finish_reminder(&reminder.id, now).await {
                error!("scheduler: failed to finish reminder {}: {e}", reminder.id);
            }
        }
    }

    async fn send_check_ins(&self, now: DateTime<Utc>) {
        let hours = self.config.auto_message.inactivity_hours;
        let users = match self.store.all_users().await {
            Ok(u) => u,
            Err(e) => {
                error!("scheduler: failed to list users: {e}");
                return;
            }
        };

        for (user_id, record) in users {
            if !wants_check_in(&record, now, hours) {
                continue;
            }

            let context = Context::new(&check_in_request(hours))
                .with_system(system_prompt(&record))
                .with_history(record.conversation_history.clone());
            let text = match self.chain.try_complete(&context).await {
                Ok(resp) if !resp.text.trim().is_empty() => resp.text,
                Ok(_) => check_in_fallback(&record),
                Err(e) => {
                    warn!("scheduler: check-in generation failed for {user_id}: {e}");
                    check_in_fallback(&record)
                }
            };

            let entry = text.clone();
            let saved = self
                .store
                .update_user(&user_id, move |r| {
                    r.conversation_history.push(ContextEntry::assistant(entry));
                    r.last_auto_message = Some(now);
                })
                .await;
            if let Err(e) = saved {
                error!("scheduler: failed to record check-in for {user_id}: {e}");
                continue;
            }

            match self.send_to(&user_id, &text).await {
                Ok(()) => info!("scheduler: sent check-in to {user_id}"),
                Err(e) => warn!("scheduler: failed to send check-in to {user_id}: {e}"),
            }
        }
    }

    async fn sweep_tasks(&self, now: DateTime<Utc>) {
        let events = match self.store.sweep_tasks(now).await {
            Ok(e) => e,
            Err(e) => {
                error!("scheduler: task sweep failed: {e}");
                return;
            }
        };
        let owner = &self.config.bot.owner;
        for event in events {
            info!("scheduler: {event:?}");
            if owner.is_empty() {
                continue;
            }
            if let Err(e) = self.send_to(owner, &event.owner_message()).await {
                warn!("scheduler: failed to notify owner: {e}");
            }
        }
    }

    async fn auto_backup(&self, now: DateTime<Utc>) {
        let settings = match self.store.backup_settings().await {
            Ok(s) => s,
            Err(e) => {
                error!("scheduler: failed to read backup settings: {e}");
                return;
            }
        };
        if !settings.auto_backup {
            return;
        }
        let interval = Duration::hours(self.config.backup.interval_hours);
        if settings.last_backup.is_some_and(|last| now - last < interval) {
            return;
        }
        match self.store.create_backup(&self.config.backup.path(), now).await {
            Ok(path) => info!("scheduler: auto backup written to {}", path.display()),
            Err(e) => error!("scheduler: auto backup failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn companion_user(now: DateTime<Utc>) -> UserRecord {
        UserRecord {
            companion_name: Some("Rin".into()),
            auto_message_enabled: true,
            last_interaction: Some(now - Duration::hours(7)),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_in_after_inactivity() {
        let now = Utc::now();
        assert!(wants_check_in(&companion_user(now), now, 6));
    }

    #[test]
    fn test_no_second_check_in_without_new_interaction() {
        let now = Utc::now();
        let mut record = companion_user(now);
        record.last_auto_message = Some(now - Duration::hours(1));
        assert!(!wants_check_in(&record, now, 6));
    }

    #[test]
    fn test_check_in_requires_opt_in_and_silence() {
        let now = Utc::now();
        let mut record = companion_user(now);
        record.auto_message_enabled = false;
        assert!(!wants_check_in(&record, now, 6));

        let mut record = companion_user(now);
        record.last_interaction = Some(now - Duration::hours(2));
        assert!(!wants_check_in(&record, now, 6));
    }
}
