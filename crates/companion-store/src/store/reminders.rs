//! Reminder persistence.

use super::{read_json, write_json, Store};
use crate::reminder::{Recurrence, Reminder, ReminderFile};
use chrono::{DateTime, Utc};
use companion_core::error::CompanionError;
use uuid::Uuid;

const REMINDERS_FILE: &str = "reminders.json";

impl Store {
    async fn with_reminders<F, R>(&self, f: F) -> Result<R, CompanionError>
    where
        F: FnOnce(&mut Vec<Reminder>) -> (R, bool),
    {
        let path = self.config_path(REMINDERS_FILE);
        let _guard = self.lock(&path).await;
        let mut file: ReminderFile = read_json(&path).await?.unwrap_or_default();
        let (out, dirty) = f(&mut file.reminders);
        if dirty {
            write_json(&path, &file).await?;
        }
        Ok(out)
    }

    pub async fn create_reminder(
        &self,
        user_id: &str,
        text: &str,
        time: DateTime<Utc>,
        recurring: Option<Recurrence>,
    ) -> Result<Reminder, CompanionError> {
        let reminder = Reminder {
            id: Uuid::new_v4().simple().to_string()[..8].to_string(),
            user_id: user_id.to_string(),
            text: text.to_string(),
            time,
            recurring,
            created_at: Utc::now(),
        };
        self.with_reminders(|all| {
            all.push(reminder.clone());
            (reminder, true)
        })
        .await
    }

    /// A user's reminders, soonest first.
    pub async fn reminders_for(&self, user_id: &str) -> Result<Vec<Reminder>, CompanionError> {
        let mut mine = self
            .with_reminders(|all| {
                let mine: Vec<Reminder> =
                    all.iter().filter(|r| r.user_id == user_id).cloned().collect();
                (mine, false)
            })
            .await?;
        mine.sort_by_key(|r| r.time);
        Ok(mine)
    }

    /// Delete one of the user's reminders. Other users' ids never match.
    pub async fn delete_reminder(&self, user_id: &str, id: &str) -> Result<bool, CompanionError> {
        self.with_reminders(|all| {
            let before = all.len();
            all.retain(|r| !(r.user_id == user_id && r.id == id));
            let removed = all.len() != before;
            (removed, removed)
        })
        .await
    }

    pub async fn due_reminders(&self, now: DateTime<Utc>) -> Result<Vec<Reminder>, CompanionError> {
        self.with_reminders(|all| {
            let due: Vec<Reminder> = all.iter().filter(|r| r.time <= now).cloned().collect();
            (due, false)
        })
        .await
    }

    /// After delivery: advance a recurring reminder, drop a one-shot one.
    pub async fn finish_reminder(&self, id: &str, now: DateTime<Utc>) -> Result<(), CompanionError> {
        self.with_reminders(|all| {
            if let Some(pos) = all.iter().position(|r| r.id == id) {
                if !all[pos].reschedule(now) {
                    all.remove(pos);
                }
                ((), true)
            } else {
                ((), false)
            }
        })
        .await
    }
}
