//! The per-user document: companion persona, memory, premium state and quotas.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use companion_core::context::ContextEntry;
use serde::{Deserialize, Serialize};

use crate::duration::GrantDuration;

/// History kept for premium users on every save.
pub const PREMIUM_HISTORY_CAP: usize = 20;
/// History kept for everyone else.
pub const FREE_HISTORY_CAP: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Gender {
    Male,
    Female,
}

impl Gender {
    /// Case-insensitive `male` / `female`.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "male" => Some(Self::Male),
            "female" => Some(Self::Female),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Male => "male",
            Self::Female => "female",
        }
    }

    /// Relationship word used in the default persona.
    pub fn partner_word(&self) -> &'static str {
        match self {
            Self::Male => "boyfriend",
            Self::Female => "girlfriend",
        }
    }
}

/// Long-term memory distilled from conversations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Memory {
    pub topics: BTreeMap<String, u32>,
    pub preferences: BTreeMap<String, String>,
    pub important_events: Vec<String>,
    pub last_interaction_summary: String,
}

impl Memory {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
            && self.preferences.is_empty()
            && self.important_events.is_empty()
            && self.last_interaction_summary.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyCounter {
    pub count: u32,
    /// `YYYY-MM-DD` in UTC.
    pub date: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetEntry {
    pub timestamp: DateTime<Utc>,
    pub character_name: String,
}

/// What a lazy expiry check found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expiry {
    /// A granted premium ran out.
    Premium,
    FreeTrial,
    TaskTrial { task_name: Option<String> },
}

impl Expiry {
    /// Notice for the user, only for trials.
    pub fn notice(&self) -> Option<String> {
        match self {
            Self::Premium => None,
            Self::FreeTrial => Some(
                "⏰ *Your Premium Trial Has Ended* ⏰\n\nYour free premium trial has expired. \
                 You've been returned to the free tier with limited features. \
                 Type /premium to upgrade and continue enjoying premium benefits!"
                    .to_string(),
            ),
            Self::TaskTrial {
                task_name: Some(name),
            } => Some(format!(
                "⏰ *Your Task Premium Trial Has Ended* ⏰\n\nYour premium trial from task \
                 \"{name}\" has expired. You've been returned to the free tier with limited \
                 features. Complete more tasks or type /premium to upgrade!"
            )),
            Self::TaskTrial { task_name: None } => Some(
                "⏰ *Your Premium Trial Has Ended* ⏰\n\nYour task premium trial has expired. \
                 You've been returned to the free tier with limited features. \
                 Type /premium to upgrade and continue enjoying premium benefits!"
                    .to_string(),
            ),
        }
    }
}

/// Stored at `user_data/{id}.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserRecord {
    // Companion.
    pub user_gender: Option<Gender>,
    pub companion_gender: Option<Gender>,
    pub user_name: Option<String>,
    pub companion_name: Option<String>,
    pub context: Option<String>,
    pub character_image_path: Option<String>,
    pub conversation_history: Vec<ContextEntry>,

    // Memory.
    pub memory: Memory,
    pub messages_since_last_memory_update: u32,

    // Premium.
    pub is_premium: bool,
    pub premium_expiry: Option<DateTime<Utc>>,
    pub premium_added_at: Option<DateTime<Utc>>,
    pub premium_added_by: Option<String>,
    pub premium_duration: Option<String>,
    pub premium_removed_at: Option<DateTime<Utc>>,
    pub premium_removed_by: Option<String>,
    pub premium_expired_at: Option<DateTime<Utc>>,

    // Trials.
    pub is_free_trial: bool,
    pub free_trial_start_time: Option<DateTime<Utc>>,
    pub is_task_trial: bool,
    pub task_trial_start_time: Option<DateTime<Utc>>,
    pub task_trial_task_name: Option<String>,

    // Quotas.
    pub daily_messages: Option<DailyCounter>,
    pub image_requests: BTreeMap<String, u32>,
    pub image_generation_count: u32,
    pub last_image_generation_time: Option<DateTime<Utc>>,

    // Resets.
    pub reset_count: u32,
    pub reset_history: Vec<ResetEntry>,

    // Auto-messages.
    pub auto_message_enabled: bool,
    pub last_interaction: Option<DateTime<Utc>>,
    pub last_auto_message: Option<DateTime<Utc>>,

    pub created_at: Option<DateTime<Utc>>,
}

/// `YYYY-MM-DD` key used by the daily counters.
pub fn day_key(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%d").to_string()
}

impl UserRecord {
    pub fn has_companion(&self) -> bool {
        self.companion_name.is_some()
    }

    pub fn companion_name(&self) -> &str {
        self.companion_name.as_deref().unwrap_or("your companion")
    }

    pub fn user_name(&self) -> &str {
        self.user_name.as_deref().unwrap_or("friend")
    }

    pub fn is_on_trial(&self) -> bool {
        self.is_free_trial || self.is_task_trial
    }

    /// Premium or any trial: no daily caps.
    pub fn is_unlimited(&self) -> bool {
        self.is_premium || self.is_on_trial()
    }

    /// Lifetime premium has no expiry.
    pub fn is_lifetime_premium(&self) -> bool {
        self.is_premium && self.premium_expiry.is_none()
    }

    pub fn history_cap(&self) -> usize {
        if self.is_premium {
            PREMIUM_HISTORY_CAP
        } else {
            FREE_HISTORY_CAP
        }
    }

    /// Keep only the newest entries allowed for this tier.
    pub fn trim_history(&mut self) {
        let cap = self.history_cap();
        let len = self.conversation_history.len();
        if len > cap {
            self.conversation_history.drain(..len - cap);
        }
    }

    /// Clear premium once its expiry has passed.
    ///
    /// Trials additionally lose their flags and the memory they built up.
    pub fn expire_premium(&mut self, now: DateTime<Utc>) -> Option<Expiry> {
        let expiry = self.premium_expiry?;
        if !self.is_premium || expiry > now {
            return None;
        }

        self.is_premium = false;
        self.premium_expired_at = Some(now);

        let outcome = if self.is_free_trial {
            Expiry::FreeTrial
        } else if self.is_task_trial {
            Expiry::TaskTrial {
                task_name: self.task_trial_task_name.clone(),
            }
        } else {
            return Some(Expiry::Premium);
        };

        self.is_free_trial = false;
        self.is_task_trial = false;
        self.memory = Memory::default();
        Some(outcome)
    }

    /// Whether the free daily message quota is used up.
    pub fn daily_limit_reached(&self, now: DateTime<Utc>, limit: u32) -> bool {
        if self.is_unlimited() {
            return false;
        }
        match &self.daily_messages {
            Some(counter) if counter.date == day_key(now) => counter.count >= limit,
            _ => false,
        }
    }

    /// Count one conversational message. Premium users are not counted.
    pub fn count_message(&mut self, now: DateTime<Utc>) {
        if self.is_premium {
            return;
        }
        let today = day_key(now);
        match self.daily_messages.as_mut() {
            Some(counter) if counter.date == today => counter.count += 1,
            _ => {
                self.daily_messages = Some(DailyCounter {
                    count: 1,
                    date: today,
                })
            }
        }
    }

    pub fn messages_today(&self, now: DateTime<Utc>) -> u32 {
        match &self.daily_messages {
            Some(c) if c.date == day_key(now) => c.count,
            _ => 0,
        }
    }

    pub fn images_today(&self, now: DateTime<Utc>) -> u32 {
        self.image_requests
            .get(&day_key(now))
            .copied()
            .unwrap_or(0)
    }

    pub fn image_limit_reached(&self, now: DateTime<Utc>, limit: u32) -> bool {
        !self.is_unlimited() && self.images_today(now) >= limit
    }

    /// Record a delivered image. Counters for earlier days are dropped.
    pub fn record_image(&mut self, now: DateTime<Utc>) {
        let today = day_key(now);
        self.image_requests.retain(|day, _| *day == today);
        *self.image_requests.entry(today).or_insert(0) += 1;
        self.image_generation_count += 1;
        self.last_image_generation_time = Some(now);
    }

    /// Grant premium from the owner or a task.
    pub fn grant_premium(&mut self, duration: GrantDuration, by: &str, now: DateTime<Utc>) {
        self.is_premium = true;
        self.premium_expiry = duration.expiry_from(now);
        self.premium_added_at = Some(now);
        self.premium_added_by = Some(by.to_string());
        self.premium_duration = Some(duration.describe());
    }

    pub fn revoke_premium(&mut self, by: &str, now: DateTime<Utc>) {
        self.is_premium = false;
        self.premium_expiry = None;
        self.premium_removed_at = Some(now);
        self.premium_removed_by = Some(by.to_string());
    }

    /// First-companion trial.
    pub fn start_free_trial(&mut self, now: DateTime<Utc>, minutes: i64) {
        self.is_premium = true;
        self.is_free_trial = true;
        self.free_trial_start_time = Some(now);
        self.premium_expiry = Some(now + Duration::minutes(minutes));
        self.premium_added_at = Some(now);
        self.premium_added_by = Some("system".to_string());
        self.premium_duration = Some(if minutes % 60 == 0 {
            format!("{}h", minutes / 60)
        } else {
            format!("{minutes}m")
        });
        self.image_generation_count = 0;
        self.daily_messages = Some(DailyCounter {
            count: 0,
            date: day_key(now),
        });
    }

    /// Task reward: a premium trial tagged with the task name.
    pub fn start_task_trial(&mut self, task: &str, duration: GrantDuration, now: DateTime<Utc>) {
        self.grant_premium(duration, "task", now);
        self.is_task_trial = true;
        self.task_trial_start_time = Some(now);
        self.task_trial_task_name = Some(task.to_string());
        self.image_generation_count = 0;
        self.daily_messages = Some(DailyCounter {
            count: 0,
            date: day_key(now),
        });
    }

    /// The record left behind after a confirmed reset.
    ///
    /// Premium, trial, quota and reset bookkeeping survive; the companion,
    /// its history and memory do not. Trials do not consume a free reset.
    pub fn after_reset(&self, now: DateTime<Utc>) -> UserRecord {
        let mut reset_history = self.reset_history.clone();
        reset_history.push(ResetEntry {
            timestamp: now,
            character_name: self.companion_name.clone().unwrap_or_default(),
        });
        UserRecord {
            is_premium: self.is_premium,
            premium_expiry: self.premium_expiry,
            premium_added_at: self.premium_added_at,
            premium_added_by: self.premium_added_by.clone(),
            premium_duration: self.premium_duration.clone(),
            is_free_trial: self.is_free_trial,
            free_trial_start_time: self.free_trial_start_time,
            is_task_trial: self.is_task_trial,
            task_trial_start_time: self.task_trial_start_time,
            task_trial_task_name: self.task_trial_task_name.clone(),
            daily_messages: self.daily_messages.clone(),
            image_requests: self.image_requests.clone(),
            image_generation_count: self.image_generation_count,
            last_image_generation_time: self.last_image_generation_time,
            reset_count: if self.is_on_trial() {
                self.reset_count
            } else {
                self.reset_count + 1
            },
            reset_history,
            auto_message_enabled: self.auto_message_enabled,
            last_interaction: self.last_interaction,
            created_at: self.created_at,
            ..UserRecord::default()
        }
    }

    /// A user who never reset a companion is on their first one.
    pub fn is_first_companion(&self) -> bool {
        self.reset_history.is_empty()
    }

    /// Time until the UTC day rolls over, as "Xh Ym".
    pub fn time_until_reset(now: DateTime<Utc>) -> String {
        let tomorrow = (now + Duration::days(1))
            .date_naive()
            .and_hms_opt(0, 0, 0)
            .map(|t| t.and_utc())
            .unwrap_or(now);
        let left = tomorrow - now;
        format!("{}h {}m", left.num_hours(), left.num_minutes() % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(n: usize) -> Vec<ContextEntry> {
        (0..n).map(|i| ContextEntry::user(format!("m{i}"))).collect()
    }

    #[test]
    fn test_trim_history_keeps_suffix_for_free_users() {
        let mut r = UserRecord {
            conversation_history: entries(15),
            ..Default::default()
        };
        r.trim_history();
        assert_eq!(r.conversation_history.len(), FREE_HISTORY_CAP);
        assert_eq!(r.conversation_history[0].content, "m5");
        assert_eq!(r.conversation_history[9].content, "m14");
    }

    #[test]
    fn test_trim_history_premium_cap() {
        let mut r = UserRecord {
            is_premium: true,
            conversation_history: entries(25),
            ..Default::default()
        };
        r.trim_history();
        assert_eq!(r.conversation_history.len(), PREMIUM_HISTORY_CAP);
        assert_eq!(r.conversation_history[0].content, "m5");
    }

    #[test]
    fn test_trim_history_short_is_untouched() {
        let mut r = UserRecord {
            conversation_history: entries(3),
            ..Default::default()
        };
        r.trim_history();
        assert_eq!(r.conversation_history.len(), 3);
    }

    #[test]
    fn test_expire_free_trial_clears_flags_and_memory() {
        let now = Utc::now();
        let mut r = UserRecord::default();
        r.start_free_trial(now - Duration::hours(2), 60);
        r.memory.topics.insert("music".into(), 2);

        let expiry = r.expire_premium(now);
        assert_eq!(expiry, Some(Expiry::FreeTrial));
        assert!(!r.is_premium);
        assert!(!r.is_free_trial);
        assert!(r.memory.is_empty());
        assert_eq!(r.premium_expired_at, Some(now));
        assert!(expiry.unwrap().notice().unwrap().contains("Trial Has Ended"));
    }

    #[test]
    fn test_expire_task_trial_names_task() {
        let now = Utc::now();
        let mut r = UserRecord::default();
        r.start_task_trial("Follow us", GrantDuration::Hours(1), now - Duration::hours(3));
        let notice = r.expire_premium(now).unwrap().notice().unwrap();
        assert!(notice.contains("\"Follow us\""));
        assert!(!r.is_task_trial);
    }

    #[test]
    fn test_expire_granted_premium_keeps_memory_and_has_no_notice() {
        let now = Utc::now();
        let mut r = UserRecord::default();
        r.grant_premium(GrantDuration::Hours(1), "owner", now - Duration::hours(2));
        r.memory.last_interaction_summary = "talked about jazz".into();
        assert_eq!(r.expire_premium(now), Some(Expiry::Premium));
        assert!(!r.memory.is_empty());
        assert_eq!(Expiry::Premium.notice(), None);
    }

    #[test]
    fn test_lifetime_and_future_premium_do_not_expire() {
        let now = Utc::now();
        let mut lifetime = UserRecord::default();
        lifetime.grant_premium(GrantDuration::Lifetime, "owner", now);
        assert_eq!(lifetime.expire_premium(now + Duration::days(999)), None);
        assert!(lifetime.is_lifetime_premium());

        let mut timed = UserRecord::default();
        timed.grant_premium(GrantDuration::Days(1), "owner", now);
        assert_eq!(timed.expire_premium(now), None);
        assert!(timed.is_premium);
    }

    #[test]
    fn test_daily_limit_and_day_rollover() {
        let now = Utc::now();
        let mut r = UserRecord {
            daily_messages: Some(DailyCounter {
                count: 100,
                date: day_key(now),
            }),
            ..Default::default()
        };
        assert!(r.daily_limit_reached(now, 100));
        assert!(!r.daily_limit_reached(now + Duration::days(1), 100));

        r.count_message(now + Duration::days(1));
        assert_eq!(r.messages_today(now + Duration::days(1)), 1);
    }

    #[test]
    fn test_trials_bypass_daily_limit() {
        let now = Utc::now();
        let r = UserRecord {
            is_task_trial: true,
            daily_messages: Some(DailyCounter {
                count: 500,
                date: day_key(now),
            }),
            ..Default::default()
        };
        assert!(!r.daily_limit_reached(now, 100));
    }

    #[test]
    fn test_premium_messages_are_not_counted() {
        let now = Utc::now();
        let mut r = UserRecord {
            is_premium: true,
            ..Default::default()
        };
        r.count_message(now);
        assert!(r.daily_messages.is_none());
    }

    #[test]
    fn test_record_image_prunes_old_days() {
        let now = Utc::now();
        let mut r = UserRecord::default();
        r.image_requests.insert("2001-01-01".into(), 3);
        r.record_image(now);
        r.record_image(now);
        assert_eq!(r.images_today(now), 2);
        assert_eq!(r.image_requests.len(), 1);
        assert_eq!(r.image_generation_count, 2);
        assert!(r.image_limit_reached(now, 2));
    }

    #[test]
    fn test_after_reset_preserves_bookkeeping() {
        let now = Utc::now();
        let mut r = UserRecord {
            companion_name: Some("Rin".into()),
            user_name: Some("Alex".into()),
            conversation_history: entries(4),
            reset_count: 1,
            auto_message_enabled: true,
            ..Default::default()
        };
        r.grant_premium(GrantDuration::Days(3), "owner", now);
        r.memory.topics.insert("travel".into(), 1);

        let fresh = r.after_reset(now);
        assert!(!fresh.has_companion());
        assert!(fresh.conversation_history.is_empty());
        assert!(fresh.memory.is_empty());
        assert!(fresh.is_premium);
        assert_eq!(fresh.reset_count, 2);
        assert_eq!(fresh.reset_history.len(), 1);
        assert_eq!(fresh.reset_history[0].character_name, "Rin");
        assert!(fresh.auto_message_enabled);
    }

    #[test]
    fn test_reset_during_trial_is_free() {
        let now = Utc::now();
        let mut r = UserRecord {
            companion_name: Some("Rin".into()),
            ..Default::default()
        };
        r.start_free_trial(now, 60);
        let fresh = r.after_reset(now);
        assert_eq!(fresh.reset_count, 0);
        assert!(fresh.is_free_trial);
    }

    #[test]
    fn test_camel_case_document_shape() {
        let mut r = UserRecord::default();
        r.start_free_trial(Utc::now(), 60);
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["isPremium"], true);
        assert_eq!(json["isFreeTrial"], true);
        assert_eq!(json["premiumAddedBy"], "system");
        assert_eq!(json["premiumDuration"], "1h");
        assert!(json["memory"]["importantEvents"].is_array());
    }

    #[test]
    fn test_sparse_document_loads_with_defaults() {
        let r: UserRecord =
            serde_json::from_str(r#"{"companionName":"Rin","userGender":"male"}"#).unwrap();
        assert_eq!(r.companion_name.as_deref(), Some("Rin"));
        assert_eq!(r.user_gender, Some(Gender::Male));
        assert!(r.conversation_history.is_empty());
        assert_eq!(r.reset_count, 0);
    }
}
