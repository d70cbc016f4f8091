//! Promotional task campaigns redeemable for premium trials.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::duration::GrantDuration;

/// Completion capacity: a number or `"unlimited"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaxCompletions {
    Unlimited,
    Limited(u32),
}

impl MaxCompletions {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.eq_ignore_ascii_case("unlimited") {
            return Some(Self::Unlimited);
        }
        raw.parse().ok().and_then(Self::limited)
    }

    /// A numeric capacity. Zero is not a capacity.
    pub fn limited(n: u32) -> Option<Self> {
        (n > 0).then_some(Self::Limited(n))
    }
}

impl Serialize for MaxCompletions {
    fn serialize<S: Serializer>(&self, s: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::Unlimited => s.serialize_str("unlimited"),
            Self::Limited(n) => s.serialize_u32(*n),
        }
    }
}

impl<'de> Deserialize<'de> for MaxCompletions {
    fn deserialize<D: Deserializer<'de>>(d: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Num(u32),
            Text(String),
        }
        match Raw::deserialize(d)? {
            Raw::Num(n) => Self::limited(n)
                .ok_or_else(|| serde::de::Error::custom("maxCompletions must be at least 1")),
            Raw::Text(t) => Self::parse(&t)
                .ok_or_else(|| serde::de::Error::custom(format!("invalid maxCompletions: {t}"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub user_id: String,
    pub completed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskCampaign {
    pub name: String,
    /// `skip` means no description.
    pub description: String,
    pub max_completions: MaxCompletions,
    pub key: String,
    pub key_link: String,
    /// `Nh`, `Nd` or `lifetime`.
    pub premium_duration: String,
    /// `Nh` or `Nd`, measured from creation.
    pub expire_duration: String,
    pub expire_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub completed_by: Vec<Completion>,
    #[serde(default)]
    pub is_expired: bool,
    #[serde(default)]
    pub notified_full: bool,
}

/// `{tasks: [...]}` wrapper stored at `config/tasks.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskFile {
    #[serde(default)]
    pub tasks: Vec<TaskCampaign>,
}

/// Arguments of `/addtask`, already split.
#[derive(Debug, Clone)]
pub struct NewTask {
    pub name: String,
    pub description: String,
    pub max_completions: MaxCompletions,
    pub key: String,
    pub key_link: String,
    pub premium_duration: GrantDuration,
    pub expire_duration: GrantDuration,
}

#[derive(Debug, Clone)]
pub enum AddTaskOutcome {
    Created(TaskCampaign),
    Duplicate,
}

/// Result of redeeming a task key. Checks run in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompletionOutcome {
    NotFound,
    Expired,
    Full,
    AlreadyCompleted,
    IncorrectKey,
    Completed {
        task_name: String,
        premium_duration: String,
        now_full: bool,
        max_completions: MaxCompletions,
    },
}

/// Owner-facing events found by the periodic task sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    Expired { name: String, completions: usize },
    Full { name: String, max: u32 },
}

impl TaskEvent {
    pub fn owner_message(&self) -> String {
        match self {
            Self::Expired { name, completions } => format!(
                "📢 Task \"{name}\" has expired and is no longer available. It was completed by {completions} users."
            ),
            Self::Full { name, max } => format!(
                "📢 Task \"{name}\" has reached its maximum completions ({max}) and is now full."
            ),
        }
    }
}

impl TaskCampaign {
    pub fn new(task: NewTask, now: DateTime<Utc>) -> Self {
        let expire_at = task.expire_duration.expiry_from(now).unwrap_or(now);
        Self {
            name: task.name,
            description: task.description,
            max_completions: task.max_completions,
            key: task.key,
            key_link: task.key_link,
            premium_duration: task.premium_duration.to_string(),
            expire_duration: task.expire_duration.to_string(),
            expire_at,
            created_at: now,
            completed_by: Vec::new(),
            is_expired: false,
            notified_full: false,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.is_expired || now > self.expire_at
    }

    pub fn is_full(&self) -> bool {
        match self.max_completions {
            MaxCompletions::Unlimited => false,
            MaxCompletions::Limited(n) => self.completed_by.len() >= n as usize,
        }
    }

    pub fn completed_by_user(&self, user_id: &str) -> bool {
        self.completed_by.iter().any(|c| c.user_id == user_id)
    }

    pub fn has_description(&self) -> bool {
        !self.description.eq_ignore_ascii_case("skip") && !self.description.is_empty()
    }

    /// Reward duration; malformed stored values fall back to one hour.
    pub fn reward(&self) -> GrantDuration {
        GrantDuration::parse(&self.premium_duration).unwrap_or(GrantDuration::Hours(1))
    }

    /// Validate a redemption and record it when accepted.
    pub fn redeem(&mut self, key: &str, user_id: &str, now: DateTime<Utc>) -> CompletionOutcome {
        if self.is_expired_at(now) {
            self.is_expired = true;
            return CompletionOutcome::Expired;
        }
        if self.is_full() {
            return CompletionOutcome::Full;
        }
        if self.completed_by_user(user_id) {
            return CompletionOutcome::AlreadyCompleted;
        }
        if self.key != key {
            return CompletionOutcome::IncorrectKey;
        }
        self.completed_by.push(Completion {
            user_id: user_id.to_string(),
            completed_at: now,
        });
        let now_full = self.is_full();
        // Fullness is announced by the redeeming call.
        if now_full {
            self.notified_full = true;
        }
        CompletionOutcome::Completed {
            task_name: self.name.clone(),
            premium_duration: self.premium_duration.clone(),
            now_full,
            max_completions: self.max_completions,
        }
    }

    /// Mark expiry and fullness once, returning what the owner should hear.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Option<TaskEvent> {
        if self.is_expired {
            return None;
        }
        if now > self.expire_at {
            self.is_expired = true;
            return Some(TaskEvent::Expired {
                name: self.name.clone(),
                completions: self.completed_by.len(),
            });
        }
        if let MaxCompletions::Limited(max) = self.max_completions {
            if self.is_full() && !self.notified_full {
                self.notified_full = true;
                return Some(TaskEvent::Full {
                    name: self.name.clone(),
                    max,
                });
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn campaign(max: MaxCompletions) -> TaskCampaign {
        TaskCampaign::new(
            NewTask {
                name: "Follow".into(),
                description: "skip".into(),
                max_completions: max,
                key: "SECRET".into(),
                key_link: "https://example.com".into(),
                premium_duration: GrantDuration::Hours(2),
                expire_duration: GrantDuration::Days(1),
            },
            Utc::now(),
        )
    }

    #[test]
    fn test_already_completed_is_rejected_even_with_right_key() {
        let now = Utc::now();
        let mut t = campaign(MaxCompletions::Unlimited);
        assert!(matches!(
            t.redeem("SECRET", "u1", now),
            CompletionOutcome::Completed { .. }
        ));
        assert_eq!(
            t.redeem("SECRET", "u1", now),
            CompletionOutcome::AlreadyCompleted
        );
        assert_eq!(t.completed_by.len(), 1);
    }

    #[test]
    fn test_incorrect_key_is_rejected_for_new_user() {
        let mut t = campaign(MaxCompletions::Unlimited);
        assert_eq!(
            t.redeem("secret", "u2", Utc::now()),
            CompletionOutcome::IncorrectKey
        );
        assert!(t.completed_by.is_empty());
    }

    #[test]
    fn test_full_and_now_full_flag() {
        let now = Utc::now();
        let mut t = campaign(MaxCompletions::Limited(1));
        match t.redeem("SECRET", "u1", now) {
            CompletionOutcome::Completed { now_full, .. } => assert!(now_full),
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(t.redeem("SECRET", "u2", now), CompletionOutcome::Full);
        assert!(t.notified_full);
        assert_eq!(t.sweep(now), None);
    }

    #[test]
    fn test_expired_redeem_marks_flag() {
        let mut t = campaign(MaxCompletions::Unlimited);
        let later = t.expire_at + Duration::minutes(1);
        assert_eq!(t.redeem("SECRET", "u1", later), CompletionOutcome::Expired);
        assert!(t.is_expired);
    }

    #[test]
    fn test_sweep_reports_once() {
        let now = Utc::now();
        let mut t = campaign(MaxCompletions::Limited(1));
        t.completed_by.push(Completion {
            user_id: "u1".into(),
            completed_at: now,
        });
        assert_eq!(
            t.sweep(now),
            Some(TaskEvent::Full {
                name: "Follow".into(),
                max: 1
            })
        );
        assert_eq!(t.sweep(now), None);

        let later = t.expire_at + Duration::seconds(1);
        assert!(matches!(t.sweep(later), Some(TaskEvent::Expired { completions: 1, .. })));
        assert_eq!(t.sweep(later), None);
    }

    #[test]
    fn test_max_completions_serde() {
        let t = campaign(MaxCompletions::Limited(5));
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["maxCompletions"], 5);
        assert_eq!(json["premiumDuration"], "2h");
        assert_eq!(json["expireDuration"], "1d");

        let parsed: MaxCompletions = serde_json::from_str("\"unlimited\"").unwrap();
        assert_eq!(parsed, MaxCompletions::Unlimited);
        let parsed: MaxCompletions = serde_json::from_str("\"10\"").unwrap();
        assert_eq!(parsed, MaxCompletions::Limited(10));
        let parsed: MaxCompletions = serde_json::from_str("3").unwrap();
        assert_eq!(parsed, MaxCompletions::Limited(3));
        assert!(serde_json::from_str::<MaxCompletions>("0").is_err());
        assert!(serde_json::from_str::<MaxCompletions>("\"0\"").is_err());
        assert_eq!(MaxCompletions::parse("0"), None);
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        let t = campaign(MaxCompletions::Unlimited);
        assert!(t.matches("FOLLOW"));
        assert!(!t.has_description());
        assert_eq!(t.reward(), GrantDuration::Hours(2));
    }
}
