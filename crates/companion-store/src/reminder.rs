//! User reminders, one-shot or recurring.

use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

impl Recurrence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Monthly => "monthly",
        }
    }

    /// The next occurrence after `from`.
    pub fn advance(&self, from: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => from + Duration::days(1),
            Self::Weekly => from + Duration::weeks(1),
            Self::Monthly => from
                .checked_add_months(Months::new(1))
                .unwrap_or(from + Duration::days(30)),
        }
    }
}

impl fmt::Display for Recurrence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    /// Short id shown to the user for `/delreminder`.
    pub id: String,
    pub user_id: String,
    pub text: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub recurring: Option<Recurrence>,
    pub created_at: DateTime<Utc>,
}

/// `{reminders: [...]}` wrapper stored at `config/reminders.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReminderFile {
    #[serde(default)]
    pub reminders: Vec<Reminder>,
}

impl Reminder {
    /// Message delivered when the reminder fires.
    pub fn delivery_text(&self, companion: &str) -> String {
        let mut text = format!(
            "⏰ *Reminder* ⏰\n\nHey! {companion} here. You asked me to remind you to *{}*.",
            self.text
        );
        if let Some(r) = self.recurring {
            text.push_str(&format!("\n\n🔄 I'll remind you again ({r})."));
        }
        text
    }

    /// Move a recurring reminder past `now`. Returns false for one-shot reminders.
    pub fn reschedule(&mut self, now: DateTime<Utc>) -> bool {
        let Some(rec) = self.recurring else {
            return false;
        };
        let mut next = rec.advance(self.time);
        while next <= now {
            next = rec.advance(next);
        }
        self.time = next;
        true
    }
}
