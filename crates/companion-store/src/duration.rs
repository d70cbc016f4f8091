//! Premium grant durations: `lifetime`, `Nh`, `Nd`.

use chrono::{DateTime, Duration, Utc};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantDuration {
    Lifetime,
    Hours(u32),
    Days(u32),
}

/// Why an owner-supplied grant duration was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurationError {
    HoursOutOfRange,
    DaysOutOfRange,
    Format,
}

impl fmt::Display for DurationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::HoursOutOfRange => {
                "❌ Invalid hours duration. Please use a value between 1h and 24h."
            }
            Self::DaysOutOfRange => "❌ Invalid days duration. Please use a value between 1d and 30d.",
            Self::Format => {
                "❌ Invalid duration format. Use 'lifetime', '1h' to '24h', or '1d' to '30d'."
            }
        })
    }
}

impl GrantDuration {
    /// Parse `lifetime`, `Nh` or `Nd` with no range limits (task rewards).
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim().to_lowercase();
        if raw == "lifetime" {
            return Some(Self::Lifetime);
        }
        let (digits, hours) = match (raw.strip_suffix('h'), raw.strip_suffix('d')) {
            (Some(d), _) => (d, true),
            (_, Some(d)) => (d, false),
            _ => return None,
        };
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let n: u32 = digits.parse().ok()?;
        Some(if hours { Self::Hours(n) } else { Self::Days(n) })
    }

    /// Parse an owner grant: lifetime, 1-24 hours or 1-30 days.
    pub fn parse_grant(raw: &str) -> Result<Self, DurationError> {
        match Self::parse(raw).ok_or(DurationError::Format)? {
            Self::Hours(h) if !(1..=24).contains(&h) => Err(DurationError::HoursOutOfRange),
            Self::Days(d) if !(1..=30).contains(&d) => Err(DurationError::DaysOutOfRange),
            other => Ok(other),
        }
    }

    pub fn as_duration(&self) -> Option<Duration> {
        match *self {
            Self::Lifetime => None,
            Self::Hours(h) => Some(Duration::hours(i64::from(h))),
            Self::Days(d) => Some(Duration::days(i64::from(d))),
        }
    }

    /// Expiry instant for a grant starting at `now`. `None` for lifetime.
    pub fn expiry_from(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        self.as_duration().map(|d| now + d)
    }

    /// Human form used in replies: "lifetime", "1 hour", "3 days".
    pub fn describe(&self) -> String {
        match *self {
            Self::Lifetime => "lifetime".to_string(),
            Self::Hours(h) => format!("{h} hour{}", if h > 1 { "s" } else { "" }),
            Self::Days(d) => format!("{d} day{}", if d > 1 { "s" } else { "" }),
        }
    }
}

impl fmt::Display for GrantDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lifetime => f.write_str("lifetime"),
            Self::Hours(h) => write!(f, "{h}h"),
            Self::Days(d) => write!(f, "{d}d"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_accepts_units_and_lifetime() {
        assert_eq!(GrantDuration::parse("lifetime"), Some(GrantDuration::Lifetime));
        assert_eq!(GrantDuration::parse("12H"), Some(GrantDuration::Hours(12)));
        assert_eq!(GrantDuration::parse("90d"), Some(GrantDuration::Days(90)));
        assert_eq!(GrantDuration::parse("d"), None);
        assert_eq!(GrantDuration::parse("5m"), None);
        assert_eq!(GrantDuration::parse("-1h"), None);
        assert_eq!(GrantDuration::parse(""), None);
    }

    #[test]
    fn test_parse_grant_enforces_owner_ranges() {
        assert_eq!(GrantDuration::parse_grant("24h"), Ok(GrantDuration::Hours(24)));
        assert_eq!(
            GrantDuration::parse_grant("25h"),
            Err(DurationError::HoursOutOfRange)
        );
        assert_eq!(
            GrantDuration::parse_grant("0d"),
            Err(DurationError::DaysOutOfRange)
        );
        assert_eq!(GrantDuration::parse_grant("week"), Err(DurationError::Format));
    }

    #[test]
    fn test_describe_pluralizes() {
        assert_eq!(GrantDuration::Hours(1).describe(), "1 hour");
        assert_eq!(GrantDuration::Days(7).describe(), "7 days");
        assert_eq!(GrantDuration::Lifetime.to_string(), "lifetime");
    }

    #[test]
    fn test_expiry_from() {
        let now = Utc::now();
        assert_eq!(GrantDuration::Lifetime.expiry_from(now), None);
        assert_eq!(
            GrantDuration::Days(2).expiry_from(now),
            Some(now + Duration::days(2))
        );
    }
}
