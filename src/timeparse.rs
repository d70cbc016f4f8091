//! Reminder time expressions.
//!
//! Understands relative offsets (`in 2 hours`), clock times with an optional
//! day word (`tomorrow at 3pm`, `at 17:30`), parts of the day
//! (`tomorrow morning`) and month/day dates (`5/20 at 9am`). Clock times are
//! read in the timezone of `now`.

use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, NaiveTime, TimeZone, Utc};
use companion_store::reminder::Recurrence;
use once_cell::sync::Lazy;
use regex::Regex;

static RELATIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^in\s+(\d+|an?)\s+(minute|min|hour|hr|day|week)s?$").expect("valid regex")
});
static PART_OF_DAY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(today|tomorrow)(?:\s+(morning|afternoon|evening|night))?$").expect("valid regex")
});
static CLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(today|tomorrow)\s+)?(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)?$")
        .expect("valid regex")
});
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2})/(\d{1,2})(?:\s+(?:at\s+)?(\d{1,2})(?::(\d{2}))?\s*(am|pm)?)?$")
        .expect("valid regex")
});
static RECURRING: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\s+(daily|every\s+day|weekly|every\s+week|monthly|every\s+month)$")
        .expect("valid regex")
});
static REMIND_ARGS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(.+?)\s+to\s+(.+)$").expect("valid regex"));

/// A fully parsed reminder request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderRequest {
    pub text: String,
    pub time: DateTime<Utc>,
    pub recurring: Option<Recurrence>,
}

/// Split a trailing `daily` / `every week` / `monthly` marker off `text`.
pub fn split_recurrence(text: &str) -> (&str, Option<Recurrence>) {
    let Some(m) = RECURRING.captures(text) else {
        return (text, None);
    };
    let word = m[1].to_lowercase();
    let recurrence = if word.contains("day") || word == "daily" {
        Recurrence::Daily
    } else if word.contains("week") {
        Recurrence::Weekly
    } else {
        Recurrence::Monthly
    };
    let start = m.get(0).map(|all| all.start()).unwrap_or(text.len());
    (&text[..start], Some(recurrence))
}

/// Arguments of `/remind`: `<time> to <text> [daily|weekly|monthly]`.
pub fn parse_remind_args<Tz: TimeZone>(args: &str, now: &DateTime<Tz>) -> Option<ReminderRequest> {
    let (body, recurring) = split_recurrence(args.trim());
    let caps = REMIND_ARGS.captures(body)?;
    let time = parse_time(&caps[1], now)?;
    let text = caps[2].trim();
    if text.is_empty() {
        return None;
    }
    Some(ReminderRequest {
        text: text.to_string(),
        time,
        recurring,
    })
}

/// Resolve a time expression against `now`. `None` when it is not understood.
pub fn parse_time<Tz: TimeZone>(expr: &str, now: &DateTime<Tz>) -> Option<DateTime<Utc>> {
    let lowered = expr.trim().to_lowercase();
    let expr = lowered
        .strip_prefix("on ")
        .or_else(|| lowered.strip_prefix("at "))
        .unwrap_or(&lowered)
        .trim();

    if let Some(c) = RELATIVE.captures(expr) {
        let n: i64 = match &c[1] {
            "a" | "an" => 1,
            digits => digits.parse().ok()?,
        };
        // Offsets past chrono's range are not understood rather than a panic.
        let offset = match &c[2] {
            "minute" | "min" => Duration::try_minutes(n),
            "hour" | "hr" => Duration::try_hours(n),
            "day" => Duration::try_days(n),
            _ => Duration::try_weeks(n),
        }?;
        return now.with_timezone(&Utc).checked_add_signed(offset);
    }

    let today = now.date_naive();

    if let Some(c) = PART_OF_DAY.captures(expr) {
        let hour = match c.get(2).map(|m| m.as_str()) {
            Some("morning") => 9,
            Some("afternoon") => 14,
            Some("evening") => 19,
            Some("night") => 21,
            // A bare "tomorrow" means tomorrow morning; a bare "today" has no time.
            _ if &c[1] == "tomorrow" => 9,
            _ => return None,
        };
        let day = if &c[1] == "tomorrow" {
            today.succ_opt()?
        } else {
            today
        };
        return at_local(now, day, NaiveTime::from_hms_opt(hour, 0, 0)?);
    }

    if let Some(c) = CLOCK.captures(expr) {
        let time = clock(&c[2], c.get(3).map(|m| m.as_str()), c.get(4).map(|m| m.as_str()))?;
        return match c.get(1).map(|m| m.as_str()) {
            Some("tomorrow") => at_local(now, today.succ_opt()?, time),
            Some(_) => at_local(now, today, time),
            None => {
                // A bare clock time already past today means tomorrow.
                let candidate = at_local(now, today, time)?;
                if candidate <= now.with_timezone(&Utc) {
                    at_local(now, today.succ_opt()?, time)
                } else {
                    Some(candidate)
                }
            }
        };
    }

    if let Some(c) = DATE.captures(expr) {
        let month: u32 = c[1].parse().ok()?;
        let day: u32 = c[2].parse().ok()?;
        let time = match c.get(3) {
            Some(h) => clock(h.as_str(), c.get(4).map(|m| m.as_str()), c.get(5).map(|m| m.as_str()))?,
            None => NaiveTime::from_hms_opt(9, 0, 0)?,
        };
        let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
        let candidate = at_local(now, date, time)?;
        if candidate > now.with_timezone(&Utc) {
            return Some(candidate);
        }
        let next_year = NaiveDate::from_ymd_opt(today.year() + 1, month, day)?;
        return at_local(now, next_year, time);
    }

    None
}

/// Build a clock time from `H`, optional `MM` and optional `am`/`pm`.
fn clock(hour: &str, minute: Option<&str>, meridiem: Option<&str>) -> Option<NaiveTime> {
    let mut h: u32 = hour.parse().ok()?;
    let m: u32 = minute.map(str::parse::<u32>).transpose().ok()?.unwrap_or(0);
    match meridiem {
        Some(_) if h == 0 || h > 12 => return None,
        Some("pm") if h < 12 => h += 12,
        Some("am") if h == 12 => h = 0,
        _ => {}
    }
    NaiveTime::from_hms_opt(h, m, 0)
}

fn at_local<Tz: TimeZone>(now: &DateTime<Tz>, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    now.timezone()
        .from_local_datetime(&date.and_time(time))
        .earliest()
        .map(|t| t.with_timezone(&Utc))
}

/// Human-readable reminder time in server local time.
pub fn display(time: DateTime<Utc>) -> String {
    time.with_timezone(&Local)
        .format("%a, %b %-d %Y at %-I:%M %p")
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 10, 10, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_offsets() {
        assert_eq!(parse_time("in 2 hours", &now()), Some(now() + Duration::hours(2)));
        assert_eq!(parse_time("in 30 minutes", &now()), Some(now() + Duration::minutes(30)));
        assert_eq!(parse_time("in a week", &now()), Some(now() + Duration::weeks(1)));
        assert_eq!(parse_time("In 1 Day", &now()), Some(now() + Duration::days(1)));
    }

    #[test]
    fn test_out_of_range_offsets_are_not_understood() {
        assert_eq!(parse_time("in 100000000 days", &now()), None);
        assert_eq!(parse_time("in 9223372036854775807 minutes", &now()), None);
        assert_eq!(parse_time("in 99999999999999999999 weeks", &now()), None);
        assert!(parse_remind_args("in 100000000 days to x", &now()).is_none());
    }

    #[test]
    fn test_clock_times() {
        assert_eq!(
            parse_time("tomorrow at 3pm", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 11, 15, 0, 0).unwrap())
        );
        assert_eq!(
            parse_time("today at 12:02pm", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 10, 12, 2, 0).unwrap())
        );
        assert_eq!(
            parse_time("at 17:30", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 10, 17, 30, 0).unwrap())
        );
        assert_eq!(
            parse_time("12am", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 11, 0, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_past_clock_time_rolls_to_tomorrow() {
        assert_eq!(
            parse_time("at 8am", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 11, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn test_parts_of_day() {
        assert_eq!(
            parse_time("tomorrow evening", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 11, 19, 0, 0).unwrap())
        );
        assert_eq!(
            parse_time("tomorrow", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 11, 9, 0, 0).unwrap())
        );
        assert_eq!(parse_time("today", &now()), None);
    }

    #[test]
    fn test_month_day_dates() {
        assert_eq!(
            parse_time("5/20 at 9am", &now()),
            Some(Utc.with_ymd_and_hms(2026, 5, 20, 9, 0, 0).unwrap())
        );
        assert_eq!(
            parse_time("on 1/2", &now()),
            Some(Utc.with_ymd_and_hms(2027, 1, 2, 9, 0, 0).unwrap())
        );
        assert_eq!(parse_time("2/30", &now()), None);
    }

    #[test]
    fn test_rejects_nonsense() {
        assert_eq!(parse_time("whenever", &now()), None);
        assert_eq!(parse_time("at 13pm", &now()), None);
        assert_eq!(parse_time("at 25:00", &now()), None);
    }

    #[test]
    fn test_split_recurrence() {
        assert_eq!(
            split_recurrence("take vitamins every day"),
            ("take vitamins", Some(Recurrence::Daily))
        );
        assert_eq!(split_recurrence("pay rent Monthly"), ("pay rent", Some(Recurrence::Monthly)));
        assert_eq!(split_recurrence("call mom"), ("call mom", None));
    }

    #[test]
    fn test_remind_args() {
        let req = parse_remind_args("tomorrow at 8am to take vitamins daily", &now()).unwrap();
        assert_eq!(req.text, "take vitamins");
        assert_eq!(req.time, Utc.with_ymd_and_hms(2026, 5, 11, 8, 0, 0).unwrap());
        assert_eq!(req.recurring, Some(Recurrence::Daily));

        let req = parse_remind_args("in 2 hours to take medicine", &now()).unwrap();
        assert_eq!(req.time, now() + Duration::hours(2));
        assert!(parse_remind_args("call mom", &now()).is_none());
        assert!(parse_remind_args("someday to call mom", &now()).is_none());
    }
}
