//! Ordered text matchers for natural-language requests.
//!
//! Each matcher pairs a compiled regex with an extractor; the first matcher
//! in a slice that hits wins. Covers reminders, photo requests, sticker
//! moods and `**action**` markers.

use chrono::{DateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use crate::timeparse::{self, ReminderRequest};

/// A compiled pattern and what to pull out of its captures.
pub struct Matcher<T> {
    regex: Regex,
    extract: fn(&Captures<'_>) -> T,
}

impl<T> Matcher<T> {
    fn new(pattern: &str, extract: fn(&Captures<'_>) -> T) -> Self {
        Self {
            regex: Regex::new(pattern).expect("valid regex"),
            extract,
        }
    }

    fn apply(&self, text: &str) -> Option<T> {
        self.regex.captures(text).map(|c| (self.extract)(&c))
    }
}

fn first_match<T>(matchers: &[Matcher<T>], text: &str) -> Option<T> {
    matchers.iter().find_map(|m| m.apply(text))
}

fn group(c: &Captures<'_>, i: usize) -> String {
    c.get(i).map(|m| m.as_str().trim().to_string()).unwrap_or_default()
}

// --- Reminders ---

/// Reminder text and the raw time expression it was phrased with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReminderParts {
    pub text: String,
    pub time_expr: String,
}

fn text_then_time(c: &Captures<'_>, text: usize, prep: usize, time: usize) -> ReminderParts {
    ReminderParts {
        text: group(c, text),
        time_expr: format!("{} {}", group(c, prep), group(c, time)),
    }
}

static REMINDER_MATCHERS: Lazy<Vec<Matcher<ReminderParts>>> = Lazy::new(|| {
    vec![
        Matcher::new(r"(?i)remind me (to|about) (.*?) (at|on|in) (.*)", |c| {
            text_then_time(c, 2, 3, 4)
        }),
        Matcher::new(r"(?i)set a reminder (to|about|for) (.*?) (at|on|in) (.*)", |c| {
            text_then_time(c, 2, 3, 4)
        }),
        Matcher::new(r"(?i)set a reminder (at|on|in) (.*?) (to|about|for) (.*)", |c| {
            text_then_time(c, 4, 1, 2)
        }),
        Matcher::new(r"(?i)remind me (at|on|in) (.*?) (to|about) (.*)", |c| {
            text_then_time(c, 4, 1, 2)
        }),
        Matcher::new(r"(?i)remind me to (.*?) (at|on|in) (.*)", |c| {
            text_then_time(c, 1, 2, 3)
        }),
        Matcher::new(r"(?i)remind me (at|on|in) (.*?) to (.*)", |c| {
            text_then_time(c, 3, 1, 2)
        }),
        Matcher::new(r"(?i)remind me to (.*)", |c| ReminderParts {
            text: group(c, 1),
            time_expr: "in 1 hour".to_string(),
        }),
    ]
});

/// Outcome of scanning a chat message for a reminder request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NaturalReminder {
    Parsed(ReminderRequest),
    /// Phrased as a reminder, but the time could not be read.
    BadTime,
}

/// Detect "remind me to ..." phrasing. `None` means the message is not a reminder.
pub fn natural_reminder<Tz: TimeZone>(message: &str, now: &DateTime<Tz>) -> Option<NaturalReminder> {
    let (body, recurring) = timeparse::split_recurrence(message.trim());
    let parts = first_match(&REMINDER_MATCHERS, body)?;
    if parts.text.is_empty() {
        return Some(NaturalReminder::BadTime);
    }
    Some(match timeparse::parse_time(&parts.time_expr, now) {
        Some(time) => NaturalReminder::Parsed(ReminderRequest {
            text: parts.text,
            time,
            recurring,
        }),
        None => NaturalReminder::BadTime,
    })
}

// --- Image requests ---

fn tail(c: &Captures<'_>) -> String {
    group(c, 1)
}

static IMAGE_MATCHERS: Lazy<Vec<Matcher<String>>> = Lazy::new(|| {
    vec![
        Matcher::new(r"(?i)send me your (?:picture|photo|pic|image)s?\b\s*(.*)", tail),
        Matcher::new(r"(?i)send me a (?:picture|photo|pic|image)s?\b\s*(.*)", tail),
        Matcher::new(r"(?i)show me your (?:picture|photo|pic|image)s?\b\s*(.*)", tail),
        Matcher::new(r"(?i)show me a (?:picture|photo|pic|image)s?\b\s*(.*)", tail),
        Matcher::new(r"(?i)send (?:picture|photo|pic|image)s?\b\s*(.*)", tail),
        Matcher::new(r"(?i)send your (?:picture|photo|pic|image)s?\b\s*(.*)", tail),
        Matcher::new(r"(?i)i want to see you\b\s*(.*)", tail),
        Matcher::new(r"(?i)can i see you\b\s*(.*)", tail),
    ]
});

const IMAGE_KEYWORDS: &[&str] = &[
    "picture", "photo", "image", "pic", "see you", "show me", "send me",
];

/// Detect a photo request. Returns the scene the user described, possibly empty.
pub fn image_request(message: &str) -> Option<String> {
    if let Some(scene) = first_match(&IMAGE_MATCHERS, message) {
        return Some(scene.trim_end_matches(['?', '!', '.']).trim().to_string());
    }
    let lowered = message.to_lowercase();
    IMAGE_KEYWORDS
        .iter()
        .any(|k| lowered.contains(k))
        .then(String::new)
}

// --- Sticker moods ---

/// Mood a sticker reply shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emotion {
    Love,
    Laughing,
    Sad,
    Surprised,
    Angry,
    Happy,
}

impl Emotion {
    /// Facial expression used in the sticker prompt.
    pub fn expression(&self) -> &'static str {
        match self {
            Self::Love => "blowing a kiss with heart eyes, blushing",
            Self::Laughing => "laughing out loud with eyes squeezed shut",
            Self::Sad => "with a sympathetic, comforting expression",
            Self::Surprised => "with wide eyes and an open-mouthed gasp",
            Self::Angry => "pouting with puffed cheeks, playfully annoyed",
            Self::Happy => "beaming with a big cheerful smile",
        }
    }
}

static STICKER_MATCHERS: Lazy<Vec<Matcher<Emotion>>> = Lazy::new(|| {
    vec![
        Matcher::new(r"(?i)\b(love you|miss(ed)? you|xoxo)\b|❤|😍|🥰|😘|💕|💖", |_| Emotion::Love),
        Matcher::new(r"(?i)\b(ha(ha)+|lol|lmao|he(he)+)\b|😂|🤣", |_| Emotion::Laughing),
        Matcher::new(r"(?i)\b(sad|upset|lonely|crying|depressed)\b|😢|😭|😞", |_| Emotion::Sad),
        Matcher::new(r"(?i)\b(wow|omg|no way)\b|😮|😱", |_| Emotion::Surprised),
        Matcher::new(r"(?i)\b(angry|mad at|annoyed|furious)\b|😠|😡", |_| Emotion::Angry),
        Matcher::new(r"(?i)\b(yay|awesome|amazing|great news)\b|😊|😄|🥳", |_| Emotion::Happy),
    ]
});

/// The mood a message carries strongly enough to answer with a sticker.
pub fn sticker_emotion(message: &str) -> Option<Emotion> {
    first_match(&STICKER_MATCHERS, message)
}

// --- Actions ---

static ACTION: Lazy<Regex> = Lazy::new(|| Regex::new(r"\*\*(.*?)\*\*").expect("valid regex"));

/// Split `**waves**`-style actions out of a message.
///
/// Returns the message with the markers removed and the action texts.
pub fn extract_actions(message: &str) -> (String, Vec<String>) {
    let actions: Vec<String> = ACTION
        .captures_iter(message)
        .map(|c| group(&c, 1))
        .filter(|a| !a.is_empty())
        .collect();
    let clean = ACTION.replace_all(message, "$1").trim().to_string();
    (clean, actions)
}

/// History form of a user turn.
pub fn user_turn(message: &str) -> String {
    let (clean, actions) = extract_actions(message);
    if actions.is_empty() {
        clean
    } else {
        format!("{clean} (Actions: {})", actions.join(", "))
    }
}
