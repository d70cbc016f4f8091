//! Long-term memory extraction.
//!
//! The model is asked for a JSON digest of recent turns. Malformed output
//! falls back to regex scraping of the raw text, and a failed call falls back
//! to keyword extraction over the user's own messages.

use std::collections::BTreeMap;

use companion_core::context::{Context, ContextEntry};
use companion_store::user::Memory;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

/// Entries handed to the summarizer.
pub const SUMMARY_WINDOW: usize = 20;
/// History needed before a summary is worth running.
pub const MIN_HISTORY: usize = 10;

const INSTRUCTIONS: &str = "You are an AI assistant that extracts key information from conversations. \
Please analyze the following conversation and extract:\n\
1. Main topics discussed\n\
2. User preferences (likes and dislikes)\n\
3. Important events mentioned\n\
4. A brief summary of the conversation\n\n\
Format your response as JSON with the following structure:\n\
{\"topics\": [\"topic1\", \"topic2\"], \"preferences\": {\"item1\": \"likes\", \"item2\": \"dislikes\"}, \
\"events\": [\"event1\", \"event2\"], \"summary\": \"brief summary\"}";

const TOPIC_KEYWORDS: &[&str] = &[
    "trading", "market", "crypto", "relationship", "love", "family", "work", "job", "hobby",
    "interest", "travel", "food", "music", "movie", "book", "game", "sport", "health", "fitness",
];

static LIKE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bI (?:like|love|enjoy|prefer) ([\w\s]+)").expect("valid regex"));
static DISLIKE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bI (?:dislike|hate|don't like|don't enjoy) ([\w\s]+)").expect("valid regex")
});
static EVENTS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)(?:yesterday|today|tomorrow|last week|next week) I (?:went|am going|will go|had|have|will have) ([\w\s]+)",
        r"(?i)\bI (?:celebrated|am celebrating|will celebrate) ([\w\s]+)",
        r"(?i)\bmy (?:birthday|anniversary|graduation|wedding) ([\w\s]+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid regex"))
    .collect()
});

static RAW_TOPICS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"topics"?\s*:?\s*\[([^\]]+)\]"#).expect("valid regex"));
static RAW_PREFERENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"preferences"?\s*:?\s*\{([^}]+)\}"#).expect("valid regex"));
static RAW_EVENTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"events"?\s*:?\s*\[([^\]]+)\]"#).expect("valid regex"));
static RAW_SUMMARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"summary"?\s*:?\s*"([^"]+)""#).expect("valid regex"));

/// What one extraction pass found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extracted {
    pub topics: Vec<String>,
    pub preferences: BTreeMap<String, String>,
    pub events: Vec<String>,
    pub summary: String,
}

impl Extracted {
    pub fn is_empty(&self) -> bool {
        self.topics.is_empty()
            && self.preferences.is_empty()
            && self.events.is_empty()
            && self.summary.is_empty()
    }
}

#[derive(Deserialize)]
struct Digest {
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    preferences: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    events: Vec<String>,
    #[serde(default)]
    summary: String,
}

/// Request asking the model to digest `entries`.
pub fn summary_request(entries: &[ContextEntry]) -> Context {
    let transcript: Vec<String> = entries
        .iter()
        .map(|e| format!("{}: {}", e.role.to_uppercase(), e.content))
        .collect();
    Context::new(&format!(
        "Here's the conversation:\n{}",
        transcript.join("\n")
    ))
    .with_system(INSTRUCTIONS)
}

/// Parse a model digest, scraping the raw text if it is not valid JSON.
pub fn parse_digest(raw: &str) -> Extracted {
    let cleaned = raw.replace("```json", "").replace("```", "");
    let body = match (cleaned.find('{'), cleaned.rfind('}')) {
        (Some(start), Some(end)) if end > start => &cleaned[start..=end],
        _ => cleaned.as_str(),
    };

    match serde_json::from_str::<Digest>(body) {
        Ok(d) => Extracted {
            topics: d.topics,
            preferences: d
                .preferences
                .into_iter()
                .map(|(k, v)| {
                    let value = match v {
                        serde_json::Value::String(s) => s,
                        other => other.to_string(),
                    };
                    (k, value)
                })
                .collect(),
            events: d.events,
            summary: d.summary,
        },
        Err(_) => scrape_digest(&cleaned),
    }
}

fn list_items(inner: &str) -> Vec<String> {
    inner
        .split(',')
        .map(|s| s.trim().trim_matches(['"', '\'']).trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn scrape_digest(raw: &str) -> Extracted {
    let topics = RAW_TOPICS
        .captures(raw)
        .map(|c| list_items(&c[1]))
        .unwrap_or_default();
    let events = RAW_EVENTS
        .captures(raw)
        .map(|c| list_items(&c[1]))
        .unwrap_or_default();
    let preferences = RAW_PREFERENCES
        .captures(raw)
        .map(|c| {
            list_items(&c[1])
                .into_iter()
                .filter_map(|pair| {
                    let (k, v) = pair.split_once(':')?;
                    let k = k.trim().trim_matches(['"', '\'']).trim();
                    let v = v.trim().trim_matches(['"', '\'']).trim();
                    (!k.is_empty()).then(|| (k.to_string(), v.to_string()))
                })
                .collect()
        })
        .unwrap_or_default();
    let summary = RAW_SUMMARY
        .captures(raw)
        .map(|c| c[1].trim().to_string())
        .unwrap_or_default();
    Extracted {
        topics,
        preferences,
        events,
        summary,
    }
}

/// Keyword and pattern extraction over the user's turns, for when the model is unreachable.
pub fn extract_from_turns(entries: &[ContextEntry]) -> Extracted {
    let mut out = Extracted::default();
    for entry in entries.iter().filter(|e| e.is_user()) {
        let lowered = entry.content.to_lowercase();
        for keyword in TOPIC_KEYWORDS {
            if lowered.contains(keyword) && !out.topics.iter().any(|t| t == keyword) {
                out.topics.push((*keyword).to_string());
            }
        }
        for c in LIKE.captures_iter(&entry.content) {
            out.preferences
                .insert(c[1].trim().to_lowercase(), "likes".to_string());
        }
        for c in DISLIKE.captures_iter(&entry.content) {
            out.preferences
                .insert(c[1].trim().to_lowercase(), "dislikes".to_string());
        }
        for pattern in EVENTS.iter() {
            for m in pattern.find_iter(&entry.content) {
                let event = m.as_str().trim().to_string();
                if !out.events.contains(&event) {
                    out.events.push(event);
                }
            }
        }
    }
    out
}

/// Fold an extraction into stored memory.
pub fn merge(memory: &mut Memory, extracted: Extracted) {
    for topic in extracted.topics {
        *memory.topics.entry(topic).or_insert(0) += 1;
    }
    memory.preferences.extend(extracted.preferences);
    for event in extracted.events {
        if !memory.important_events.contains(&event) {
            memory.important_events.push(event);
        }
    }
    if !extracted.summary.is_empty() {
        memory.last_interaction_summary = extracted.summary;
    }
}

/// Summary sentence synthesized from stored memory when the model gave none.
pub fn fallback_summary(memory: &Memory) -> String {
    let mut topics: Vec<(&String, &u32)> = memory.topics.iter().collect();
    topics.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));

    let mut parts = Vec::new();
    if !topics.is_empty() {
        let top: Vec<&str> = topics.iter().take(3).map(|(t, _)| t.as_str()).collect();
        parts.push(format!(
            "Previous conversations included discussions about {}.",
            top.join(", ")
        ));
    }
    if !memory.preferences.is_empty() {
        let prefs: Vec<String> = memory
            .preferences
            .iter()
            .take(3)
            .map(|(k, v)| format!("{k}: {v}"))
            .collect();
        parts.push(format!(
            "User has expressed preferences for {}.",
            prefs.join(", ")
        ));
    }
    if !memory.important_events.is_empty() {
        let events: Vec<&str> = memory
            .important_events
            .iter()
            .take(3)
            .map(String::as_str)
            .collect();
        parts.push(format!("Important events: {}.", events.join(", ")));
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_fenced_json() {
        let raw = "Sure!\n```json\n{\"topics\": [\"music\", \"travel\"], \"preferences\": {\"jazz\": \"likes\"}, \"events\": [\"trip to Rome\"], \"summary\": \"Talked about a trip.\"}\n```";
        let got = parse_digest(raw);
        assert_eq!(got.topics, vec!["music", "travel"]);
        assert_eq!(got.preferences.get("jazz").map(String::as_str), Some("likes"));
        assert_eq!(got.events, vec!["trip to Rome"]);
        assert_eq!(got.summary, "Talked about a trip.");
    }

    #[test]
    fn test_malformed_json_is_scraped() {
        let raw = "topics: [\"food\", 'work'] preferences: {pizza: likes, \"rain\": dislikes} summary: \"Chatted about dinner\" events: [dinner party,]";
        let got = parse_digest(raw);
        assert_eq!(got.topics, vec!["food", "work"]);
        assert_eq!(got.preferences.get("rain").map(String::as_str), Some("dislikes"));
        assert_eq!(got.preferences.get("pizza").map(String::as_str), Some("likes"));
        assert_eq!(got.events, vec!["dinner party"]);
        assert_eq!(got.summary, "Chatted about dinner");
    }

    #[test]
    fn test_keyword_extraction_uses_user_turns_only() {
        let entries = vec![
            ContextEntry::user("I love hiking. My job is stressful"),
            ContextEntry::assistant("I hate mondays and I love music"),
            ContextEntry::user("Yesterday I went to a concert"),
        ];
        let got = extract_from_turns(&entries);
        assert!(got.topics.contains(&"job".to_string()));
        assert!(got.topics.contains(&"love".to_string()));
        assert!(!got.topics.contains(&"music".to_string()));
        assert_eq!(got.preferences.get("hiking").map(String::as_str), Some("likes"));
        assert!(!got.preferences.contains_key("mondays and "));
        assert_eq!(got.events, vec!["Yesterday I went to a concert"]);
    }

    #[test]
    fn test_merge_counts_and_dedups() {
        let mut memory = Memory::default();
        let batch = Extracted {
            topics: vec!["music".into()],
            preferences: [("jazz".to_string(), "likes".to_string())].into(),
            events: vec!["concert".into()],
            summary: String::new(),
        };
        merge(&mut memory, batch.clone());
        merge(&mut memory, batch);
        assert_eq!(memory.topics.get("music"), Some(&2));
        assert_eq!(memory.important_events, vec!["concert"]);
        assert!(memory.last_interaction_summary.is_empty());

        let summary = fallback_summary(&memory);
        assert_eq!(
            summary,
            "Previous conversations included discussions about music. \
             User has expressed preferences for jazz: likes. Important events: concert."
        );
    }

    #[test]
    fn test_summary_request_shape() {
        let ctx = summary_request(&[ContextEntry::user("hi"), ContextEntry::assistant("hey")]);
        assert!(ctx.system_prompt.contains("Format your response as JSON"));
        assert!(ctx.current_message.ends_with("USER: hi\nASSISTANT: hey"));
    }
}
