//! Round-robin API key pool, one list per service.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use companion_core::service::Service;
use serde::{Deserialize, Serialize};

/// Stored at `config/api_keys.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiKeyPool {
    pub openrouter: Vec<String>,
    pub gemini: Vec<String>,
    pub gemini_flash: Vec<String>,
    #[serde(rename = "currentIndex")]
    pub current_index: BTreeMap<String, usize>,
    /// Epoch milliseconds of the last rotation per service.
    #[serde(rename = "lastRotation")]
    pub last_rotation: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyPoolError {
    Duplicate(Service),
    NotFound(Service),
}

impl fmt::Display for KeyPoolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Duplicate(s) => write!(f, "Key already exists for {s}"),
            Self::NotFound(s) => write!(f, "Key not found for {s}"),
        }
    }
}

/// Masked view of one key for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskedKey {
    pub masked: String,
    pub current: bool,
}

/// `first5...last5`; short keys are fully starred.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 10 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..5].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}...{tail}")
}

impl ApiKeyPool {
    pub fn keys(&self, service: Service) -> &[String] {
        match service {
            Service::OpenRouter => &self.openrouter,
            Service::Gemini => &self.gemini,
            Service::GeminiFlash => &self.gemini_flash,
        }
    }

    fn keys_mut(&mut self, service: Service) -> &mut Vec<String> {
        match service {
            Service::OpenRouter => &mut self.openrouter,
            Service::Gemini => &mut self.gemini,
            Service::GeminiFlash => &mut self.gemini_flash,
        }
    }

    pub fn index(&self, service: Service) -> usize {
        self.current_index
            .get(service.as_str())
            .copied()
            .unwrap_or(0)
    }

    pub fn last_rotation(&self, service: Service) -> Option<DateTime<Utc>> {
        self.last_rotation
            .get(service.as_str())
            .and_then(|ms| DateTime::from_timestamp_millis(*ms))
    }

    /// Hand out the key at the rotation index, then advance it.
    pub fn next_key(&mut self, service: Service, now: DateTime<Utc>) -> Option<String> {
        let len = self.keys(service).len();
        if len == 0 {
            return None;
        }
        // A hand-edited file may carry an index past the end.
        let index = self.index(service) % len;
        let key = self.keys(service)[index].clone();
        self.current_index
            .insert(service.as_str().to_string(), (index + 1) % len);
        self.last_rotation
            .insert(service.as_str().to_string(), now.timestamp_millis());
        Some(key)
    }

    pub fn add(&mut self, service: Service, key: &str) -> Result<(), KeyPoolError> {
        let keys = self.keys_mut(service);
        if keys.iter().any(|k| k == key) {
            return Err(KeyPoolError::Duplicate(service));
        }
        keys.push(key.to_string());
        self.current_index
            .entry(service.as_str().to_string())
            .or_insert(0);
        Ok(())
    }

    /// Remove a key and pull the rotation index back into range.
    pub fn remove(&mut self, service: Service, key: &str) -> Result<(), KeyPoolError> {
        let keys = self.keys_mut(service);
        let pos = keys
            .iter()
            .position(|k| k == key)
            .ok_or(KeyPoolError::NotFound(service))?;
        keys.remove(pos);
        let len = keys.len();
        let index = self.index(service);
        if index >= len {
            self.current_index.insert(service.as_str().to_string(), 0);
        }
        Ok(())
    }

    pub fn masked(&self, service: Service) -> Vec<MaskedKey> {
        let current = self.index(service);
        self.keys(service)
            .iter()
            .enumerate()
            .map(|(i, k)| MaskedKey {
                masked: mask_key(k),
                current: i == current,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool(keys: &[&str]) -> ApiKeyPool {
        let mut p = ApiKeyPool::default();
        for k in keys {
            p.add(Service::Gemini, k).unwrap();
        }
        p
    }

    #[test]
    fn test_round_robin_visits_each_key_once() {
        let mut p = pool(&["a", "b", "c"]);
        let now = Utc::now();
        let mut seen: Vec<String> = (0..3)
            .map(|_| p.next_key(Service::Gemini, now).unwrap())
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert_eq!(p.next_key(Service::Gemini, now).as_deref(), Some("a"));
        assert_eq!(p.last_rotation(Service::Gemini).map(|t| t.timestamp_millis()), Some(now.timestamp_millis()));
    }

    #[test]
    fn test_empty_pool_yields_none() {
        let mut p = ApiKeyPool::default();
        assert_eq!(p.next_key(Service::OpenRouter, Utc::now()), None);
    }

    #[test]
    fn test_remove_at_or_after_index_keeps_index_in_range() {
        let now = Utc::now();
        let mut p = pool(&["a", "b", "c"]);
        p.next_key(Service::Gemini, now);
        p.next_key(Service::Gemini, now);
        assert_eq!(p.index(Service::Gemini), 2);

        p.remove(Service::Gemini, "c").unwrap();
        assert!(p.index(Service::Gemini) < p.keys(Service::Gemini).len());

        p.remove(Service::Gemini, "a").unwrap();
        p.remove(Service::Gemini, "b").unwrap();
        assert_eq!(p.index(Service::Gemini), 0);
        assert_eq!(p.next_key(Service::Gemini, now), None);
    }

    #[test]
    fn test_add_rejects_duplicates_and_remove_rejects_missing() {
        let mut p = pool(&["a"]);
        assert_eq!(
            p.add(Service::Gemini, "a").unwrap_err().to_string(),
            "Key already exists for gemini"
        );
        assert_eq!(
            p.remove(Service::GeminiFlash, "zzz").unwrap_err().to_string(),
            "Key not found for gemini_flash"
        );
    }

    #[test]
    fn test_stale_index_wraps() {
        let mut p = pool(&["a", "b"]);
        p.current_index.insert("gemini".into(), 7);
        assert_eq!(p.next_key(Service::Gemini, Utc::now()).as_deref(), Some("b"));
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("AIzaSyA1234567890xyz"), "AIzaS...90xyz");
        assert_eq!(mask_key("short"), "*****");
    }

    #[test]
    fn test_masked_marks_current() {
        let mut p = pool(&["key-number-one", "key-number-two"]);
        p.next_key(Service::Gemini, Utc::now());
        let listed = p.masked(Service::Gemini);
        assert!(!listed[0].current);
        assert!(listed[1].current);
    }

    #[test]
    fn test_file_shape() {
        let p = pool(&["k1"]);
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["gemini"][0], "k1");
        assert_eq!(json["currentIndex"]["gemini"], 0);
        assert!(json["gemini_flash"].is_array());
    }
}
