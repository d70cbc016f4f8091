use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A third-party AI service with its own key pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Service {
    OpenRouter,
    Gemini,
    GeminiFlash,
}

impl Service {
    /// Every service, in the order the key pool lists them.
    pub const ALL: [Service; 3] = [Service::OpenRouter, Service::Gemini, Service::GeminiFlash];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::Gemini => "gemini",
            Self::GeminiFlash => "gemini_flash",
        }
    }

    /// Comma-separated list used in validation replies.
    pub fn available() -> String {
        Self::ALL
            .iter()
            .map(|s| s.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown service name, carrying what the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownService(pub String);

impl fmt::Display for UnknownService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid service: {}. Available services: {}",
            self.0,
            Service::available()
        )
    }
}

impl FromStr for Service {
    type Err = UnknownService;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "openrouter" => Ok(Self::OpenRouter),
            "gemini" => Ok(Self::Gemini),
            "gemini_flash" => Ok(Self::GeminiFlash),
            _ => Err(UnknownService(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Gemini_Flash".parse::<Service>(), Ok(Service::GeminiFlash));
        assert_eq!("openrouter".parse::<Service>(), Ok(Service::OpenRouter));
    }

    #[test]
    fn test_unknown_service_message() {
        let err = "claude".parse::<Service>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid service: claude. Available services: openrouter, gemini, gemini_flash"
        );
    }
}
