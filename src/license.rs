//! Bot license registration and the access gate.
//!
//! Positive license checks are cached in the store for `cache_minutes`, so a
//! restart does not hit the license service for every message.

use chrono::{DateTime, Duration, Utc};
use companion_core::{config::LicenseConfig, error::CompanionError, message::normalize_user_id};
use companion_store::store::{LicenseCache, LicenseInfo};
use companion_store::Store;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

#[derive(Serialize)]
struct RegisterRequest<'a> {
    license_key: &'a str,
    bot_number: &'a str,
}

#[derive(Serialize)]
struct StatusRequest<'a> {
    bot_number: &'a str,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RegisterResponse {
    success: bool,
    message: Option<String>,
    license_info: Option<LicenseInfo>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct StatusResponse {
    success: bool,
    registered: bool,
    license_info: Option<LicenseInfo>,
}

/// Outcome of `/register`.
#[derive(Debug, Clone, PartialEq)]
pub enum Registration {
    Registered(LicenseInfo),
    /// The key belongs to another bot number.
    WrongNumber,
    Rejected(String),
}

/// Whether a license is usable at `now`.
pub fn license_valid(info: &LicenseInfo, now: DateTime<Utc>) -> bool {
    info.is_active() && info.expires_at.map_or(true, |at| at > now)
}

/// Remaining time as `Xd Yh Zm Ws remaining`, or `Permanent`.
pub fn time_remaining(info: &LicenseInfo, now: DateTime<Utc>) -> String {
    let Some(expires) = info.expires_at else {
        return "Permanent".to_string();
    };
    let left = (expires - now).max(Duration::zero());
    format!(
        "{}d {}h {}m {}s remaining",
        left.num_days(),
        left.num_hours() % 24,
        left.num_minutes() % 60,
        left.num_seconds() % 60
    )
}

fn classify(resp: RegisterResponse, bot_number: &str) -> Registration {
    if let Some(bound) = resp
        .license_info
        .as_ref()
        .and_then(|i| i.bot_number.as_deref())
    {
        if normalize_user_id(bound) != normalize_user_id(bot_number) {
            return Registration::WrongNumber;
        }
    }
    match (resp.success, resp.license_info) {
        (true, Some(info)) => Registration::Registered(info),
        (_, _) => {
            let message = resp
                .message
                .unwrap_or_else(|| "License service rejected the key".to_string());
            if message.to_lowercase().contains("different") {
                Registration::WrongNumber
            } else {
                Registration::Rejected(message)
            }
        }
    }
}

/// License client plus the persisted status cache.
pub struct LicenseGate {
    client: reqwest::Client,
    config: LicenseConfig,
    bot_number: String,
    store: Store,
}

impl LicenseGate {
    pub fn new(config: LicenseConfig, bot_number: &str, store: Store) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            bot_number: normalize_user_id(bot_number),
            store,
        }
    }

    pub fn enabled(&self) -> bool {
        self.config.enabled
    }

    pub fn bot_number(&self) -> &str {
        &self.bot_number
    }

    pub fn dashboard_url(&self) -> &str {
        &self.config.dashboard_url
    }

    /// Gate check for incoming messages. Always open when licensing is disabled.
    pub async fn is_registered(&self, now: DateTime<Utc>) -> bool {
        if !self.config.enabled {
            return true;
        }

        let cached = self.store.license_cache().await.ok().flatten();
        if let Some(cache) = &cached {
            let fresh = now - cache.last_check_time < Duration::minutes(self.config.cache_minutes);
            if fresh && cache.bot_number == self.bot_number && license_valid(&cache.license_info, now) {
                debug!("license: cached status is fresh");
                return true;
            }
        }

        match self.status(now).await {
            Ok(Some(info)) => license_valid(&info, now),
            Ok(None) => false,
            Err(e) => {
                // Service unreachable: trust a previously valid license.
                warn!("license: status check failed: {e}");
                cached.is_some_and(|c| license_valid(&c.license_info, now))
            }
        }
    }

    /// Ask the license service for this bot's status and refresh the cache.
    pub async fn status(&self, now: DateTime<Utc>) -> Result<Option<LicenseInfo>, CompanionError> {
        let resp: StatusResponse = self
            .post(
                "check-bot-status",
                &StatusRequest {
                    bot_number: &self.bot_number,
                },
            )
            .await?;

        match resp.license_info {
            Some(info) if resp.success && resp.registered => {
                if license_valid(&info, now) {
                    self.remember(&info, now).await;
                } else {
                    self.forget().await;
                }
                Ok(Some(info))
            }
            _ => {
                self.forget().await;
                Ok(None)
            }
        }
    }

    /// Register this bot with a license key.
    pub async fn register(&self, license_key: &str, now: DateTime<Utc>) -> Result<Registration, CompanionError> {
        let resp: RegisterResponse = self
            .post(
                "register-bot",
                &RegisterRequest {
                    license_key,
                    bot_number: &self.bot_number,
                },
            )
            .await?;
        let outcome = classify(resp, &self.bot_number);
        if let Registration::Registered(info) = &outcome {
            info!("license: bot registered with package {}", info.package());
            self.remember(info, now).await;
        }
        Ok(outcome)
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        endpoint: &str,
        body: &B,
    ) -> Result<R, CompanionError> {
        if self.config.base_url.is_empty() {
            return Err(CompanionError::License("license base_url is not configured".into()));
        }
        let url = format!("{}/{endpoint}", self.config.base_url.trim_end_matches('/'));
        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| CompanionError::License(format!("{endpoint} request failed: {e}")))?;

        // Rejections carry a JSON body with `success: false`, so the status is not checked.
        resp.json()
            .await
            .map_err(|e| CompanionError::License(format!("{endpoint}: failed to parse response: {e}")))
    }

    async fn remember(&self, info: &LicenseInfo, now: DateTime<Utc>) {
        let cache = LicenseCache {
            bot_number: self.bot_number.clone(),
            license_info: info.clone(),
            last_check_time: now,
        };
        if let Err(e) = self.store.save_license_cache(&cache).await {
            warn!("license: failed to cache status: {e}");
        }
    }

    async fn forget(&self) {
        if let Err(e) = self.store.clear_license_cache().await {
            warn!("license: failed to clear cache: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn active(bot: &str, expires_at: Option<DateTime<Utc>>) -> LicenseInfo {
        LicenseInfo {
            license_key: Some("LIC-1".into()),
            bot_number: Some(bot.into()),
            package_type: Some("premium_monthly".into()),
            status: Some("active".into()),
            expires_at,
            ..Default::default()
        }
    }

    fn enabled_config() -> LicenseConfig {
        LicenseConfig {
            enabled: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_validity_and_remaining() {
        let now = Utc::now();
        assert!(license_valid(&active("1", None), now));
        assert!(!license_valid(&active("1", Some(now - Duration::hours(1))), now));
        let info = active("1", Some(now + Duration::days(2) + Duration::hours(3)));
        assert!(time_remaining(&info, now).starts_with("2d 3h 0m"));
        assert_eq!(time_remaining(&active("1", None), now), "Permanent");
    }

    #[test]
    fn test_classify_wrong_number() {
        let resp = RegisterResponse {
            success: true,
            message: None,
            license_info: Some(active("+15550001111", None)),
        };
        assert_eq!(classify(resp, "15559999999"), Registration::WrongNumber);
    }

    #[test]
    fn test_classify_success_and_rejection() {
        let info = active("15550001111", None);
        let ok = RegisterResponse {
            success: true,
            message: None,
            license_info: Some(info.clone()),
        };
        assert_eq!(classify(ok, "15550001111"), Registration::Registered(info));

        let bad = RegisterResponse {
            success: false,
            message: Some("License key not found".into()),
            license_info: None,
        };
        assert_eq!(
            classify(bad, "15550001111"),
            Registration::Rejected("License key not found".into())
        );
    }

    #[test]
    fn test_register_response_parses_service_json() {
        let json = r#"{"success":true,"message":"ok","license_info":{"license_key":"K","bot_number":"1555","package_type":"basic","status":"active","expires_at":null,"is_connected":true}}"#;
        let resp: RegisterResponse = serde_json::from_str(json).unwrap();
        assert!(resp.success);
        assert_eq!(resp.license_info.unwrap().package(), "basic");
    }

    #[tokio::test]
    async fn test_disabled_gate_is_open() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(tmp.path()).await.unwrap();
        let gate = LicenseGate::new(LicenseConfig::default(), "1555", store);
        assert!(gate.is_registered(Utc::now()).await);
    }

    #[tokio::test]
    async fn test_fresh_cache_opens_gate_without_service() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(tmp.path()).await.unwrap();
        let now = Utc::now();
        store
            .save_license_cache(&LicenseCache {
                bot_number: "1555".into(),
                license_info: active("1555", None),
                last_check_time: now - Duration::minutes(5),
            })
            .await
            .unwrap();
        let gate = LicenseGate::new(enabled_config(), "+1555", store);
        assert!(gate.is_registered(now).await);
    }

    #[tokio::test]
    async fn test_unreachable_service_without_cache_closes_gate() {
        let tmp = TempDir::new().unwrap();
        let store = Store::new(tmp.path()).await.unwrap();
        let gate = LicenseGate::new(enabled_config(), "1555", store);
        assert!(!gate.is_registered(Utc::now()).await);
    }
}
