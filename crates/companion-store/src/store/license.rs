//! Cached license status, persisted across restarts.

use super::{read_json, write_json, Store};
use chrono::{DateTime, Utc};
use companion_core::error::CompanionError;
use serde::{Deserialize, Serialize};

const LICENSE_FILE: &str = "license.json";

/// License details as returned by the license service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseInfo {
    pub id: Option<String>,
    pub license_key: Option<String>,
    pub bot_number: Option<String>,
    pub package_type: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    pub status: Option<String>,
    pub is_connected: Option<bool>,
    pub user_credentials: Option<UserCredentials>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserCredentials {
    pub username: Option<String>,
    pub password: Option<String>,
}

impl LicenseInfo {
    /// `premium_monthly` reads as `premium monthly`.
    pub fn package(&self) -> String {
        self.package_type
            .as_deref()
            .map(|p| p.replace('_', " "))
            .unwrap_or_else(|| "Unknown".to_string())
    }

    pub fn is_active(&self) -> bool {
        self.status.as_deref() == Some("active")
    }
}

/// Stored at `config/license.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseCache {
    pub bot_number: String,
    pub license_info: LicenseInfo,
    pub last_check_time: DateTime<Utc>,
}

impl Store {
    pub async fn license_cache(&self) -> Result<Option<LicenseCache>, CompanionError> {
        let path = self.config_path(LICENSE_FILE);
        let _guard = self.lock(&path).await;
        read_json(&path).await
    }

    pub async fn save_license_cache(&self, cache: &LicenseCache) -> Result<(), CompanionError> {
        let path = self.config_path(LICENSE_FILE);
        let _guard = self.lock(&path).await;
        write_json(&path, cache).await
    }

    pub async fn clear_license_cache(&self) -> Result<(), CompanionError> {
        let path = self.config_path(LICENSE_FILE);
        let _guard = self.lock(&path).await;
        match tokio::fs::remove_file(&path).await {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}
