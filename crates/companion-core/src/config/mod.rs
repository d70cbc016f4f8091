mod channels;
mod defaults;
mod providers;

#[cfg(test)]
mod tests;

pub use channels::*;
pub use providers::*;

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::CompanionError;
use crate::message::normalize_user_id;
use defaults::*;

/// Top-level bot configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot: BotConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
    #[serde(default)]
    pub provider: ProviderConfig,
    #[serde(default)]
    pub channel: ChannelConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub auto_message: AutoMessageConfig,
    #[serde(default)]
    pub backup: BackupConfig,
    #[serde(default)]
    pub license: LicenseConfig,
}

/// General bot settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Phone number allowed to run administrative commands.
    #[serde(default)]
    pub owner: String,
    /// The bot's own WhatsApp number, used for license registration.
    #[serde(default)]
    pub bot_number: String,
    /// Number shown in upgrade hints. Empty = owner.
    #[serde(default)]
    pub premium_contact: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            data_dir: default_data_dir(),
            log_level: default_log_level(),
            owner: String::new(),
            bot_number: String::new(),
            premium_contact: String::new(),
        }
    }
}

impl BotConfig {
    /// Whether a sender is the configured owner.
    pub fn is_owner(&self, sender_id: &str) -> bool {
        let owner = normalize_user_id(&self.owner);
        !owner.is_empty() && owner == normalize_user_id(sender_id)
    }

    pub fn data_path(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.data_dir))
    }

    pub fn contact(&self) -> &str {
        if self.premium_contact.is_empty() {
            &self.owner
        } else {
            &self.premium_contact
        }
    }
}

/// Free-tier quotas and trial sizing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_daily_messages")]
    pub daily_messages: u32,
    #[serde(default = "default_daily_images")]
    pub daily_images: u32,
    #[serde(default = "default_free_resets")]
    pub free_resets: u32,
    /// Length of the first-companion premium trial.
    #[serde(default = "default_trial_minutes")]
    pub trial_minutes: i64,
    /// Premium messages between memory summaries.
    #[serde(default = "default_memory_interval")]
    pub memory_interval: u32,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            daily_messages: default_daily_messages(),
            daily_images: default_daily_images(),
            free_resets: default_free_resets(),
            trial_minutes: default_trial_minutes(),
            memory_interval: default_memory_interval(),
        }
    }
}

/// Scheduler configuration: reminders, task expiry, auto-messages, auto-backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            poll_interval_secs: default_poll_interval(),
        }
    }
}

/// Inactivity check-ins for users who opted in with `/automsg on`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutoMessageConfig {
    #[serde(default = "default_inactivity_hours")]
    pub inactivity_hours: i64,
}

impl Default for AutoMessageConfig {
    fn default() -> Self {
        Self {
            inactivity_hours: default_inactivity_hours(),
        }
    }
}

/// Local snapshot backups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default = "default_backup_dir")]
    pub dir: String,
    #[serde(default = "default_backup_interval")]
    pub interval_hours: i64,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: default_backup_dir(),
            interval_hours: default_backup_interval(),
        }
    }
}

impl BackupConfig {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(shellexpand(&self.dir))
    }
}

/// Remote license service. Disabled = every message passes the gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LicenseConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub base_url: String,
    /// Bearer token for the license service.
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_license_cache_minutes")]
    pub cache_minutes: i64,
    /// Dashboard link shown to the owner in `/check-bot-status`.
    #[serde(default)]
    pub dashboard_url: String,
}

impl Default for LicenseConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            base_url: String::new(),
            api_key: String::new(),
            cache_minutes: default_license_cache_minutes(),
            dashboard_url: String::new(),
        }
    }
}

/// Expand `~` to home directory.
pub fn shellexpand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = std::env::var_os("HOME") {
            return format!("{}/{rest}", home.to_string_lossy());
        }
    }
    path.to_string()
}

/// Load configuration from a TOML file.
///
/// Falls back to defaults if the file does not exist.
pub fn load(path: &str) -> Result<Config, CompanionError> {
    let path = Path::new(path);
    if !path.exists() {
        tracing::info!(
            "Config file not found at {}, using defaults",
            path.display()
        );
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        CompanionError::Config(format!("failed to read {}: {}", path.display(), e))
    })?;

    parse(&content)
}

/// Parse configuration from TOML text and validate it.
pub fn parse(content: &str) -> Result<Config, CompanionError> {
    let config: Config = toml::from_str(content)
        .map_err(|e| CompanionError::Config(format!("failed to parse config: {}", e)))?;

    if config.license.enabled && config.license.base_url.is_empty() {
        return Err(CompanionError::Config(
            "license.enabled requires license.base_url".to_string(),
        ));
    }
    if let Some(wa) = config.channel.whatsapp.as_ref().filter(|w| w.enabled) {
        if wa.access_token.is_empty() || wa.phone_number_id.is_empty() {
            return Err(CompanionError::Config(
                "channel.whatsapp needs access_token and phone_number_id".to_string(),
            ));
        }
    }

    Ok(config)
}
