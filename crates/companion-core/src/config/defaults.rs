//! Default value functions used by serde for config deserialization.

pub fn default_name() -> String {
    "AI Companion".to_string()
}

pub fn default_data_dir() -> String {
    "~/.companion".to_string()
}

pub fn default_log_level() -> String {
    "info".to_string()
}

pub fn default_true() -> bool {
    true
}

pub fn default_daily_messages() -> u32 {
    100
}

pub fn default_daily_images() -> u32 {
    3
}

pub fn default_free_resets() -> u32 {
    2
}

pub fn default_trial_minutes() -> i64 {
    60
}

pub fn default_memory_interval() -> u32 {
    20
}

pub fn default_gemini_flash_model() -> String {
    "gemini-2.0-flash-lite".to_string()
}

pub fn default_gemini_model() -> String {
    "gemini-2.0-flash".to_string()
}

pub fn default_image_model() -> String {
    "gemini-2.0-flash-exp-image-generation".to_string()
}

pub fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

pub fn default_openrouter_model() -> String {
    "google/gemini-2.0-flash-exp:free".to_string()
}

pub fn default_openrouter_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

pub fn default_openrouter_referer() -> String {
    "https://github.com/whatsapp-ai-companion".to_string()
}

pub fn default_openrouter_title() -> String {
    "WhatsApp AI Companion".to_string()
}

pub fn default_graph_api_version() -> String {
    "v18.0".to_string()
}

pub fn default_webhook_host() -> String {
    "0.0.0.0".to_string()
}

pub fn default_webhook_port() -> u16 {
    8080
}

pub fn default_poll_interval() -> u64 {
    60
}

pub fn default_inactivity_hours() -> i64 {
    6
}

pub fn default_backup_dir() -> String {
    "~/.companion/backups".to_string()
}

pub fn default_backup_interval() -> i64 {
    24
}

pub fn default_license_cache_minutes() -> i64 {
    30
}
