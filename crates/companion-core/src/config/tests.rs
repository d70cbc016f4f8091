use super::*;

#[test]
fn test_defaults_when_sections_missing() {
    let cfg = parse("[bot]\nowner = \"+94 77 123 4567\"\n").unwrap();
    assert_eq!(cfg.limits.daily_messages, 100);
    assert_eq!(cfg.limits.daily_images, 3);
    assert_eq!(cfg.limits.free_resets, 2);
    assert_eq!(cfg.limits.trial_minutes, 60);
    assert_eq!(cfg.provider.gemini_flash_model, "gemini-2.0-flash-lite");
    assert_eq!(
        cfg.provider.openrouter_model,
        "google/gemini-2.0-flash-exp:free"
    );
    assert!(cfg.scheduler.enabled);
    assert!(!cfg.license.enabled);
    assert!(cfg.channel.whatsapp.is_none());
}

#[test]
fn test_is_owner_normalizes_numbers() {
    let cfg = parse("[bot]\nowner = \"+94 77 123 4567\"\n").unwrap();
    assert!(cfg.bot.is_owner("94771234567"));
    assert!(cfg.bot.is_owner("94771234567@s.whatsapp.net"));
    assert!(!cfg.bot.is_owner("15550100"));
}

#[test]
fn test_empty_owner_matches_nobody() {
    let cfg = Config::default();
    assert!(!cfg.bot.is_owner(""));
    assert!(!cfg.bot.is_owner("15550100"));
}

#[test]
fn test_whatsapp_section_parses() {
    let toml_str = r#"
        [channel.whatsapp]
        enabled = true
        access_token = "EAAG"
        phone_number_id = "1234"
        verify_token = "hush"
        port = 9000
    "#;
    let cfg = parse(toml_str).unwrap();
    let wa = cfg.channel.whatsapp.unwrap();
    assert_eq!(wa.port, 9000);
    assert_eq!(wa.api_version, "v18.0");
    assert_eq!(wa.host, "0.0.0.0");
}

#[test]
fn test_enabled_whatsapp_without_token_is_rejected() {
    let err = parse("[channel.whatsapp]\nenabled = true\n").unwrap_err();
    assert!(err.to_string().contains("access_token"));
}

#[test]
fn test_enabled_license_requires_base_url() {
    let err = parse("[license]\nenabled = true\n").unwrap_err();
    assert!(matches!(err, CompanionError::Config(_)));
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let cfg = load("/nonexistent/companion/config.toml").unwrap();
    assert_eq!(cfg.bot.name, "AI Companion");
    assert_eq!(cfg.backup.interval_hours, 24);
}

#[test]
fn test_contact_falls_back_to_owner() {
    let mut cfg = Config::default();
    cfg.bot.owner = "15550100".to_string();
    assert_eq!(cfg.bot.contact(), "15550100");
    cfg.bot.premium_contact = "15550199".to_string();
    assert_eq!(cfg.bot.contact(), "15550199");
}

#[test]
fn test_shellexpand_leaves_absolute_paths() {
    assert_eq!(shellexpand("/var/lib/companion"), "/var/lib/companion");
}
