use super::*;
use crate::duration::GrantDuration;
use crate::reminder::Recurrence;
use crate::task::{AddTaskOutcome, CompletionOutcome, MaxCompletions, NewTask, TaskEvent};
use crate::user::{UserRecord, FREE_HISTORY_CAP};
use chrono::{Duration, Utc};
use companion_core::{context::ContextEntry, service::Service, traits::KeySource};
use tempfile::TempDir;

async fn test_store() -> (TempDir, Store) {
    let dir = TempDir::new().unwrap();
    let store = Store::new(dir.path()).await.unwrap();
    (dir, store)
}

fn new_task(name: &str, max: MaxCompletions) -> NewTask {
    NewTask {
        name: name.to_string(),
        description: "Follow our page".to_string(),
        max_completions: max,
        key: "K3Y".to_string(),
        key_link: "https://example.com/key".to_string(),
        premium_duration: GrantDuration::Hours(6),
        expire_duration: GrantDuration::Days(2),
    }
}

#[tokio::test]
async fn test_missing_user_is_none() {
    let (_dir, store) = test_store().await;
    assert!(store.get_user("15550100").await.unwrap().is_none());
    assert!(store.update_user("15550100", |_| ()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_save_caps_history_on_disk() {
    let (_dir, store) = test_store().await;
    let mut record = UserRecord {
        companion_name: Some("Rin".into()),
        conversation_history: (0..14)
            .map(|i| ContextEntry::user(format!("m{i}")))
            .collect(),
        ..Default::default()
    };
    store.save_user("15550100", &mut record).await.unwrap();

    let loaded = store.get_user("15550100").await.unwrap().unwrap();
    assert_eq!(loaded.conversation_history.len(), FREE_HISTORY_CAP);
    assert_eq!(loaded.conversation_history[0].content, "m4");
    assert_eq!(loaded.conversation_history.last().unwrap().content, "m13");
}

#[tokio::test]
async fn test_get_user_expires_trial_and_queues_notice() {
    let (_dir, store) = test_store().await;
    let mut record = UserRecord::default();
    record.start_free_trial(Utc::now() - Duration::hours(2), 60);
    record.memory.topics.insert("music".into(), 1);
    store.save_user("15550100", &mut record).await.unwrap();

    let loaded = store.get_user("15550100").await.unwrap().unwrap();
    assert!(!loaded.is_premium);
    assert!(!loaded.is_free_trial);
    assert!(loaded.memory.is_empty());

    let notices = store.take_notices().await;
    assert_eq!(notices.len(), 1);
    assert_eq!(notices[0].to, "15550100");
    assert!(store.take_notices().await.is_empty());

    // Persisted, so a second read does not notify again.
    store.get_user("15550100").await.unwrap();
    assert!(store.take_notices().await.is_empty());
}

#[tokio::test]
async fn test_upsert_creates_record() {
    let (_dir, store) = test_store().await;
    store
        .upsert_user("15550100", |r| {
            r.grant_premium(GrantDuration::Lifetime, "owner", Utc::now())
        })
        .await
        .unwrap();
    let loaded = store.get_user("15550100").await.unwrap().unwrap();
    assert!(loaded.is_lifetime_premium());
    assert!(loaded.created_at.is_some());
    assert_eq!(store.user_ids().await.unwrap(), vec!["15550100".to_string()]);
}

#[tokio::test]
async fn test_concurrent_updates_are_not_lost() {
    let (_dir, store) = test_store().await;
    let mut record = UserRecord::default();
    store.save_user("1", &mut record).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..20 {
        let store = store.clone();
        handles.push(tokio::spawn(async move {
            store
                .update_user("1", |r| r.image_generation_count += 1)
                .await
                .unwrap();
        }));
    }
    for h in handles {
        h.await.unwrap();
    }
    let loaded = store.get_user("1").await.unwrap().unwrap();
    assert_eq!(loaded.image_generation_count, 20);
}

#[tokio::test]
async fn test_sweep_premium_expiry_counts_changes() {
    let (_dir, store) = test_store().await;
    let mut lapsed = UserRecord::default();
    lapsed.grant_premium(GrantDuration::Hours(1), "owner", Utc::now() - Duration::hours(5));
    store.save_user("a", &mut lapsed).await.unwrap();
    let mut active = UserRecord::default();
    active.grant_premium(GrantDuration::Days(1), "owner", Utc::now());
    store.save_user("b", &mut active).await.unwrap();

    assert_eq!(store.sweep_premium_expiry().await.unwrap(), 1);
    assert_eq!(store.sweep_premium_expiry().await.unwrap(), 0);
}

#[tokio::test]
async fn test_character_image_lifecycle() {
    let (_dir, store) = test_store().await;
    let rel = store.save_character_image("15550100", b"jpeg").await.unwrap();
    assert_eq!(rel, "character_images/15550100.jpg");
    assert_eq!(store.load_character_image(&rel).await.unwrap(), b"jpeg");
    store.delete_character_image(&rel).await.unwrap();
    store.delete_character_image(&rel).await.unwrap();
    assert!(store.load_character_image(&rel).await.is_err());
}

#[tokio::test]
async fn test_user_id_cannot_escape_data_dir() {
    let (dir, store) = test_store().await;
    let mut record = UserRecord::default();
    store.save_user("../../etc/passwd", &mut record).await.unwrap();
    assert!(dir.path().join("user_data/etcpasswd.json").exists());
}

#[tokio::test]
async fn test_key_source_rotates_and_persists() {
    let (_dir, store) = test_store().await;
    assert!(!store.has_keys(Service::Gemini).await);
    assert_eq!(store.next_key(Service::Gemini).await.unwrap(), None);

    store.add_key(Service::Gemini, "key-a").await.unwrap().unwrap();
    store.add_key(Service::Gemini, "key-b").await.unwrap().unwrap();
    assert!(store.has_keys(Service::Gemini).await);

    let first = store.next_key(Service::Gemini).await.unwrap().unwrap();
    let second = store.next_key(Service::Gemini).await.unwrap().unwrap();
    assert_ne!(first, second);

    // A fresh handle on the same directory continues the rotation.
    let reopened = Store::new(store.root().to_path_buf()).await.unwrap();
    let third = reopened.next_key(Service::Gemini).await.unwrap().unwrap();
    assert_eq!(third, first);
}

#[tokio::test]
async fn test_seed_keys_skips_duplicates() {
    let (_dir, store) = test_store().await;
    assert_eq!(store.seed_keys(Service::OpenRouter, "a, b,,a").await.unwrap(), 2);
    assert_eq!(store.seed_keys(Service::OpenRouter, "b,c").await.unwrap(), 1);
    assert_eq!(store.key_pool().await.unwrap().openrouter.len(), 3);
}

#[tokio::test]
async fn test_task_lifecycle() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    assert!(matches!(
        store.add_task(new_task("Follow", MaxCompletions::Limited(1)), now).await.unwrap(),
        AddTaskOutcome::Created(_)
    ));
    assert!(matches!(
        store.add_task(new_task("FOLLOW", MaxCompletions::Unlimited), now).await.unwrap(),
        AddTaskOutcome::Duplicate
    ));

    store.save_user("u1", &mut UserRecord::default()).await.unwrap();
    assert_eq!(
        store.redeem_task("nope", "K3Y", "u1", now).await.unwrap(),
        CompletionOutcome::NotFound
    );
    assert_eq!(
        store.redeem_task("follow", "bad", "u1", now).await.unwrap(),
        CompletionOutcome::IncorrectKey
    );
    assert!(matches!(
        store.redeem_task("follow", "K3Y", "u1", now).await.unwrap(),
        CompletionOutcome::Completed { now_full: true, .. }
    ));
    let u1 = store.get_user("u1").await.unwrap().unwrap();
    assert!(u1.is_task_trial);
    assert_eq!(u1.premium_expiry, Some(now + Duration::hours(6)));
    assert_eq!(
        store.redeem_task("follow", "K3Y", "u2", now).await.unwrap(),
        CompletionOutcome::Full
    );

    // Fullness was reported by the redeeming call.
    assert!(store.sweep_tasks(now).await.unwrap().is_empty());
    let later = now + chrono::Duration::days(2);
    assert!(matches!(
        store.sweep_tasks(later).await.unwrap().as_slice(),
        [TaskEvent::Expired { completions: 1, .. }]
    ));

    assert!(store.delete_task("follow").await.unwrap());
    assert!(!store.delete_task("follow").await.unwrap());
    assert!(store.tasks().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_redeem_without_user_record_keeps_key_unused() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    store.add_task(new_task("Follow", MaxCompletions::Limited(1)), now).await.unwrap();

    assert!(store.redeem_task("follow", "K3Y", "ghost", now).await.is_err());
    assert!(store.tasks().await.unwrap()[0].completed_by.is_empty());

    store.save_user("u1", &mut UserRecord::default()).await.unwrap();
    assert!(matches!(
        store.redeem_task("follow", "K3Y", "u1", now).await.unwrap(),
        CompletionOutcome::Completed { now_full: true, .. }
    ));
}

#[tokio::test]
async fn test_expired_redeem_is_persisted() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    store.add_task(new_task("Old", MaxCompletions::Unlimited), now).await.unwrap();
    let later = now + Duration::days(3);
    assert_eq!(
        store.redeem_task("old", "K3Y", "u1", later).await.unwrap(),
        CompletionOutcome::Expired
    );
    assert!(store.tasks().await.unwrap()[0].is_expired);
}

#[tokio::test]
async fn test_reminder_lifecycle() {
    let (_dir, store) = test_store().await;
    let now = Utc::now();
    let once = store
        .create_reminder("u1", "call mom", now - Duration::minutes(1), None)
        .await
        .unwrap();
    let daily = store
        .create_reminder("u1", "vitamins", now - Duration::minutes(5), Some(Recurrence::Daily))
        .await
        .unwrap();
    store
        .create_reminder("u2", "later", now + Duration::hours(3), None)
        .await
        .unwrap();

    assert_eq!(once.id.len(), 8);
    assert_eq!(store.reminders_for("u1").await.unwrap().len(), 2);
    assert_eq!(store.due_reminders(now).await.unwrap().len(), 2);

    store.finish_reminder(&once.id, now).await.unwrap();
    store.finish_reminder(&daily.id, now).await.unwrap();
    let remaining = store.reminders_for("u1").await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert!(remaining[0].time > now);
    assert!(store.due_reminders(now).await.unwrap().is_empty());

    // Another user's id does not delete.
    assert!(!store.delete_reminder("u2", &daily.id).await.unwrap());
    assert!(store.delete_reminder("u1", &daily.id).await.unwrap());
}

#[tokio::test]
async fn test_backup_and_restore_roundtrip() {
    let (_dir, store) = test_store().await;
    let backups = TempDir::new().unwrap();
    let mut record = UserRecord {
        companion_name: Some("Rin".into()),
        ..Default::default()
    };
    store.save_user("u1", &mut record).await.unwrap();

    let earlier = Utc::now() - Duration::hours(1);
    store.create_backup(backups.path(), earlier).await.unwrap();
    assert_eq!(
        store.backup_settings().await.unwrap().last_backup,
        Some(earlier)
    );

    record.companion_name = Some("Kai".into());
    store.save_user("u1", &mut record).await.unwrap();
    let latest = store.create_backup(backups.path(), Utc::now()).await.unwrap();

    record.companion_name = Some("Broken".into());
    store.save_user("u1", &mut record).await.unwrap();

    let restored = store.restore_latest(backups.path()).await.unwrap();
    assert_eq!(restored, Some(latest));
    let loaded = store.get_user("u1").await.unwrap().unwrap();
    assert_eq!(loaded.companion_name.as_deref(), Some("Kai"));
}

#[tokio::test]
async fn test_restore_without_snapshots() {
    let (_dir, store) = test_store().await;
    let backups = TempDir::new().unwrap();
    assert_eq!(store.restore_latest(backups.path()).await.unwrap(), None);
}

#[tokio::test]
async fn test_auto_backup_flag() {
    let (_dir, store) = test_store().await;
    assert!(!store.set_auto_backup(true).await.unwrap());
    assert!(store.set_auto_backup(true).await.unwrap());
    assert!(store.backup_settings().await.unwrap().auto_backup);
}

#[tokio::test]
async fn test_license_cache_roundtrip() {
    let (_dir, store) = test_store().await;
    assert!(store.license_cache().await.unwrap().is_none());
    let cache = LicenseCache {
        bot_number: "15550100".into(),
        license_info: LicenseInfo {
            package_type: Some("premium_monthly".into()),
            status: Some("active".into()),
            ..Default::default()
        },
        last_check_time: Utc::now(),
    };
    store.save_license_cache(&cache).await.unwrap();
    let loaded = store.license_cache().await.unwrap().unwrap();
    assert_eq!(loaded.license_info.package(), "premium monthly");
    assert!(loaded.license_info.is_active());
    store.clear_license_cache().await.unwrap();
    assert!(store.license_cache().await.unwrap().is_none());
}
