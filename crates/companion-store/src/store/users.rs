//! Per-user documents and character images.

use super::{read_json, write_json, Notice, Store, IMAGE_DIR, USER_DIR};
use crate::user::UserRecord;
use chrono::Utc;
use companion_core::error::CompanionError;
use tracing::{info, warn};

impl Store {
    /// Load a user, applying lazy premium expiry.
    ///
    /// An expired record is written back immediately; trial expiry also
    /// queues a notice for the user.
    pub async fn get_user(&self, user_id: &str) -> Result<Option<UserRecord>, CompanionError> {
        let path = self.user_path(user_id);
        let _guard = self.lock(&path).await;
        let Some(mut record) = read_json::<UserRecord>(&path).await? else {
            return Ok(None);
        };
        if self.apply_expiry(user_id, &mut record).await {
            record.trim_history();
            write_json(&path, &record).await?;
        }
        Ok(Some(record))
    }

    /// Replace a user document. History is capped to the tier's limit first.
    pub async fn save_user(
        &self,
        user_id: &str,
        record: &mut UserRecord,
    ) -> Result<(), CompanionError> {
        let path = self.user_path(user_id);
        let _guard = self.lock(&path).await;
        record.trim_history();
        write_json(&path, record).await
    }

    /// Read-modify-write an existing user under the file lock.
    ///
    /// Returns `Ok(None)` when the user has no document.
    pub async fn update_user<F, R>(&self, user_id: &str, f: F) -> Result<Option<R>, CompanionError>
    where
        F: FnOnce(&mut UserRecord) -> R,
    {
        let path = self.user_path(user_id);
        let _guard = self.lock(&path).await;
        let Some(mut record) = read_json::<UserRecord>(&path).await? else {
            return Ok(None);
        };
        self.apply_expiry(user_id, &mut record).await;
        let out = f(&mut record);
        record.trim_history();
        write_json(&path, &record).await?;
        Ok(Some(out))
    }

    /// Like `update_user`, creating an empty document when none exists.
    pub async fn upsert_user<F, R>(&self, user_id: &str, f: F) -> Result<R, CompanionError>
    where
        F: FnOnce(&mut UserRecord) -> R,
    {
        let path = self.user_path(user_id);
        let _guard = self.lock(&path).await;
        let mut record = match read_json::<UserRecord>(&path).await? {
            Some(mut r) => {
                self.apply_expiry(user_id, &mut r).await;
                r
            }
            None => UserRecord {
                created_at: Some(Utc::now()),
                ..UserRecord::default()
            },
        };
        let out = f(&mut record);
        record.trim_history();
        write_json(&path, &record).await?;
        Ok(out)
    }

    /// Every user id with a document, sorted.
    pub async fn user_ids(&self) -> Result<Vec<String>, CompanionError> {
        let mut ids = Vec::new();
        let mut entries = tokio::fs::read_dir(self.root.join(USER_DIR)).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if let Some(id) = name.strip_suffix(".json") {
                ids.push(id.to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }

    /// Load every user, skipping unreadable documents.
    pub async fn all_users(&self) -> Result<Vec<(String, UserRecord)>, CompanionError> {
        let mut users = Vec::new();
        for id in self.user_ids().await? {
            match self.get_user(&id).await {
                Ok(Some(record)) => users.push((id, record)),
                Ok(None) => {}
                Err(e) => warn!("store: skipping unreadable user {id}: {e}"),
            }
        }
        Ok(users)
    }

    /// Expire lapsed premium across all users. Returns how many changed.
    pub async fn sweep_premium_expiry(&self) -> Result<usize, CompanionError> {
        let mut expired = 0;
        for id in self.user_ids().await? {
            let path = self.user_path(&id);
            let _guard = self.lock(&path).await;
            let mut record = match read_json::<UserRecord>(&path).await {
                Ok(Some(r)) => r,
                Ok(None) => continue,
                Err(e) => {
                    warn!("store: skipping unreadable user {id}: {e}");
                    continue;
                }
            };
            if self.apply_expiry(&id, &mut record).await {
                record.trim_history();
                write_json(&path, &record).await?;
                expired += 1;
            }
        }
        Ok(expired)
    }

    async fn apply_expiry(&self, user_id: &str, record: &mut UserRecord) -> bool {
        let Some(expiry) = record.expire_premium(Utc::now()) else {
            return false;
        };
        info!("store: premium expired for {user_id} ({expiry:?})");
        if let Some(text) = expiry.notice() {
            self.push_notice(Notice::new(user_id, text)).await;
        }
        true
    }

    /// Save a character photo, returning its path relative to the data dir.
    pub async fn save_character_image(
        &self,
        user_id: &str,
        bytes: &[u8],
    ) -> Result<String, CompanionError> {
        let relative = format!("{IMAGE_DIR}/{}.jpg", super::file_stem(user_id));
        let path = self.root.join(&relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            CompanionError::Store(format!("failed to save character image: {e}"))
        })?;
        Ok(relative)
    }

    pub async fn load_character_image(&self, relative: &str) -> Result<Vec<u8>, CompanionError> {
        tokio::fs::read(self.root.join(relative))
            .await
            .map_err(|e| CompanionError::Store(format!("failed to read {relative}: {e}")))
    }

    /// Remove a character photo. A missing file is not an error.
    pub async fn delete_character_image(&self, relative: &str) -> Result<(), CompanionError> {
        match tokio::fs::remove_file(self.root.join(relative)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(CompanionError::Store(format!(
                "failed to delete {relative}: {e}"
            ))),
        }
    }
}
