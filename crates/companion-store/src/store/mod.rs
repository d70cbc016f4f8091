//! File-backed JSON store.
//!
//! Split into focused submodules:
//! - `users`: per-user documents, lazy premium expiry, character images
//! - `keys`: the rotating API key pool
//! - `tasks`: task campaigns and redemptions
//! - `reminders`: reminder CRUD and due queries
//! - `license`: cached license status
//! - `backup`: local snapshots and the auto-backup flag
//!
//! Every read-modify-write of a file runs under that file's async mutex, so
//! each document has a single writer at a time.

mod backup;
mod keys;
mod license;
mod reminders;
mod tasks;
mod users;

#[cfg(test)]
mod tests;

pub use backup::BackupSettings;
pub use license::{LicenseCache, LicenseInfo, UserCredentials};

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use companion_core::error::CompanionError;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::info;

const USER_DIR: &str = "user_data";
const CONFIG_DIR: &str = "config";
const IMAGE_DIR: &str = "character_images";

/// A message for a user other than the one currently being served.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub to: String,
    pub text: String,
}

impl Notice {
    pub fn new(to: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            to: to.into(),
            text: text.into(),
        }
    }
}

/// Persistent store rooted at the bot's data directory.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
    locks: Arc<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>>,
    notices: Arc<Mutex<Vec<Notice>>>,
}

impl Store {
    /// Open the store, creating its directories on first use.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, CompanionError> {
        let root = root.into();
        for dir in [USER_DIR, CONFIG_DIR, IMAGE_DIR] {
            tokio::fs::create_dir_all(root.join(dir)).await.map_err(|e| {
                CompanionError::Store(format!("failed to create {}: {e}", root.join(dir).display()))
            })?;
        }
        info!("store initialized at {}", root.display());
        Ok(Self {
            root,
            locks: Arc::new(Mutex::new(HashMap::new())),
            notices: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        self.root
            .join(USER_DIR)
            .join(format!("{}.json", file_stem(user_id)))
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.root.join(CONFIG_DIR).join(name)
    }

    /// Acquire the single-writer lock for one file.
    async fn lock(&self, path: &Path) -> OwnedMutexGuard<()> {
        let file_lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(path.to_path_buf())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        file_lock.lock_owned().await
    }

    /// Queue a message for delivery by the gateway.
    pub async fn push_notice(&self, notice: Notice) {
        self.notices.lock().await.push(notice);
    }

    /// Drain queued notices.
    pub async fn take_notices(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().await)
    }
}

/// Keep ids filesystem-safe: digits, letters, `-` and `_` only.
fn file_stem(user_id: &str) -> String {
    user_id
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
        .collect()
}

/// Read a JSON document. A missing file is `Ok(None)`.
async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, CompanionError> {
    match tokio::fs::read(path).await {
        Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(CompanionError::Store(format!(
            "failed to read {}: {e}",
            path.display()
        ))),
    }
}

/// Write a JSON document through a temp file and rename.
async fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), CompanionError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let bytes = serde_json::to_vec_pretty(value)?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, bytes).await.map_err(|e| {
        CompanionError::Store(format!("failed to write {}: {e}", tmp.display()))
    })?;
    tokio::fs::rename(&tmp, path).await.map_err(|e| {
        CompanionError::Store(format!("failed to replace {}: {e}", path.display()))
    })?;
    Ok(())
}
