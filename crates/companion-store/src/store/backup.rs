//! Local snapshot backups of the data directory.

use std::path::{Path, PathBuf};

use super::{read_json, write_json, Store, CONFIG_DIR, IMAGE_DIR, USER_DIR};
use chrono::{DateTime, Utc};
use companion_core::error::CompanionError;
use serde::{Deserialize, Serialize};
use tracing::info;

const BACKUP_FILE: &str = "backup.json";
const SNAPSHOT_DIRS: [&str; 3] = [USER_DIR, CONFIG_DIR, IMAGE_DIR];

/// Stored at `config/backup.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BackupSettings {
    pub auto_backup: bool,
    pub last_backup: Option<DateTime<Utc>>,
}

impl Store {
    pub async fn backup_settings(&self) -> Result<BackupSettings, CompanionError> {
        let path = self.config_path(BACKUP_FILE);
        let _guard = self.lock(&path).await;
        Ok(read_json(&path).await?.unwrap_or_default())
    }

    async fn with_backup_settings<F, R>(&self, f: F) -> Result<R, CompanionError>
    where
        F: FnOnce(&mut BackupSettings) -> R,
    {
        let path = self.config_path(BACKUP_FILE);
        let _guard = self.lock(&path).await;
        let mut settings: BackupSettings = read_json(&path).await?.unwrap_or_default();
        let out = f(&mut settings);
        write_json(&path, &settings).await?;
        Ok(out)
    }

    /// Set the auto-backup flag. Returns the previous value.
    pub async fn set_auto_backup(&self, enabled: bool) -> Result<bool, CompanionError> {
        self.with_backup_settings(|s| std::mem::replace(&mut s.auto_backup, enabled))
            .await
    }

    /// Copy users, config and character images into `{dest}/{timestamp}/`.
    pub async fn create_backup(
        &self,
        dest: &Path,
        now: DateTime<Utc>,
    ) -> Result<PathBuf, CompanionError> {
        // Record the time first so the snapshot carries it.
        self.with_backup_settings(|s| s.last_backup = Some(now)).await?;

        let snapshot = dest.join(now.format("%Y%m%d-%H%M%S").to_string());
        let mut files = 0;
        for dir in SNAPSHOT_DIRS {
            files += copy_flat(&self.root.join(dir), &snapshot.join(dir)).await?;
        }
        info!("backup: wrote {files} files to {}", snapshot.display());
        Ok(snapshot)
    }

    /// Restore the newest snapshot under `dest`. `Ok(None)` when none exists.
    pub async fn restore_latest(&self, dest: &Path) -> Result<Option<PathBuf>, CompanionError> {
        let Some(snapshot) = latest_snapshot(dest).await? else {
            return Ok(None);
        };
        let mut files = 0;
        for dir in SNAPSHOT_DIRS {
            files += copy_flat(&snapshot.join(dir), &self.root.join(dir)).await?;
        }
        info!("backup: restored {files} files from {}", snapshot.display());
        Ok(Some(snapshot))
    }
}

/// Snapshot directory names sort chronologically.
async fn latest_snapshot(dest: &Path) -> Result<Option<PathBuf>, CompanionError> {
    let mut entries = match tokio::fs::read_dir(dest).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    let mut latest: Option<PathBuf> = None;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_dir() {
            continue;
        }
        let path = entry.path();
        if latest.as_ref().map_or(true, |l| path.file_name() > l.file_name()) {
            latest = Some(path);
        }
    }
    Ok(latest)
}

/// Copy the regular files of one directory level. Temp files are skipped.
async fn copy_flat(src: &Path, dst: &Path) -> Result<usize, CompanionError> {
    let mut entries = match tokio::fs::read_dir(src).await {
        Ok(e) => e,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    tokio::fs::create_dir_all(dst).await?;
    let mut copied = 0;
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let name = entry.file_name();
        if name.to_string_lossy().ends_with(".tmp") {
            continue;
        }
        tokio::fs::copy(entry.path(), dst.join(&name)).await?;
        copied += 1;
    }
    Ok(copied)
}
