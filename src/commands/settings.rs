//! Per-user and owner settings: /automsg, /backup, /restore, /autobackup.

use tracing::{error, info};

use super::{CommandContext, Reply, OWNER_ONLY};
use crate::onboarding::CREATION_HINT;

/// Handle `/automsg on|off|status`.
pub(super) async fn handle_automsg(ctx: &CommandContext<'_>) -> Reply {
    let arg = ctx.args().first().map(|a| a.to_lowercase());
    let enable = match arg.as_deref() {
        Some("on") => true,
        Some("off") => false,
        Some("status") => {
            let enabled = match ctx.store.get_user(ctx.sender_id).await {
                Ok(record) => record.is_some_and(|r| r.auto_message_enabled),
                Err(e) => {
                    error!("automsg: failed to load {}: {e}", ctx.sender_id);
                    false
                }
            };
            return Reply::text(format!(
                "Auto messaging is currently {}.",
                if enabled { "enabled" } else { "disabled" }
            ));
        }
        _ => {
            return Reply::text("Please specify 'on', 'off', or 'status'. For example: /automsg on")
        }
    };

    let now = ctx.now;
    let result = ctx
        .store
        .update_user(ctx.sender_id, move |r| {
            r.auto_message_enabled = enable;
            // The inactivity clock starts now.
            if enable {
                r.last_interaction = Some(now);
            }
        })
        .await;

    match result {
        Ok(Some(())) if enable => Reply::text(
            "Auto messaging has been enabled. I'll check on you if you're away for a while! 💫",
        ),
        Ok(Some(())) => Reply::text(
            "Auto messaging has been disabled. I won't send automatic messages anymore.",
        ),
        Ok(None) => Reply::text(CREATION_HINT),
        Err(e) => {
            error!("automsg: failed to update {}: {e}", ctx.sender_id);
            Reply::text("There was an error processing your request. Please try again later.")
        }
    }
}

/// Handle /backup.
pub(super) async fn handle_backup(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let reply = Reply::text("Starting manual backup... This may take a moment.");
    match ctx.store.create_backup(&ctx.config.backup.path(), ctx.now).await {
        Ok(snapshot) => {
            info!("backup: manual snapshot at {}", snapshot.display());
            reply.also(format!(
                "✅ Backup completed successfully!\n📁 {}",
                snapshot.display()
            ))
        }
        Err(e) => {
            error!("backup: manual backup failed: {e}");
            reply.also("❌ Backup failed. Please check the logs for details.")
        }
    }
}

/// Handle /restore.
pub(super) async fn handle_restore(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let reply = Reply::text("Starting manual restoration... This may take a moment.");
    match ctx.store.restore_latest(&ctx.config.backup.path()).await {
        Ok(Some(snapshot)) => {
            info!("backup: restored from {}", snapshot.display());
            reply.also("✅ Restoration completed successfully!")
        }
        Ok(None) => reply.also("❌ No backup found to restore from."),
        Err(e) => {
            error!("backup: restore failed: {e}");
            reply.also("❌ Restoration failed. Please check the logs for details.")
        }
    }
}

/// Handle `/autobackup on|off|status`.
pub(super) async fn handle_autobackup(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let Some(arg) = ctx.args().first().map(|a| a.to_lowercase()) else {
        return Reply::text("Usage: /autobackup [on|off|status]");
    };

    let enable = match arg.as_str() {
        "on" => true,
        "off" => false,
        "status" => {
            return match ctx.store.backup_settings().await {
                Ok(s) => Reply::text(format!(
                    "Auto backup is currently {}.",
                    if s.auto_backup { "enabled" } else { "disabled" }
                )),
                Err(e) => {
                    error!("backup: failed to read settings: {e}");
                    Reply::text("❌ Could not read backup settings. Please check the logs for details.")
                }
            }
        }
        _ => return Reply::text("Invalid command. Usage: /autobackup [on|off|status]"),
    };

    match ctx.store.set_auto_backup(enable).await {
        Ok(previous) if previous == enable => Reply::text(if enable {
            "Auto backup is already enabled."
        } else {
            "Auto backup is already disabled."
        }),
        Ok(_) => {
            info!("backup: auto backup {}", if enable { "enabled" } else { "disabled" });
            Reply::text(if enable {
                "✅ Auto backup has been enabled."
            } else {
                "❌ Auto backup has been disabled."
            })
        }
        Err(e) => {
            error!("backup: failed to update settings: {e}");
            Reply::text("❌ Could not update backup settings. Please check the logs for details.")
        }
    }
}
