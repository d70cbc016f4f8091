//! Owner premium management: /add prem, /del prem, /listprem.

use chrono::{DateTime, Utc};
use companion_store::{GrantDuration, Notice};
use tracing::{error, info};

use super::{format_date, normalize_phone, CommandContext, Reply, OWNER_ONLY};

const ADD_USAGE: &str = "❌ Usage: /add prem [duration] [phone_number]";

/// Handle `/add prem <duration> <phone>`.
pub(super) async fn handle_add(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let args = ctx.args();
    if args.len() < 2 {
        return Reply::text(ADD_USAGE);
    }
    if !args[0].eq_ignore_ascii_case("prem") {
        return Reply::text("❌ Unknown add command. Available options: prem");
    }
    if args.len() < 3 {
        return Reply::text(format!(
            "{ADD_USAGE}\n\nDuration options:\n- lifetime\n- 1h to 24h (hours)\n- 1d to 30d (days)"
        ));
    }

    let duration = match GrantDuration::parse_grant(args[1]) {
        Ok(d) => d,
        Err(e) => return Reply::text(e.to_string()),
    };
    let phone = normalize_phone(args[2]);
    let granted_by = ctx.sender_id.to_string();
    let now = ctx.now;

    let result = ctx
        .store
        .upsert_user(&phone, move |record| {
            record.grant_premium(duration, &granted_by, now);
            // An owner grant replaces any running trial.
            record.is_free_trial = false;
            record.is_task_trial = false;
            record.premium_expiry
        })
        .await;

    match result {
        Ok(expiry) => {
            info!("premium: granted {duration} to {phone}");
            let expiry_text = expiry_text(expiry);
            let described = duration.describe();
            Reply::text(format!(
                "✅ Premium access granted to {phone} for {described}.{expiry_text}"
            ))
            .notify(Notice::new(
                phone.clone(),
                format!(
                    "🌟 Congratulations! You've been granted premium access for {described}!{expiry_text}\n\n\
                     Enjoy all premium features including unlimited messages, enhanced memory, and more!"
                ),
            ))
        }
        Err(e) => {
            error!("premium: failed to grant {phone}: {e}");
            Reply::text("❌ Error adding premium. Please try again.")
        }
    }
}

fn expiry_text(expiry: Option<DateTime<Utc>>) -> String {
    match expiry {
        Some(at) => format!("\nExpires on: {}", format_date(at)),
        None => "\nDuration: Lifetime (never expires)".to_string(),
    }
}

/// Handle `/del prem <phone>`.
pub(super) async fn handle_del(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let args = ctx.args();
    if args.len() < 2 {
        return Reply::text("❌ Usage: /del prem [phone_number]");
    }
    if !args[0].eq_ignore_ascii_case("prem") {
        return Reply::text("❌ Unknown del command. Available options: prem");
    }
    let phone = normalize_phone(args[1]);
    let removed_by = ctx.sender_id.to_string();
    let now = ctx.now;

    let result = ctx
        .store
        .update_user(&phone, move |record| {
            if !record.is_premium {
                return false;
            }
            record.revoke_premium(&removed_by, now);
            record.is_free_trial = false;
            record.is_task_trial = false;
            true
        })
        .await;

    match result {
        Ok(None) => Reply::text(format!("❌ User {phone} not found.")),
        Ok(Some(false)) => Reply::text(format!("❌ User {phone} does not have premium access.")),
        Ok(Some(true)) => {
            info!("premium: revoked {phone}");
            Reply::text(format!("✅ Premium access removed from {phone}.")).notify(Notice::new(
                phone.clone(),
                "⚠️ Your premium access has been removed. You've been returned to free tier with limited features.",
            ))
        }
        Err(e) => {
            error!("premium: failed to revoke {phone}: {e}");
            Reply::text("❌ Error removing premium. Please try again.")
        }
    }
}

/// `1d 2h 3m remaining`, dropping leading zero units.
fn remaining_compact(now: DateTime<Utc>, until: DateTime<Utc>) -> String {
    let left = until - now;
    let (days, hours, minutes) = (
        left.num_days(),
        left.num_hours() % 24,
        left.num_minutes() % 60,
    );
    if days > 0 {
        format!("{days}d {hours}h {minutes}m remaining")
    } else if hours > 0 {
        format!("{hours}h {minutes}m remaining")
    } else {
        format!("{minutes}m remaining")
    }
}

/// Handle /listprem.
pub(super) async fn handle_listprem(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let users = match ctx.store.all_users().await {
        Ok(users) => users,
        Err(e) => {
            error!("premium: failed to list users: {e}");
            return Reply::text("❌ Error listing premium users. Please try again.");
        }
    };

    let premium: Vec<_> = users.into_iter().filter(|(_, r)| r.is_premium).collect();
    if premium.is_empty() {
        return Reply::text("📊 No premium users found.");
    }

    let mut text = String::from("📊 *Premium Users List*\n\n");
    for (i, (phone, record)) in premium.iter().enumerate() {
        let (status, left) = match record.premium_expiry {
            Some(until) if until > ctx.now => ("Active", remaining_compact(ctx.now, until)),
            Some(_) => ("Expired", "Expired".to_string()),
            None => ("Active", "Never expires".to_string()),
        };
        text.push_str(&format!(
            "*{}. {phone}*\n   Status: {status}\n   Added: {}\n   Duration: {}\n   Expires: {}\n   Remaining: {left}\n\n",
            i + 1,
            record
                .premium_added_at
                .map(format_date)
                .unwrap_or_else(|| "Unknown".to_string()),
            record.premium_duration.as_deref().unwrap_or("Lifetime"),
            record
                .premium_expiry
                .map(format_date)
                .unwrap_or_else(|| "Never".to_string()),
        ));
    }
    Reply::text(text)
}
