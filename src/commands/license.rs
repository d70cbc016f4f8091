//! Bot licensing: /register, /check-bot-status.

use chrono::{DateTime, Utc};
use companion_store::store::LicenseInfo;
use companion_store::Notice;
use tracing::{error, info};

use super::{format_date, CommandContext, Reply, OWNER_ONLY};
use crate::license::{time_remaining, Registration};

fn expiry_line(expires_at: Option<DateTime<Utc>>) -> String {
    match expires_at {
        Some(at) => format!("\n📅 Expires on: {}", format_date(at)),
        None => "\n📅 License type: Permanent (never expires)".to_string(),
    }
}

/// Handle `/register <license-key>`. Anyone may register the bot.
pub(super) async fn handle_register(ctx: &CommandContext<'_>) -> Reply {
    let Some(key) = ctx.args().first().copied() else {
        return Reply::text("❌ Please provide a license key. Usage: /register YOUR-LICENSE-KEY");
    };
    let reply = Reply::text("🔄 Registering bot with license key... Please wait.");

    let info = match ctx.license.register(key, ctx.now).await {
        Ok(Registration::Registered(info)) => info,
        Ok(Registration::WrongNumber) => {
            return reply.also(
                "❌ Registration failed: Aren't you ashamed to take someone else's key and use it, kids?\n\n\
                 This license key was created for a different WhatsApp number and cannot be used with this bot.",
            )
        }
        Ok(Registration::Rejected(message)) => {
            return reply.also(format!(
                "❌ Registration failed: {message}\n\nPlease check your license key and try again."
            ))
        }
        Err(e) => {
            error!("license: registration failed: {e}");
            return reply.also(
                "❌ Registration failed: Could not reach the license service\n\nPlease check your license key and try again.",
            );
        }
    };

    let package = info.package();
    let expiry = expiry_line(info.expires_at);
    info!("license: registered by {}", ctx.sender_id);
    let mut reply = reply.also(format!(
        "✅ Bot registered successfully!\n🔑 Package: {package}{expiry}"
    ));
    if !ctx.is_owner() && !ctx.config.bot.owner.is_empty() {
        reply = reply.notify(Notice::new(
            ctx.config.bot.owner.clone(),
            format!(
                "🔔 Your bot has been registered by a user!\n👤 User: {}\n🔑 License key: {key}\n📦 Package: {package}{expiry}",
                ctx.sender_id
            ),
        ));
    }
    reply
}

fn status_text(info: &LicenseInfo, bot_number: &str, dashboard: &str, now: DateTime<Utc>) -> String {
    let connection = match info.is_connected {
        Some(true) => "Connected",
        Some(false) => "Disconnected",
        None if info.is_active() => "Connected",
        None => "Disconnected",
    };
    let creds = info.user_credentials.clone().unwrap_or_default();
    let or_na = |v: Option<String>| v.unwrap_or_else(|| "Not available".to_string());

    let mut text = format!(
        "*Bot License Status* 📊\n\n\
         🔑 Key: {}\n\
         🤖 Bot: {bot_number}\n\
         📦 Package: {}\n\
         📅 Created: {}\n\
         ⏱️ Time Remaining: {}\n\
         🔌 Connection: {connection}\n\
         ⌛ Expires: {}\n\
         🔄 Status: {}\n\n\
         *User Login Credentials* 🔐\n\
         👤 Username: {}\n\
         🔒 Password: {}",
        or_na(info.license_key.clone().or_else(|| info.id.clone())),
        info.package(),
        info.created_at
            .map(|at| at.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
        time_remaining(info, now),
        info.expires_at
            .map(format_date)
            .unwrap_or_else(|| "Never (Permanent License)".to_string()),
        if info.is_active() { "Active" } else { "Inactive" },
        or_na(creds.username),
        or_na(creds.password),
    );
    if !dashboard.is_empty() {
        text.push_str(&format!(
            "\n\n*Dashboard* 🌐\nLog in to your dashboard to view more details:\n{dashboard}"
        ));
    }
    text
}

/// Handle /check-bot-status.
pub(super) async fn handle_check_status(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let reply = Reply::text("🔄 Checking bot license status... Please wait.");
    match ctx.license.status(ctx.now).await {
        Ok(Some(info)) => reply.also(status_text(
            &info,
            ctx.license.bot_number(),
            ctx.license.dashboard_url(),
            ctx.now,
        )),
        Ok(None) => reply.also(
            "❌ Bot is not registered or the license has expired.\n\n\
             Use the command \"/register YOUR-LICENSE-KEY\" to register the bot.",
        ),
        Err(e) => {
            error!("license: status check failed: {e}");
            reply.also("❌ Could not reach the license service. Please try again later.")
        }
    }
}
