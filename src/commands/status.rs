//! Informational handlers: /help, /premium, /myself.

use companion_store::UserRecord;
use tracing::error;

use super::{format_date, remaining, CommandContext, Reply};

const HELP_BASIC: &str = "*╔══════ WhatsApp AI Companion ══════╗*
*║                Help Menu                ║*
*╚═══════════════════════════════════╝*

*🤖 Basic Commands*
┌─────────────────────────
├ • /create - Create your AI companion
├ • /reset - Reset your AI companion
├ • /cancel - Cancel companion creation
├ • /premium - Upgrade to premium
├ • /myself - View your account status
└─────────────────────────

*📷 Image Generation*
┌─────────────────────────
├ • Send message: \"Send me your picture [description]\"
│   Create an image of your AI character in any scene
│   Example: \"Send me your picture in a garden\"
│
├ • Send photo with caption: \"/collob [description]\"
│   Create a collaborative image with you and AI together
│   Example: Send selfie with caption \"/collob taking a selfie together at the beach\"
│
├ • Natural Photo Requests
│   Simply ask in natural language like:
│   \"Show me a picture of you\"
│   \"Can I see you now ?\"
└─────────────────────────

*⚙️ Auto Message Settings*
┌─────────────────────────
├ • /automsg on - Enable auto messages
├ • /automsg off - Disable auto messages
├ • /automsg status - Check current status
└─────────────────────────

*⏰ Reminder Commands*
┌─────────────────────────
├ • /remind [time] to [text] - Set a reminder
├ • /reminders - List all your reminders
├ • /delreminder [id] - Delete a reminder
│
├ *Examples:*
├ • /remind tomorrow at 3pm to call mom
├ • /remind in 2 hours to take medicine
├ • /remind 5/20 at 9am to attend meeting
├ • /remind today at 12:02pm to eat lunch
│
├ *Natural Language:*
├ • Simply type phrases like:
├ • \"remind me to call mom at 3pm\"
├ • \"remind me in 2 hours to take medicine\"
├ • \"remind me to check email tomorrow morning\"
└─────────────────────────

*🎯 Task Commands*
┌─────────────────────────
├ • /task - View available tasks
├ • /taskkey [task name] [key] - Complete a task
│
├ *Example:*
├ • /taskkey Hyper abc123
└─────────────────────────";

const HELP_OWNER: &str = "

*🔐 Bot Owner Commands*
┌─────────────────────────
├ *Premium Management:*
├ • /add prem [duration] [phone_number]
├ • /del prem [phone_number]
├ • /listprem - List all premium users
│
├ *Duration Options:*
├ • lifetime - Never expires
├ • 1h to 24h - Hours
├ • 1d to 30d - Days
│
├ *Examples:*
├ • /add prem lifetime 15551234567
├ • /add prem 12h 15551234567
├ • /add prem 7d 15551234567
│
├ *Backup Management:*
├ • /backup - Snapshot all bot data
├ • /restore - Restore the latest snapshot
├ • /autobackup on|off - Toggle auto backups
├ • /autobackup status - Check status
│
├ *API Key Management:*
├ • /addkey [service] [key]
├ • /delkey [service] [key]
├ • /listkeys - List all API keys
│
├ *Services:*
├ • openrouter - AI option
├ • gemini - Image generation
├ • gemini_flash - AI responses
│
├ *Task Management:*
├ • /addtask [name] [description] [max] [key]
│   [key link] [premium duration] [expire duration]
├ • /deltask [task name]
├ • /listtasks - List all tasks
│
├ *License:*
├ • /check-bot-status - License details
│
├ *Example:*
├ • /addtask Hyper 'Happy Birthday Giveaway' 5
│   abc123 www.example.com/key 1h 24h
└─────────────────────────";

const HELP_PREMIUM: &str = "

*💎 Premium Features*
┌─────────────────────────
├ • Unlimited daily messages
├ • Enhanced memory and context
├ • Unlimited image generation
├ • Priority response times
├ • Exclusive premium-only features
└─────────────────────────";

/// Handle /help.
pub(super) async fn handle_help(ctx: &CommandContext<'_>) -> Reply {
    let unlimited = match ctx.store.get_user(ctx.sender_id).await {
        Ok(Some(record)) => record.is_unlimited(),
        _ => false,
    };

    let mut text = HELP_BASIC.to_string();
    if ctx.is_owner() {
        text.push_str(HELP_OWNER);
    }
    if unlimited {
        text.push_str(HELP_PREMIUM);
    } else {
        let limits = &ctx.config.limits;
        text.push_str(&format!(
            "\n\n*⚠️ Free Tier Limitations*\n┌─────────────────────────\n\
             ├ • {} messages per day\n├ • Limited memory and context\n\
             ├ • {} image generations per day\n├ • Type /premium to upgrade!\n\
             └─────────────────────────",
            limits.daily_messages, limits.daily_images
        ));
    }
    Reply::text(text)
}

/// Handle /premium.
pub(super) fn handle_premium(ctx: &CommandContext<'_>) -> Reply {
    Reply::text(format!(
        "*Premium Features* ✨\n\n\
         - Unlimited high-quality images\n\
         - Priority response times\n\
         - Custom scenarios\n\
         - Extended conversation memory\n\
         - Unlimited daily messages\n\
         - Enhanced AI responses\n\
         - Unlimited image generation\n\
         - Unlimited companion resets\n\
         - Collaborative image creation\n\
         - Priority support access\n\n\
         To upgrade to premium, contact {}",
        ctx.config.bot.contact()
    ))
}

fn tier_line(record: &UserRecord, ctx: &CommandContext<'_>) -> String {
    let short = |until| {
        let full = remaining(ctx.now, until);
        // Trials show days and hours only.
        full.rsplit_once(' ').map(|(dh, _)| dh.to_string()).unwrap_or(full)
    };
    match record.premium_expiry {
        Some(until) if record.is_free_trial => format!("🔄 Free Trial ({} remaining)", short(until)),
        Some(until) if record.is_task_trial => format!(
            "🎯 Task Trial: {} ({} remaining)",
            record.task_trial_task_name.as_deref().unwrap_or("Unknown Task"),
            short(until)
        ),
        Some(until) if record.is_premium => format!(
            "✅ Premium (Expires: {}, {} remaining)",
            until.format("%Y-%m-%d"),
            remaining(ctx.now, until)
        ),
        None if record.is_premium => "✅ Premium (Lifetime)".to_string(),
        _ => "❌ Free User".to_string(),
    }
}

/// Handle /myself.
pub(super) async fn handle_myself(ctx: &CommandContext<'_>) -> Reply {
    let record = match ctx.store.get_user(ctx.sender_id).await {
        Ok(Some(record)) => record,
        Ok(None) => {
            return Reply::text(
                "❌ You don't have any data yet. Try creating an AI companion with /create first.",
            )
        }
        Err(e) => {
            error!("myself: failed to load {}: {e}", ctx.sender_id);
            return Reply::text("❌ An error occurred while retrieving your account information.");
        }
    };

    let limits = &ctx.config.limits;
    let unlimited = record.is_unlimited();
    let cap = |limit: u32| {
        if unlimited {
            "Unlimited".to_string()
        } else {
            limit.to_string()
        }
    };
    let reset_cap = if record.is_premium {
        "Unlimited".to_string()
    } else {
        limits.free_resets.to_string()
    };

    let mut text = format!(
        "*Your Account Status* 👤\n\n\
         👑 Status: {}\n\
         💬 Daily Messages: {}/{}\n\
         🖼️ Daily Images: {}/{}\n\
         🔄 Resets: {}/{}\n",
        tier_line(&record, ctx),
        record.messages_today(ctx.now),
        cap(limits.daily_messages),
        record.images_today(ctx.now),
        cap(limits.daily_images),
        record.reset_count,
        reset_cap,
    );
    if let Some(name) = &record.companion_name {
        text.push_str(&format!("👫 AI Companion: {name}\n"));
    }
    if let Some(created) = record.created_at {
        text.push_str(&format!("📅 User Since: {}\n", format_date(created)));
    }
    text.push_str(&format!(
        "⏰ Limits Reset In: {}",
        UserRecord::time_until_reset(ctx.now)
    ));
    Reply::text(text)
}
