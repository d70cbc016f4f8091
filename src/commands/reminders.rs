//! Reminder commands: /remind, /reminders, /delreminder.

use chrono::Local;
use tracing::{error, info};

use super::{CommandContext, Reply};
use crate::timeparse::{self, ReminderRequest};

const REMIND_USAGE: &str = "⚠️ I couldn't understand that reminder format. Please use one of these formats:

1. /remind tomorrow at 3pm to call mom
2. /remind in 2 hours to take medicine
3. /remind 5/20 at 9am to attend meeting

For recurring reminders, add \"daily\", \"weekly\", or \"monthly\" at the end:
/remind tomorrow at 8am to take vitamins daily";

/// Confirmation shared by `/remind` and natural-language reminders.
pub(crate) fn confirmation(headline: &str, req: &ReminderRequest) -> String {
    let mut text = format!(
        "✅ {headline}\n\nI'll remind you to *{}*\n📅 {}",
        req.text,
        timeparse::display(req.time)
    );
    if let Some(r) = req.recurring {
        text.push_str(&format!("\n🔄 Recurring: {r}"));
    }
    text
}

/// Handle `/remind <time> to <text>`.
pub(super) async fn handle_remind(ctx: &CommandContext<'_>) -> Reply {
    let now = ctx.now.with_timezone(&Local);
    let Some(req) = timeparse::parse_remind_args(ctx.rest(), &now) else {
        return Reply::text(REMIND_USAGE);
    };

    match ctx
        .store
        .create_reminder(ctx.sender_id, &req.text, req.time, req.recurring)
        .await
    {
        Ok(reminder) => {
            info!("reminders: {} set {} for {}", ctx.sender_id, reminder.id, reminder.time);
            Reply::text(confirmation("Reminder set successfully!", &req))
        }
        Err(e) => {
            error!("reminders: failed to create for {}: {e}", ctx.sender_id);
            Reply::text("❌ Sorry, I couldn't set that reminder. Please try again.")
        }
    }
}

/// Handle /reminders.
pub(super) async fn handle_reminders(ctx: &CommandContext<'_>) -> Reply {
    let reminders = match ctx.store.reminders_for(ctx.sender_id).await {
        Ok(r) => r,
        Err(e) => {
            error!("reminders: failed to list for {}: {e}", ctx.sender_id);
            return Reply::text("❌ Sorry, I couldn't load your reminders. Please try again.");
        }
    };
    if reminders.is_empty() {
        return Reply::text("You don't have any active reminders. Use /remind to set one!");
    }

    let mut text = String::from("*Your Reminders* ⏰\n\n");
    for (i, r) in reminders.iter().enumerate() {
        text.push_str(&format!(
            "{}. ID: {}\n   📝 {}\n   📅 {}\n",
            i + 1,
            r.id,
            r.text,
            timeparse::display(r.time)
        ));
        if let Some(rec) = r.recurring {
            text.push_str(&format!("   🔄 Recurring: {rec}\n"));
        }
        text.push('\n');
    }
    text.push_str("To delete a reminder, use /delreminder [ID]");
    Reply::text(text)
}

/// Handle `/delreminder <id>`.
pub(super) async fn handle_delreminder(ctx: &CommandContext<'_>) -> Reply {
    let Some(id) = ctx.args().first().copied() else {
        return Reply::text(
            "Please specify the reminder ID to delete. You can see all your reminders with /reminders",
        );
    };
    match ctx.store.delete_reminder(ctx.sender_id, id).await {
        Ok(true) => Reply::text("✅ Reminder deleted successfully!"),
        Ok(false) => {
            Reply::text("❌ Couldn't delete that reminder. Please check the ID and try again.")
        }
        Err(e) => {
            error!("reminders: failed to delete {id}: {e}");
            Reply::text("❌ Couldn't delete that reminder. Please check the ID and try again.")
        }
    }
}
