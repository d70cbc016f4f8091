//! Companion lifecycle: /create, /reset, /cancel.

use tracing::error;

use super::{CommandContext, PendingChange, Reply};
use crate::onboarding::{PendingState, CREATE_PROMPT, CREATION_HINT};

pub(super) async fn handle_create(ctx: &CommandContext<'_>) -> Reply {
    match ctx.store.get_user(ctx.sender_id).await {
        Ok(Some(record)) if record.has_companion() => Reply::text(format!(
            "You already have an AI companion named \"{}\". Please use /reset first if you want to create a new companion.",
            record.companion_name()
        )),
        Ok(_) => Reply::text(CREATE_PROMPT).entering(PendingState::AwaitingUserGender),
        Err(e) => {
            error!("create: failed to load {}: {e}", ctx.sender_id);
            Reply::text("There was an error processing your request. Please try again later.")
        }
    }
}

pub(super) async fn handle_reset(ctx: &CommandContext<'_>) -> Reply {
    let record = match ctx.store.get_user(ctx.sender_id).await {
        Ok(Some(record)) if record.has_companion() => record,
        Ok(_) => return Reply::text(CREATION_HINT),
        Err(e) => {
            error!("reset: failed to load {}: {e}", ctx.sender_id);
            return Reply::text("There was an error processing your request. Please try again later.");
        }
    };

    if !record.is_premium && record.reset_count >= ctx.config.limits.free_resets {
        return Reply::text(format!(
            "You've reached your free reset limit! 🔄\n\n\
             To reset your AI companion again, you'll need to upgrade to a premium package. \
             Premium users enjoy unlimited resets and many other benefits!\n\n\
             To upgrade, contact {} or type /premium for more information.",
            ctx.config.bot.contact()
        ));
    }

    Reply::text(format!(
        "Are you sure you want to reset your AI companion \"{}\"? This will delete all your \
         conversation history and character settings. Type \"yes\" to confirm or \"no\" to cancel.",
        record.companion_name()
    ))
    .entering(PendingState::ResetConfirmation)
}

pub(super) fn handle_cancel() -> Reply {
    Reply {
        messages: vec![
            "Okay, cancelled. Type /create whenever you're ready to start again.".to_string(),
        ],
        pending: Some(PendingChange::Clear),
        ..Default::default()
    }
}
