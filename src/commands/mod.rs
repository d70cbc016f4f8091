//! Slash commands: instant responses, no provider call.

mod companion;
mod keys;
mod license;
mod premium;
mod reminders;
mod settings;
mod status;
mod tasks;


use chrono::{DateTime, Utc};
use companion_core::config::Config;
use companion_store::{Notice, Store};

use crate::license::LicenseGate;
use crate::onboarding::PendingState;

pub(crate) use reminders::confirmation as reminder_confirmation;

/// Reply for owner-only commands sent by anyone else.
pub const OWNER_ONLY: &str = "❌ Sorry, only the bot owner can use this command.";

/// Grouped context for command execution.
pub struct CommandContext<'a> {
    pub store: &'a Store,
    pub config: &'a Config,
    pub license: &'a LicenseGate,
    pub sender_id: &'a str,
    pub text: &'a str,
    pub now: DateTime<Utc>,
}

impl CommandContext<'_> {
    fn is_owner(&self) -> bool {
        self.config.bot.is_owner(self.sender_id)
    }

    /// Whitespace-separated arguments after the command token.
    fn args(&self) -> Vec<&str> {
        self.text.split_whitespace().skip(1).collect()
    }

    /// Everything after the command token, untouched.
    fn rest(&self) -> &str {
        let trimmed = self.text.trim_start();
        match trimmed.find(char::is_whitespace) {
            Some(i) => trimmed[i..].trim(),
            None => "",
        }
    }
}

/// How a command changes the sender's pending conversation state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PendingChange {
    Enter(PendingState),
    Clear,
}

/// A message fanned out to many users, with a delivery report to the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Broadcast {
    pub text: String,
    pub recipients: Vec<String>,
}

/// Everything a command wants delivered.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reply {
    /// Sent to the sender, in order.
    pub messages: Vec<String>,
    /// Sent to other users.
    pub notices: Vec<Notice>,
    pub pending: Option<PendingChange>,
    pub broadcast: Option<Broadcast>,
}

impl Reply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            messages: vec![text.into()],
            ..Default::default()
        }
    }

    fn also(mut self, text: impl Into<String>) -> Self {
        self.messages.push(text.into());
        self
    }

    fn notify(mut self, notice: Notice) -> Self {
        self.notices.push(notice);
        self
    }

    fn entering(mut self, state: PendingState) -> Self {
        self.pending = Some(PendingChange::Enter(state));
        self
    }
}

/// Known bot commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Help,
    Create,
    Reset,
    Cancel,
    Premium,
    Myself,
    Add,
    Del,
    ListPrem,
    AddKey,
    DelKey,
    ListKeys,
    AddTask,
    DelTask,
    ListTasks,
    Task,
    TaskKey,
    Remind,
    Reminders,
    DelReminder,
    AutoMsg,
    Backup,
    Restore,
    AutoBackup,
    Register,
    CheckBotStatus,
}

impl Command {
    /// Parse a command from message text. Returns `None` for unknown `/` prefixes
    /// (which fall through to the reminder matcher and conversation).
    pub fn parse(text: &str) -> Option<Self> {
        let first = text.split_whitespace().next()?;
        match first {
            "/help" => Some(Self::Help),
            "/create" => Some(Self::Create),
            "/reset" => Some(Self::Reset),
            "/cancel" => Some(Self::Cancel),
            "/premium" => Some(Self::Premium),
            "/myself" => Some(Self::Myself),
            "/add" => Some(Self::Add),
            "/del" => Some(Self::Del),
            "/listprem" => Some(Self::ListPrem),
            "/addkey" => Some(Self::AddKey),
            "/delkey" => Some(Self::DelKey),
            "/listkeys" => Some(Self::ListKeys),
            "/addtask" => Some(Self::AddTask),
            "/deltask" => Some(Self::DelTask),
            "/listtasks" => Some(Self::ListTasks),
            "/task" => Some(Self::Task),
            "/taskkey" => Some(Self::TaskKey),
            "/remind" => Some(Self::Remind),
            "/reminders" => Some(Self::Reminders),
            "/delreminder" => Some(Self::DelReminder),
            "/automsg" => Some(Self::AutoMsg),
            "/backup" => Some(Self::Backup),
            "/restore" => Some(Self::Restore),
            "/autobackup" => Some(Self::AutoBackup),
            "/register" => Some(Self::Register),
            "/check-bot-status" => Some(Self::CheckBotStatus),
            _ => None,
        }
    }
}

/// Handle a command and return what should be sent.
pub async fn handle(cmd: Command, ctx: &CommandContext<'_>) -> Reply {
    match cmd {
        Command::Help => status::handle_help(ctx).await,
        Command::Premium => status::handle_premium(ctx),
        Command::Myself => status::handle_myself(ctx).await,
        Command::Create => companion::handle_create(ctx).await,
        Command::Reset => companion::handle_reset(ctx).await,
        Command::Cancel => companion::handle_cancel(),
        Command::Add => premium::handle_add(ctx).await,
        Command::Del => premium::handle_del(ctx).await,
        Command::ListPrem => premium::handle_listprem(ctx).await,
        Command::AddKey => keys::handle_addkey(ctx).await,
        Command::DelKey => keys::handle_delkey(ctx).await,
        Command::ListKeys => keys::handle_listkeys(ctx).await,
        Command::AddTask => tasks::handle_addtask(ctx).await,
        Command::DelTask => tasks::handle_deltask(ctx).await,
        Command::ListTasks => tasks::handle_listtasks(ctx).await,
        Command::Task => tasks::handle_task(ctx).await,
        Command::TaskKey => tasks::handle_taskkey(ctx).await,
        Command::Remind => reminders::handle_remind(ctx).await,
        Command::Reminders => reminders::handle_reminders(ctx).await,
        Command::DelReminder => reminders::handle_delreminder(ctx).await,
        Command::AutoMsg => settings::handle_automsg(ctx).await,
        Command::Backup => settings::handle_backup(ctx).await,
        Command::Restore => settings::handle_restore(ctx).await,
        Command::AutoBackup => settings::handle_autobackup(ctx).await,
        Command::Register => license::handle_register(ctx).await,
        Command::CheckBotStatus => license::handle_check_status(ctx).await,
    }
}

/// Strip WhatsApp JID suffixes and a leading `+` from a phone argument.
pub(crate) fn normalize_phone(raw: &str) -> String {
    let bare = raw.split('@').next().unwrap_or(raw).trim();
    bare.trim_start_matches('+').to_string()
}

/// `Xd Yh Zm` until `until`, clamped at zero.
pub(crate) fn remaining(now: DateTime<Utc>, until: DateTime<Utc>) -> String {
    let left = (until - now).max(chrono::Duration::zero());
    format!(
        "{}d {}h {}m",
        left.num_days(),
        left.num_hours() % 24,
        left.num_minutes() % 60
    )
}

/// Date format used in command replies.
pub(crate) fn format_date(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}
