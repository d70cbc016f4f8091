//! Task campaigns: /addtask, /deltask, /listtasks (owner), /task, /taskkey.

use chrono::{DateTime, Utc};
use companion_store::task::{
    AddTaskOutcome, CompletionOutcome, MaxCompletions, NewTask, TaskCampaign,
};
use companion_store::{GrantDuration, Notice};
use tracing::{error, info};

use super::{Broadcast, CommandContext, Reply, OWNER_ONLY};
use crate::onboarding::CREATION_HINT;

const ADDTASK_USAGE: &str = "Invalid format. Please use:\n\
*/addtask [task name] [description] [max completions] [key] [key link] [premium duration] [expire duration]*\n\n\
Example: */addtask \"Birthday Task\" \"Happy Birthday Giveaway\" 5 abc123 www.example.com/key 1h 24h*\n\n\
Use 'skip' for description if not needed. Use 'unlimited' for max completions if no limit.";

const TASKKEY_USAGE: &str = "✨ Oops! Let me help you with the correct format:\n\n\
*How to Complete a Task:*\n`/taskkey [task name] [key]`\n\n\
*For Example:*\n`/taskkey Hyper abc123`\n\n\
Just copy the format above and replace with your task details! 🌟";

const NO_TASKS: &str = "✨ No exciting tasks available at the moment! Check back soon for new opportunities to earn amazing rewards! 🎁";

/// Split arguments on spaces, keeping `'...'` and `"..."` groups together.
/// A quote preceded by a backslash is literal.
fn split_quoted(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut prev: Option<char> = None;

    for c in text.chars() {
        match c {
            '\'' | '"' if prev != Some('\\') => match quote {
                None => quote = Some(c),
                Some(q) if q == c => quote = None,
                Some(_) => current.push(c),
            },
            c if c.is_whitespace() && quote.is_none() => {
                if !current.is_empty() {
                    parts.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
        prev = Some(c);
    }
    if !current.is_empty() {
        parts.push(current);
    }
    parts
}

fn parse_new_task(args: &[String]) -> Result<NewTask, String> {
    let [name, description, max, key, key_link, premium, expire, ..] = args else {
        return Err(ADDTASK_USAGE.to_string());
    };
    let max_completions = MaxCompletions::parse(max).ok_or_else(|| {
        "Invalid max completions. Please use a positive number or 'unlimited'.".to_string()
    })?;
    let premium_duration = GrantDuration::parse_grant(premium).map_err(|_| {
        "Invalid premium duration format. Please use:\n- 1h to 24h for hours\n- 1d to 30d for days\n- lifetime for permanent"
            .to_string()
    })?;
    let expire_duration = match GrantDuration::parse_grant(expire) {
        Ok(GrantDuration::Lifetime) | Err(_) => {
            return Err(
                "Invalid expire duration format. Please use:\n- 1h to 24h for hours\n- 1d to 30d for days"
                    .to_string(),
            )
        }
        Ok(d) => d,
    };
    Ok(NewTask {
        name: name.clone(),
        description: description.clone(),
        max_completions,
        key: key.clone(),
        key_link: key_link.clone(),
        premium_duration,
        expire_duration,
    })
}

fn announcement(task: &TaskCampaign) -> String {
    let description = if task.has_description() {
        format!("📝 {}\n", task.description)
    } else {
        String::new()
    };
    format!(
        "🎉 *NEW TASK AVAILABLE!* 🎉\n\n\
         *{}* has been added to the task list!\n\
         {description}\
         🎁 Reward: {} Premium Trial\n\
         ⏳ Available for: {}\n\n\
         Type */task* to see all available tasks and complete them to earn premium trials!",
        task.name, task.premium_duration, task.expire_duration
    )
}

/// Handle `/addtask`.
pub(super) async fn handle_addtask(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let args = split_quoted(ctx.rest());
    let new_task = match parse_new_task(&args) {
        Ok(t) => t,
        Err(msg) => return Reply::text(msg),
    };
    let name = new_task.name.clone();

    let task = match ctx.store.add_task(new_task, ctx.now).await {
        Ok(AddTaskOutcome::Created(task)) => task,
        Ok(AddTaskOutcome::Duplicate) => {
            return Reply::text(format!(
                "✨ Oops! It looks like a task named \"{name}\" already exists in our collection. \
                 Would you mind choosing a different, unique name for your task? 🌟"
            ))
        }
        Err(e) => {
            error!("tasks: failed to add {name}: {e}");
            return Reply::text("There was an error creating the task. Please try again later.");
        }
    };
    info!("tasks: created {}", task.name);

    let recipients = match ctx.store.all_users().await {
        Ok(users) => users
            .into_iter()
            .filter(|(_, r)| r.has_companion())
            .map(|(id, _)| id)
            .collect(),
        Err(e) => {
            error!("tasks: failed to list users for announcement: {e}");
            Vec::new()
        }
    };

    let mut reply = Reply::text(format!(
        "✅ Task \"{}\" has been created successfully!\n\n\
         It will expire on {} and offers a {} premium trial.",
        task.name,
        super::format_date(task.expire_at),
        task.premium_duration
    ));
    reply.broadcast = Some(Broadcast {
        text: announcement(&task),
        recipients,
    });
    reply
}

/// Handle `/deltask <name>`.
pub(super) async fn handle_deltask(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let name = ctx.rest();
    if name.is_empty() {
        return Reply::text("Invalid format. Please use: */deltask [task name]*");
    }
    match ctx.store.delete_task(name).await {
        Ok(true) => {
            info!("tasks: deleted {name}");
            Reply::text(format!(
                "✨ Poof! The task \"{name}\" has vanished from our magical collection! 🌟"
            ))
        }
        Ok(false) => Reply::text(format!(
            "✨ Oops! I couldn't find a task called \"{name}\" in our magical collection. \
             Double-check the name and try again! 🔍"
        )),
        Err(e) => {
            error!("tasks: failed to delete {name}: {e}");
            Reply::text("There was an error deleting the task. Please try again later.")
        }
    }
}

/// One task block as shown by /task and /listtasks.
pub(crate) fn format_task_details(task: &TaskCampaign, show_key: bool, now: DateTime<Utc>) -> String {
    let expired = task.is_expired_at(now);
    let status = if expired {
        "⏱️ Expired"
    } else if task.is_full() {
        "🔒 Completed (Full)"
    } else {
        "✅ Available"
    };
    let time_left = if expired {
        "Expired".to_string()
    } else {
        let left = task.expire_at - now;
        format!("{}h {}m", left.num_hours(), left.num_minutes() % 60)
    };
    let completions = match task.max_completions {
        MaxCompletions::Unlimited => task.completed_by.len().to_string(),
        MaxCompletions::Limited(n) => format!("{}/{n}", task.completed_by.len()),
    };

    let mut text = format!("*Task: {}*\n", task.name);
    if task.has_description() {
        text.push_str(&format!("📝 {}\n", task.description));
    }
    text.push_str(&format!("👥 Completions: {completions}\n"));
    if show_key {
        text.push_str(&format!("🔑 Key: {}\n", task.key));
    }
    text.push_str(&format!(
        "🔗 Find the key: {}\n🎁 Reward: {} Premium Trial\n⏳ Expires: {time_left}\n📊 Status: {status}\n\n",
        task.key_link, task.premium_duration
    ));
    text
}

/// Handle /listtasks.
pub(super) async fn handle_listtasks(ctx: &CommandContext<'_>) -> Reply {
    if !ctx.is_owner() {
        return Reply::text(OWNER_ONLY);
    }
    let tasks = match ctx.store.tasks().await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("tasks: failed to load: {e}");
            return Reply::text("There was an error fetching the tasks. Please try again later.");
        }
    };
    if tasks.is_empty() {
        return Reply::text(NO_TASKS);
    }
    let mut text = String::from("📋 *All Tasks* 📋\n\n");
    for task in &tasks {
        text.push_str(&format_task_details(task, true, ctx.now));
    }
    Reply::text(text.trim_end().to_string())
}

/// Handle /task.
pub(super) async fn handle_task(ctx: &CommandContext<'_>) -> Reply {
    let tasks = match ctx.store.tasks().await {
        Ok(tasks) => tasks,
        Err(e) => {
            error!("tasks: failed to load: {e}");
            return Reply::text("There was an error fetching the tasks. Please try again later.");
        }
    };
    if tasks.is_empty() {
        return Reply::text(NO_TASKS);
    }

    let (closed, open): (Vec<_>, Vec<_>) = tasks
        .iter()
        .partition(|t| t.is_expired_at(ctx.now) || t.is_full());

    let mut text = String::from("🎯 *Available Tasks* 🎯\n\n");
    if open.is_empty() {
        text.push_str("✨ No exciting tasks are available right now! Come back soon for new opportunities to earn rewards! 🎁\n\n");
    }
    for task in &open {
        text.push_str(&format_task_details(task, false, ctx.now));
    }
    if !closed.is_empty() {
        text.push_str("\n📁 *Expired or Completed Tasks* 📁\n\n");
        for task in &closed {
            text.push_str(&format_task_details(task, false, ctx.now));
        }
    }
    text.push_str(
        "\n✨ *How to Complete Tasks* ✨\n\
         Use the command: `/taskkey [task name] [key]`\n\n\
         📝 *Example:*\n`/taskkey Hyper abc123`\n\n\
         Complete tasks to earn exciting premium rewards! 🎁",
    );
    Reply::text(text)
}

/// Refusal for users who already hold premium, if any.
fn premium_refusal(record: &companion_store::UserRecord, now: DateTime<Utc>) -> Option<String> {
    if !record.is_premium {
        return None;
    }
    match record.premium_expiry {
        Some(until) if until > now => {
            let left = until - now;
            let (days, hours) = (left.num_days(), left.num_hours() % 24);
            let expiry = if days > 0 {
                format!("✨ Your premium access will continue for {days} magical days and {hours} wonderful hours! 🌟")
            } else {
                format!("✨ Your magical premium journey continues for {hours} more enchanting hours! 🌟")
            };
            Some(format!(
                "⚠️ You already have an active premium subscription! {expiry} \
                 Please wait until your current premium expires before completing another task."
            ))
        }
        Some(_) => None,
        None => Some(
            "✨ Congratulations! You're already enjoying our exclusive lifetime premium membership! 🌟 \
             There's no need to complete tasks since you already have unlimited access to all our \
             premium features. Keep enjoying your VIP experience! 💎"
                .to_string(),
        ),
    }
}

/// Handle `/taskkey <task name> <key>`. The last token is the key.
pub(super) async fn handle_taskkey(ctx: &CommandContext<'_>) -> Reply {
    let args = ctx.args();
    let Some((key, name_parts)) = args.split_last().filter(|(_, n)| !n.is_empty()) else {
        return Reply::text(TASKKEY_USAGE);
    };
    let name = name_parts.join(" ");

    let record = match ctx.store.get_user(ctx.sender_id).await {
        Ok(Some(record)) => record,
        Ok(None) => return Reply::text(CREATION_HINT),
        Err(e) => {
            error!("tasks: failed to load {}: {e}", ctx.sender_id);
            return Reply::text(
                "There was an error processing your task completion. Please try again later.",
            );
        }
    };
    if let Some(refusal) = premium_refusal(&record, ctx.now) {
        return Reply::text(refusal);
    }

    let outcome = match ctx.store.redeem_task(&name, key, ctx.sender_id, ctx.now).await {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("tasks: failed to redeem {name} for {}: {e}", ctx.sender_id);
            return Reply::text(
                "There was an error processing your task completion. Please try again later.",
            );
        }
    };

    let (task_name, reward, now_full, max) = match outcome {
        CompletionOutcome::NotFound => {
            return Reply::text(format!(
                "✨ Oops! I couldn't find a task named \"{name}\" in our magical collection. \
                 Try using /task to see all the available enchanting tasks! 🔍"
            ))
        }
        CompletionOutcome::Expired => {
            return Reply::text(
                "✨ Oh no! It seems this magical task has faded away into the mists of time. \
                 Don't worry though - new adventures await! Check /task for more exciting opportunities! 🌟",
            )
        }
        CompletionOutcome::Full => {
            return Reply::text("This task has reached its maximum number of completions.")
        }
        CompletionOutcome::AlreadyCompleted => {
            return Reply::text("You have already completed this task.")
        }
        CompletionOutcome::IncorrectKey => {
            return Reply::text(format!(
                "Incorrect key for task \"{name}\". Please try again."
            ))
        }
        CompletionOutcome::Completed {
            task_name,
            premium_duration,
            now_full,
            max_completions,
        } => (task_name, premium_duration, now_full, max_completions),
    };

    info!("tasks: {} completed {task_name}", ctx.sender_id);

    let mut reply = Reply::text(format!(
        "Congratulations! You've successfully completed the task \"{task_name}\" and received a {reward} premium trial!"
    ));
    if now_full && !ctx.config.bot.owner.is_empty() {
        let goal = match max {
            MaxCompletions::Limited(n) => n.to_string(),
            MaxCompletions::Unlimited => "unlimited".to_string(),
        };
        reply = reply.notify(Notice::new(
            ctx.config.bot.owner.clone(),
            format!(
                "✨ Amazing news! The \"{task_name}\" task has reached its goal of {goal} completions! 🎉 \
                 Thank you to everyone who participated in making this task a wonderful success! 🌟"
            ),
        ));
    }
    reply
}
