//! Task campaign persistence.

use super::{read_json, write_json, Store};
use crate::duration::GrantDuration;
use crate::task::{AddTaskOutcome, CompletionOutcome, NewTask, TaskCampaign, TaskEvent, TaskFile};
use chrono::{DateTime, Utc};
use companion_core::error::CompanionError;

const TASKS_FILE: &str = "tasks.json";

impl Store {
    pub async fn tasks(&self) -> Result<Vec<TaskCampaign>, CompanionError> {
        let path = self.config_path(TASKS_FILE);
        let _guard = self.lock(&path).await;
        Ok(read_json::<TaskFile>(&path).await?.unwrap_or_default().tasks)
    }

    async fn with_tasks<F, R>(&self, f: F) -> Result<R, CompanionError>
    where
        F: FnOnce(&mut Vec<TaskCampaign>) -> (R, bool),
    {
        let path = self.config_path(TASKS_FILE);
        let _guard = self.lock(&path).await;
        let mut file: TaskFile = read_json(&path).await?.unwrap_or_default();
        let (out, dirty) = f(&mut file.tasks);
        if dirty {
            write_json(&path, &file).await?;
        }
        Ok(out)
    }

    /// Create a campaign unless one with the same name (any case) exists.
    pub async fn add_task(
        &self,
        task: NewTask,
        now: DateTime<Utc>,
    ) -> Result<AddTaskOutcome, CompanionError> {
        self.with_tasks(|tasks| {
            if tasks.iter().any(|t| t.matches(&task.name)) {
                return (AddTaskOutcome::Duplicate, false);
            }
            let created = TaskCampaign::new(task, now);
            tasks.push(created.clone());
            (AddTaskOutcome::Created(created), true)
        })
        .await
    }

    /// Returns false when no task has that name.
    pub async fn delete_task(&self, name: &str) -> Result<bool, CompanionError> {
        self.with_tasks(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| !t.matches(name));
            let removed = tasks.len() != before;
            (removed, removed)
        })
        .await
    }

    /// Redeem a task key and start the user's reward trial.
    ///
    /// The completion is written only after the trial is saved, so a failed
    /// grant leaves the key unused. A missing user record is an error.
    pub async fn redeem_task(
        &self,
        name: &str,
        key: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CompletionOutcome, CompanionError> {
        let path = self.config_path(TASKS_FILE);
        let _guard = self.lock(&path).await;
        let mut file: TaskFile = read_json(&path).await?.unwrap_or_default();
        let Some(task) = file.tasks.iter_mut().find(|t| t.matches(name)) else {
            return Ok(CompletionOutcome::NotFound);
        };

        let was_expired = task.is_expired;
        let outcome = task.redeem(key, user_id, now);
        match &outcome {
            CompletionOutcome::Completed {
                task_name,
                premium_duration,
                ..
            } => {
                let duration =
                    GrantDuration::parse(premium_duration).unwrap_or(GrantDuration::Hours(1));
                let trial_task = task_name.clone();
                let granted = self
                    .update_user(user_id, move |r| {
                        r.start_task_trial(&trial_task, duration, now)
                    })
                    .await?;
                if granted.is_none() {
                    return Err(CompanionError::Store(format!(
                        "no user record for {user_id}, task {task_name} not redeemed"
                    )));
                }
            }
            _ if task.is_expired == was_expired => return Ok(outcome),
            _ => {}
        }

        write_json(&path, &file).await?;
        Ok(outcome)
    }

    /// Mark expired and newly full campaigns, returning owner events.
    pub async fn sweep_tasks(&self, now: DateTime<Utc>) -> Result<Vec<TaskEvent>, CompanionError> {
        self.with_tasks(|tasks| {
            let events: Vec<TaskEvent> = tasks.iter_mut().filter_map(|t| t.sweep(now)).collect();
            let dirty = !events.is_empty();
            (events, dirty)
        })
        .await
    }
}
