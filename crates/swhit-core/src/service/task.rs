//! Task credit: single-party, exactly-once reward per (user, task).

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{AirdropService, signed};
use crate::{
  Error, Result,
  ledger::{RewardKind, RewardRecord},
  retry::{AttemptError, with_retry},
  store::{AirdropStore, CommitOutcome, Mutation, Precondition, WriteBatch},
  task::{Task, TaskStatus},
  user::{UserId, UserRecord},
};

#[derive(Debug, Clone, Serialize)]
pub struct TaskReceipt {
  pub user:   UserRecord,
  pub task:   Task,
  pub reward: RewardRecord,
}

impl<S: AirdropStore> AirdropService<S> {
  /// Credit `task_id` to `user_id`. Repeating a successful call fails with
  /// [`Error::AlreadyCompleted`] and changes nothing. Like
  /// [`Self::apply_referral`], a retry that finds this call's reward already
  /// in the ledger succeeds with it.
  pub async fn complete_task(
    &self,
    user_id: &UserId,
    task_id: &str,
  ) -> Result<TaskReceipt> {
    let claim = Uuid::new_v4();
    let (user, task, reward) = with_retry(&self.retry, "complete_task", move |attempt| {
      self.task_attempt(user_id, task_id, claim, attempt)
    })
    .await?;

    tracing::info!(user = %user_id, task = task_id, points = task.reward, "task credited");

    Ok(TaskReceipt { user: self.refreshed(user).await, task, reward })
  }

  async fn task_attempt(
    &self,
    user_id: &UserId,
    task_id: &str,
    claim: Uuid,
    attempt: u32,
  ) -> Result<(UserRecord, Task, RewardRecord), AttemptError> {
    let task = self
      .store
      .get_task(task_id)
      .await
      .map_err(AttemptError::transient)?
      .filter(|t| t.active)
      .ok_or_else(|| AttemptError::Permanent(Error::UnknownTask(task_id.to_owned())))?;

    let mut user = self
      .store
      .get_user(user_id)
      .await
      .map_err(AttemptError::transient)?
      .ok_or_else(|| AttemptError::Permanent(Error::UnknownUser(user_id.clone())))?;

    if user.has_completed(task_id) {
      if attempt > 1 {
        let rewards = self.store.rewards_for(user_id).await.map_err(AttemptError::transient)?;
        if let Some(reward) = rewards.into_iter().find(|r| r.reward_id == claim) {
          tracing::debug!(user = %user_id, task = task_id, attempt, "earlier task attempt landed");
          return Ok((user, task, reward));
        }
      }
      return Err(AttemptError::Permanent(Error::AlreadyCompleted {
        user_id: user_id.clone(),
        task_id: task_id.to_owned(),
      }));
    }

    let reward = RewardRecord::new(
      user_id.clone(),
      signed(task.reward),
      RewardKind::Task,
      format!("Completed: {}", task.name),
      Utc::now(),
    )
    .with_task(task_id)
    .with_id(claim);

    let batch = WriteBatch::new()
      .require(Precondition::UserExists(user_id.clone()))
      .require(Precondition::TaskNotCompleted {
        user_id: user_id.clone(),
        task_id: task_id.to_owned(),
      })
      .push(Mutation::Reward(reward.clone()))
      .push(Mutation::CompleteTask {
        user_id: user_id.clone(),
        task_id: task_id.to_owned(),
      });

    match self.store.commit(batch).await.map_err(AttemptError::transient)? {
      CommitOutcome::Applied => {}
      CommitOutcome::Rejected(conflict) => {
        return Err(AttemptError::transient(format!(
          "write rejected: {conflict:?}"
        )));
      }
    }

    user.points += task.reward;
    user.completed_tasks.insert(task_id.to_owned());
    Ok((user, task, reward))
  }

  /// Active tasks, flagged with whether `user_id` has completed each.
  pub async fn task_board(&self, user_id: &UserId) -> Result<Vec<TaskStatus>> {
    let user = self
      .store
      .get_user(user_id)
      .await
      .map_err(Error::unavailable)?
      .ok_or_else(|| Error::UnknownUser(user_id.clone()))?;
    let tasks = self.store.list_tasks(true).await.map_err(Error::unavailable)?;

    Ok(
      tasks
        .into_iter()
        .map(|task| {
          let completed = user.has_completed(&task.task_id);
          TaskStatus { task, completed }
        })
        .collect(),
    )
  }

  /// Insert or replace catalog entries, e.g. from configuration at start-up.
  pub async fn seed_tasks(&self, tasks: impl IntoIterator<Item = Task>) -> Result<usize> {
    let mut count = 0;
    for task in tasks {
      self.store.put_task(task).await.map_err(Error::unavailable)?;
      count += 1;
    }
    Ok(count)
  }
}
