//! In-memory [`AirdropStore`] used by the workflow tests.
//!
//! Commits run against a copy of the state that replaces the live state only if
//! every precondition and mutation succeeds. Faults can be injected to
//! exercise the retry path.

use std::{
  collections::BTreeMap,
  sync::{
    Mutex,
    atomic::{AtomicU32, Ordering},
  },
};

use chrono::{DateTime, Utc};

use crate::{
  ledger::{ReferralRecord, RewardRecord},
  store::{AirdropStore, CommitOutcome, Conflict, InsertOutcome, Mutation, Precondition, WriteBatch},
  task::Task,
  user::{Identity, UserId, UserRecord},
};

#[derive(Debug, thiserror::Error)]
#[error("injected store failure")]
pub struct InjectedFailure;

#[derive(Debug, Clone, Default)]
pub struct State {
  pub users:     BTreeMap<UserId, UserRecord>,
  pub referrals: Vec<ReferralRecord>,
  pub rewards:   Vec<RewardRecord>,
  pub tasks:     BTreeMap<String, Task>,
}

type Meddler = Box<dyn FnOnce(&mut State) + Send>;

#[derive(Default)]
pub struct MemoryStore {
  state:           Mutex<State>,
  failing_commits: AtomicU32,
  lost_replies:    AtomicU32,
  commits_seen:    AtomicU32,
  /// Runs against the live state just before the next commit.
  meddler:         Mutex<Option<Meddler>>,
}

impl MemoryStore {
  pub fn snapshot(&self) -> State { self.state.lock().unwrap().clone() }

  /// Fail the next `n` commits with a store error.
  pub fn fail_next_commits(&self, n: u32) {
    self.failing_commits.store(n, Ordering::SeqCst);
  }

  /// Apply the next `n` successful commits but report them as failed, like a
  /// write that lands after the caller has given up on it.
  pub fn lose_next_commit_replies(&self, n: u32) {
    self.lost_replies.store(n, Ordering::SeqCst);
  }

  pub fn commits_seen(&self) -> u32 { self.commits_seen.load(Ordering::SeqCst) }

  /// Mutate the state behind the workflow's back, between its reads and its
  /// write.
  pub fn meddle_before_next_commit(&self, f: impl FnOnce(&mut State) + Send + 'static) {
    *self.meddler.lock().unwrap() = Some(Box::new(f));
  }

  pub fn insert_raw(&self, user: UserRecord) {
    self.state.lock().unwrap().users.insert(user.id.clone(), user);
  }
}

fn check(state: &State, precondition: &Precondition) -> bool {
  match precondition {
    Precondition::UserExists(id) => state.users.contains_key(id),
    Precondition::NotReferred(id) => state
      .users
      .get(id)
      .is_some_and(|u| u.referred_by.is_none()),
    Precondition::TaskNotCompleted { user_id, task_id } => state
      .users
      .get(user_id)
      .is_some_and(|u| !u.has_completed(task_id)),
  }
}

fn apply(state: &mut State, mutation: Mutation) -> Result<(), Conflict> {
  match mutation {
    Mutation::Reward(reward) => {
      let user = state
        .users
        .get_mut(&reward.user_id)
        .ok_or_else(|| Conflict::MissingUser(reward.user_id.clone()))?;
      let balance = user.points as i64 + reward.amount;
      if balance < 0 {
        return Err(Conflict::NegativeBalance(reward.user_id.clone()));
      }
      user.points = balance as u64;
      state.rewards.push(reward);
    }
    Mutation::SetReferredBy { user_id, referrer_id } => {
      let user = state
        .users
        .get_mut(&user_id)
        .ok_or_else(|| Conflict::MissingUser(user_id.clone()))?;
      if user.referred_by.is_some() {
        return Err(Conflict::AlreadyReferred(user_id));
      }
      user.referred_by = Some(referrer_id);
    }
    Mutation::CompleteTask { user_id, task_id } => {
      let user = state
        .users
        .get_mut(&user_id)
        .ok_or_else(|| Conflict::MissingUser(user_id.clone()))?;
      user.completed_tasks.insert(task_id);
    }
    Mutation::Referral(record) => {
      if state.referrals.iter().any(|r| r.referred_id == record.referred_id) {
        return Err(Conflict::AlreadyReferred(record.referred_id));
      }
      state.referrals.push(record);
    }
  }
  Ok(())
}

impl AirdropStore for MemoryStore {
  type Error = InjectedFailure;

  async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>, InjectedFailure> {
    Ok(self.state.lock().unwrap().users.get(id).cloned())
  }

  async fn find_by_referral_code(
    &self,
    code: &str,
  ) -> Result<Option<UserRecord>, InjectedFailure> {
    let state = self.state.lock().unwrap();
    Ok(state.users.values().find(|u| u.referral_code == code).cloned())
  }

  async fn insert_user(&self, user: UserRecord) -> Result<InsertOutcome, InjectedFailure> {
    let mut state = self.state.lock().unwrap();
    if state.users.contains_key(&user.id) {
      return Ok(InsertOutcome::IdTaken);
    }
    if state.users.values().any(|u| u.referral_code == user.referral_code) {
      return Ok(InsertOutcome::CodeTaken);
    }
    state.users.insert(user.id.clone(), user);
    Ok(InsertOutcome::Inserted)
  }

  async fn touch_session(
    &self,
    identity: &Identity,
    at: DateTime<Utc>,
  ) -> Result<Option<UserRecord>, InjectedFailure> {
    let mut state = self.state.lock().unwrap();
    Ok(state.users.get_mut(&identity.id).map(|u| {
      u.last_login = at;
      if let Some(name) = &identity.display_name {
        u.display_name = Some(name.clone());
      }
      if let Some(lang) = &identity.language_code {
        u.language_code = Some(lang.clone());
      }
      u.clone()
    }))
  }

  async fn commit(&self, batch: WriteBatch) -> Result<CommitOutcome, InjectedFailure> {
    self.commits_seen.fetch_add(1, Ordering::SeqCst);
    let failing = self.failing_commits.load(Ordering::SeqCst);
    if failing > 0 {
      self.failing_commits.store(failing - 1, Ordering::SeqCst);
      return Err(InjectedFailure);
    }

    let meddler = self.meddler.lock().unwrap().take();
    let mut live = self.state.lock().unwrap();
    if let Some(f) = meddler {
      f(&mut live);
    }

    if let Some(failed) = batch.preconditions.iter().find(|p| !check(&live, p)) {
      return Ok(CommitOutcome::Rejected(Conflict::Precondition(failed.clone())));
    }
    let mut next = live.clone();
    for mutation in batch.mutations {
      if let Err(conflict) = apply(&mut next, mutation) {
        return Ok(CommitOutcome::Rejected(conflict));
      }
    }
    *live = next;

    let lost = self.lost_replies.load(Ordering::SeqCst);
    if lost > 0 {
      self.lost_replies.store(lost - 1, Ordering::SeqCst);
      return Err(InjectedFailure);
    }
    Ok(CommitOutcome::Applied)
  }

  async fn top_users(&self, limit: usize) -> Result<Vec<UserRecord>, InjectedFailure> {
    let mut users: Vec<UserRecord> =
      self.state.lock().unwrap().users.values().cloned().collect();
    users.sort_by(|a, b| {
      b.points
        .cmp(&a.points)
        .then(a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
    });
    users.truncate(limit);
    Ok(users)
  }

  async fn count_users(&self) -> Result<u64, InjectedFailure> {
    Ok(self.state.lock().unwrap().users.len() as u64)
  }

  async fn rewards_for(&self, user_id: &UserId) -> Result<Vec<RewardRecord>, InjectedFailure> {
    let state = self.state.lock().unwrap();
    Ok(
      state
        .rewards
        .iter()
        .rev()
        .filter(|r| &r.user_id == user_id)
        .cloned()
        .collect(),
    )
  }

  async fn referrals_by(
    &self,
    referrer_id: &UserId,
  ) -> Result<Vec<ReferralRecord>, InjectedFailure> {
    let state = self.state.lock().unwrap();
    Ok(
      state
        .referrals
        .iter()
        .filter(|r| &r.referrer_id == referrer_id)
        .cloned()
        .collect(),
    )
  }

  async fn put_task(&self, task: Task) -> Result<(), InjectedFailure> {
    self.state.lock().unwrap().tasks.insert(task.task_id.clone(), task);
    Ok(())
  }

  async fn get_task(&self, task_id: &str) -> Result<Option<Task>, InjectedFailure> {
    Ok(self.state.lock().unwrap().tasks.get(task_id).cloned())
  }

  async fn list_tasks(&self, active_only: bool) -> Result<Vec<Task>, InjectedFailure> {
    let state = self.state.lock().unwrap();
    Ok(
      state
        .tasks
        .values()
        .filter(|t| !active_only || t.active)
        .cloned()
        .collect(),
    )
  }
}
