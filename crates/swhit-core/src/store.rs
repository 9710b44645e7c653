//! The `AirdropStore` trait and the atomic write batch.
//!
//! The trait is implemented by storage backends (e.g. `swhit-store-sqlite`).
//! The workflows in [`crate::service`] depend on this abstraction only.
//!
//! Every change to points, referral links and task completion goes through
//! [`AirdropStore::commit`]: one [`WriteBatch`] whose preconditions are
//! re-checked and whose mutations are applied inside a single transaction.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::{
  ledger::{ReferralRecord, RewardRecord},
  task::Task,
  user::{Identity, UserId, UserRecord},
};

// ─── Write batch ─────────────────────────────────────────────────────────────

/// A condition checked inside the write transaction, before any mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Precondition {
  UserExists(UserId),
  /// The user's `referred_by` is still unset.
  NotReferred(UserId),
  TaskNotCompleted { user_id: UserId, task_id: String },
}

/// One record mutation inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
  /// Append a ledger entry and apply its `amount` to the user's points.
  Reward(RewardRecord),
  /// Set `referred_by`; only legal while it is unset.
  SetReferredBy { user_id: UserId, referrer_id: UserId },
  CompleteTask { user_id: UserId, task_id: String },
  /// Append a referral edge; `referred_id` must not appear in any other.
  Referral(ReferralRecord),
}

/// An all-or-nothing multi-record write.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteBatch {
  pub preconditions: Vec<Precondition>,
  pub mutations:     Vec<Mutation>,
}

impl WriteBatch {
  pub fn new() -> Self { Self::default() }

  pub fn require(mut self, precondition: Precondition) -> Self {
    self.preconditions.push(precondition);
    self
  }

  pub fn push(mut self, mutation: Mutation) -> Self {
    self.mutations.push(mutation);
    self
  }
}

/// Why a batch was refused. Nothing from the batch was applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conflict {
  Precondition(Precondition),
  /// A mutation targeted a user that does not exist.
  MissingUser(UserId),
  /// A reward would drive the balance below zero.
  NegativeBalance(UserId),
  /// The user already has `referred_by` set or appears in a referral edge.
  AlreadyReferred(UserId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
  Applied,
  Rejected(Conflict),
}

/// Result of [`AirdropStore::insert_user`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
  Inserted,
  /// A record with this id exists already; nothing was written.
  IdTaken,
  /// Another user holds this referral code; nothing was written.
  CodeTaken,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over an airdrop store backend.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tasks and `axum` handlers.
pub trait AirdropStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Users ─────────────────────────────────────────────────────────────

  fn get_user<'a>(
    &'a self,
    id: &'a UserId,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  /// Point lookup on the unique `referral_code` field.
  fn find_by_referral_code<'a>(
    &'a self,
    code: &'a str,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  /// Insert a new record unless its id or referral code is already taken.
  fn insert_user(
    &self,
    user: UserRecord,
  ) -> impl Future<Output = Result<InsertOutcome, Self::Error>> + Send + '_;

  /// Refresh the volatile profile fields and `last_login`.
  ///
  /// `display_name` and `language_code` are only overwritten when the identity
  /// supplies them. Returns `None` if the user does not exist.
  fn touch_session<'a>(
    &'a self,
    identity: &'a Identity,
    at: DateTime<Utc>,
  ) -> impl Future<Output = Result<Option<UserRecord>, Self::Error>> + Send + 'a;

  // ── Atomic write ──────────────────────────────────────────────────────

  /// Check every precondition and apply every mutation in one transaction.
  fn commit(
    &self,
    batch: WriteBatch,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  /// Users by points descending, then `created_at` ascending, then id.
  fn top_users(
    &self,
    limit: usize,
  ) -> impl Future<Output = Result<Vec<UserRecord>, Self::Error>> + Send + '_;

  fn count_users(
    &self,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Ledger entries for a user, newest first.
  fn rewards_for<'a>(
    &'a self,
    user_id: &'a UserId,
  ) -> impl Future<Output = Result<Vec<RewardRecord>, Self::Error>> + Send + 'a;

  /// Referral edges where `referrer_id` is the given user, oldest first.
  fn referrals_by<'a>(
    &'a self,
    referrer_id: &'a UserId,
  ) -> impl Future<Output = Result<Vec<ReferralRecord>, Self::Error>> + Send + 'a;

  // ── Task catalog ──────────────────────────────────────────────────────

  /// Insert or replace a catalog entry.
  fn put_task(
    &self,
    task: Task,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_task<'a>(
    &'a self,
    task_id: &'a str,
  ) -> impl Future<Output = Result<Option<Task>, Self::Error>> + Send + 'a;

  fn list_tasks(
    &self,
    active_only: bool,
  ) -> impl Future<Output = Result<Vec<Task>, Self::Error>> + Send + '_;
}
