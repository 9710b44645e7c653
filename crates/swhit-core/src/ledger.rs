//! Append-only audit records: referral edges and reward ledger entries.
//!
//! Neither record type is ever updated or deleted. A reward entry is the only
//! way a balance changes; the store applies `amount` to the user in the same
//! transaction that appends the entry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::user::UserId;

/// Why a balance changed.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::AsRefStr,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RewardKind {
  /// Paid to the owner of a redeemed referral code.
  Referral,
  /// Paid to the user who redeemed a referral code.
  Welcome,
  Task,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardRecord {
  pub reward_id:   Uuid,
  pub user_id:     UserId,
  pub amount:      i64,
  pub kind:        RewardKind,
  pub description: String,
  /// Present for [`RewardKind::Task`] entries.
  pub task_id:     Option<String>,
  pub date:        DateTime<Utc>,
}

impl RewardRecord {
  pub fn new(
    user_id: UserId,
    amount: i64,
    kind: RewardKind,
    description: impl Into<String>,
    date: DateTime<Utc>,
  ) -> Self {
    Self {
      reward_id: Uuid::new_v4(),
      user_id,
      amount,
      kind,
      description: description.into(),
      task_id: None,
      date,
    }
  }

  pub fn with_task(mut self, task_id: impl Into<String>) -> Self {
    self.task_id = Some(task_id.into());
    self
  }

  pub fn with_id(mut self, reward_id: Uuid) -> Self {
    self.reward_id = reward_id;
    self
  }
}

/// One credited referral edge. `referred_id` is unique across all records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferralRecord {
  pub referrer_id:    UserId,
  pub referred_id:    UserId,
  pub points_awarded: u64,
  pub timestamp:      DateTime<Utc>,
}
