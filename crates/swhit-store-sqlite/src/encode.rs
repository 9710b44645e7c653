//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings with a fixed microsecond width so
//! that lexical order equals chronological order. Enums are stored as their
//! snake_case tags. UUIDs are stored hyphenated.

use std::{collections::BTreeSet, str::FromStr};

use chrono::{DateTime, SecondsFormat, Utc};
use swhit_core::{
  ledger::{ReferralRecord, RewardKind, RewardRecord},
  task::{Task, TaskKind},
  user::{UserId, UserRecord},
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn decode_points(column: &'static str, raw: i64) -> Result<u64> {
  u64::try_from(raw).map_err(|_| Error::Decode { column, value: raw.to_string() })
}

/// SQLite integers are signed; balances are clamped rather than wrapped.
pub fn encode_points(points: u64) -> i64 { i64::try_from(points).unwrap_or(i64::MAX) }

fn decode_tag<T: FromStr>(column: &'static str, s: &str) -> Result<T> {
  T::from_str(s).map_err(|_| Error::Decode { column, value: s.to_owned() })
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `users` row plus its `user_tasks`.
pub struct RawUser {
  pub id:              String,
  pub display_name:    Option<String>,
  pub language_code:   Option<String>,
  pub points:          i64,
  pub referral_code:   String,
  pub referred_by:     Option<String>,
  pub created_at:      String,
  pub last_login:      String,
  pub completed_tasks: Vec<String>,
}

impl RawUser {
  pub fn into_user(self) -> Result<UserRecord> {
    Ok(UserRecord {
      id:              UserId::new(self.id),
      display_name:    self.display_name,
      language_code:   self.language_code,
      points:          decode_points("users.points", self.points)?,
      referral_code:   self.referral_code,
      referred_by:     self.referred_by.map(UserId::new),
      completed_tasks: self.completed_tasks.into_iter().collect::<BTreeSet<_>>(),
      created_at:      decode_dt(&self.created_at)?,
      last_login:      decode_dt(&self.last_login)?,
    })
  }
}

/// Raw values read from a `rewards` row.
pub struct RawReward {
  pub reward_id:   String,
  pub user_id:     String,
  pub amount:      i64,
  pub kind:        String,
  pub description: String,
  pub task_id:     Option<String>,
  pub date:        String,
}

impl RawReward {
  pub fn into_reward(self) -> Result<RewardRecord> {
    Ok(RewardRecord {
      reward_id:   decode_uuid(&self.reward_id)?,
      user_id:     UserId::new(self.user_id),
      amount:      self.amount,
      kind:        decode_tag::<RewardKind>("rewards.kind", &self.kind)?,
      description: self.description,
      task_id:     self.task_id,
      date:        decode_dt(&self.date)?,
    })
  }
}

/// Raw values read from a `referrals` row.
pub struct RawReferral {
  pub referrer_id:    String,
  pub referred_id:    String,
  pub points_awarded: i64,
  pub timestamp:      String,
}

impl RawReferral {
  pub fn into_referral(self) -> Result<ReferralRecord> {
    Ok(ReferralRecord {
      referrer_id:    UserId::new(self.referrer_id),
      referred_id:    UserId::new(self.referred_id),
      points_awarded: decode_points("referrals.points_awarded", self.points_awarded)?,
      timestamp:      decode_dt(&self.timestamp)?,
    })
  }
}

/// Raw values read from a `tasks` row.
pub struct RawTask {
  pub task_id: String,
  pub name:    String,
  pub reward:  i64,
  pub kind:    String,
  pub link:    Option<String>,
  pub active:  bool,
}

impl RawTask {
  pub fn into_task(self) -> Result<Task> {
    Ok(Task {
      task_id: self.task_id,
      name:    self.name,
      reward:  decode_points("tasks.reward", self.reward)?,
      kind:    decode_tag::<TaskKind>("tasks.kind", &self.kind)?,
      link:    self.link,
      active:  self.active,
    })
  }
}
