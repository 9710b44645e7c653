//! User records and the derived rank.
//!
//! A user is keyed by the external identity handed to us by the Telegram host.
//! Points only ever move through reward ledger entries (see
//! [`crate::ledger`]); the rank is computed from points on every read and is
//! never persisted.

use std::{collections::BTreeSet, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ─── Identity ────────────────────────────────────────────────────────────────

/// External identity string (a Telegram user id rendered as decimal).
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for UserId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for UserId {
  fn from(s: &str) -> Self { Self(s.to_owned()) }
}

impl From<String> for UserId {
  fn from(s: String) -> Self { Self(s) }
}

/// Profile attributes supplied by the host on every session start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
  pub id:            UserId,
  pub display_name:  Option<String>,
  pub language_code: Option<String>,
}

// ─── Rank ────────────────────────────────────────────────────────────────────

/// Display label derived from a point balance.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumIter,
)]
#[serde(rename_all = "lowercase")]
pub enum Rank {
  Novice,
  Apprentice,
  Adept,
  Expert,
  Master,
}

impl Rank {
  /// Minimum balance required to hold this rank.
  pub const fn threshold(self) -> u64 {
    match self {
      Self::Novice => 0,
      Self::Apprentice => 1_000,
      Self::Adept => 5_000,
      Self::Expert => 10_000,
      Self::Master => 50_000,
    }
  }

  /// The highest rank whose threshold `points` reaches.
  pub fn for_points(points: u64) -> Self {
    use strum::IntoEnumIterator as _;
    Self::iter()
      .rev()
      .find(|r| points >= r.threshold())
      .unwrap_or(Self::Novice)
  }
}

// ─── UserRecord ──────────────────────────────────────────────────────────────

/// One profile record per external identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
  pub id:              UserId,
  pub display_name:    Option<String>,
  pub language_code:   Option<String>,
  pub points:          u64,
  /// Unique across all users; never changes once assigned.
  pub referral_code:   String,
  /// Set at most once, by the referral workflow.
  pub referred_by:     Option<UserId>,
  pub completed_tasks: BTreeSet<String>,
  pub created_at:      DateTime<Utc>,
  pub last_login:      DateTime<Utc>,
}

impl UserRecord {
  /// A freshly created record holding only the start grant.
  pub fn new(
    identity: &Identity,
    referral_code: String,
    start_grant: u64,
    now: DateTime<Utc>,
  ) -> Self {
    Self {
      id: identity.id.clone(),
      display_name: identity.display_name.clone(),
      language_code: identity.language_code.clone(),
      points: start_grant,
      referral_code,
      referred_by: None,
      completed_tasks: BTreeSet::new(),
      created_at: now,
      last_login: now,
    }
  }

  pub fn rank(&self) -> Rank { Rank::for_points(self.points) }

  pub fn has_completed(&self, task_id: &str) -> bool {
    self.completed_tasks.contains(task_id)
  }
}
