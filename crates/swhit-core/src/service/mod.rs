//! The airdrop workflows: session upsert, referral credit, task credit and the
//! read-only leaderboard queries.
//!
//! [`AirdropService`] holds no session state of its own. The caller's identity
//! is passed explicitly to every operation.

mod leaderboard;
mod referral;
mod session;
mod task;


use std::sync::Arc;

pub use leaderboard::{CampaignStats, LeaderboardEntry, ReferralStats};
pub use referral::ReferralReceipt;
pub use session::SessionOutcome;
pub use task::TaskReceipt;

use crate::{config::CreditPolicy, retry::RetryPolicy, store::AirdropStore};

pub struct AirdropService<S> {
  store:  Arc<S>,
  policy: CreditPolicy,
  retry:  RetryPolicy,
}

impl<S: AirdropStore> AirdropService<S> {
  pub fn new(store: Arc<S>, policy: CreditPolicy) -> Self {
    let retry = policy.retry_policy();
    Self { store, policy, retry }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn policy(&self) -> &CreditPolicy { &self.policy }
}

/// Ledger amounts are signed; policy amounts are validated far below this.
fn signed(points: u64) -> i64 { i64::try_from(points).unwrap_or(i64::MAX) }
