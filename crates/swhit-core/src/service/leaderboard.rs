//! Read-only queries: leaderboard, totals, per-user history.
//!
//! These may lag the credit workflows; none of them writes.

use serde::Serialize;

use super::AirdropService;
use crate::{
  Error, Result,
  ledger::{ReferralRecord, RewardRecord},
  store::AirdropStore,
  user::{Rank, UserId, UserRecord},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardEntry {
  /// 1-based.
  pub position:     usize,
  pub user_id:      UserId,
  pub display_name: Option<String>,
  pub points:       u64,
  pub rank:         Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CampaignStats {
  pub total_users: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReferralStats {
  pub total_referrals: usize,
  pub total_points:    u64,
  pub referrals:       Vec<ReferralRecord>,
}

impl<S: AirdropStore> AirdropService<S> {
  pub async fn get_user(&self, id: &UserId) -> Result<Option<UserRecord>> {
    self.store.get_user(id).await.map_err(Error::unavailable)
  }

  /// The `n` highest balances; ties go to the earlier joiner.
  pub async fn top_users(&self, n: usize) -> Result<Vec<LeaderboardEntry>> {
    let users = self.store.top_users(n).await.map_err(Error::unavailable)?;
    Ok(
      users
        .into_iter()
        .enumerate()
        .map(|(i, u)| LeaderboardEntry {
          position:     i + 1,
          rank:         u.rank(),
          user_id:      u.id,
          display_name: u.display_name,
          points:       u.points,
        })
        .collect(),
    )
  }

  pub async fn stats(&self) -> Result<CampaignStats> {
    let total_users = self.store.count_users().await.map_err(Error::unavailable)?;
    Ok(CampaignStats { total_users })
  }

  /// Referrals credited to `user_id` as referrer.
  pub async fn referral_stats(&self, user_id: &UserId) -> Result<ReferralStats> {
    let referrals = self
      .store
      .referrals_by(user_id)
      .await
      .map_err(Error::unavailable)?;
    Ok(ReferralStats {
      total_referrals: referrals.len(),
      total_points:    referrals.iter().map(|r| r.points_awarded).sum(),
      referrals,
    })
  }

  /// Ledger entries for `user_id`, newest first.
  pub async fn reward_history(&self, user_id: &UserId) -> Result<Vec<RewardRecord>> {
    self.store.rewards_for(user_id).await.map_err(Error::unavailable)
  }
}
