//! Referral credit: verify a code, credit both parties once, record the edge.

use chrono::Utc;
use serde::Serialize;
use uuid::Uuid;

use super::{AirdropService, signed};
use crate::{
  Error, Result,
  ledger::{ReferralRecord, RewardKind, RewardRecord},
  referral_code,
  retry::{AttemptError, with_retry},
  store::{AirdropStore, CommitOutcome, Mutation, Precondition, WriteBatch},
  user::{UserId, UserRecord},
};

/// A successfully credited referral, with both parties as refreshed after
/// the write.
#[derive(Debug, Clone, Serialize)]
pub struct ReferralReceipt {
  pub referrer: UserRecord,
  pub referee:  UserRecord,
  pub record:   ReferralRecord,
}

impl<S: AirdropStore> AirdropService<S> {
  /// Redeem `referral_code` on behalf of `new_user_id`.
  ///
  /// Each attempt re-runs every check from the code lookup onwards, so a
  /// retry after a concurrent referral of the same user ends in
  /// [`Error::AlreadyReferred`] rather than a second credit. The referrer's
  /// reward carries an id fixed for the whole call; a retry that finds that
  /// reward already in the ledger reports the earlier attempt's write as its
  /// own success.
  pub async fn apply_referral(
    &self,
    new_user_id: &UserId,
    referral_code: &str,
  ) -> Result<ReferralReceipt> {
    let code = referral_code::normalize(referral_code);
    let code = code.as_str();
    let claim = Uuid::new_v4();

    let result = with_retry(&self.retry, "apply_referral", move |attempt| {
      self.referral_attempt(new_user_id, code, claim, attempt)
    })
    .await;

    let (referrer, referee, record) = match result {
      Ok(applied) => applied,
      Err(e) => {
        tracing::info!(user = %new_user_id, code, error = %e, "referral not applied");
        return Err(e);
      }
    };

    tracing::info!(
      referrer = %record.referrer_id,
      referred = %record.referred_id,
      points = record.points_awarded,
      "referral credited"
    );

    Ok(ReferralReceipt {
      referrer: self.refreshed(referrer).await,
      referee: self.refreshed(referee).await,
      record,
    })
  }

  /// One validate-then-write pass. Returns the pre-write snapshots projected
  /// forward by the credited amounts.
  async fn referral_attempt(
    &self,
    new_user_id: &UserId,
    code: &str,
    claim: Uuid,
    attempt: u32,
  ) -> Result<(UserRecord, UserRecord, ReferralRecord), AttemptError> {
    let mut referrer = self
      .store
      .find_by_referral_code(code)
      .await
      .map_err(AttemptError::transient)?
      .ok_or_else(|| AttemptError::Permanent(Error::InvalidCode(code.to_owned())))?;

    if referrer.id == *new_user_id {
      return Err(AttemptError::Permanent(Error::SelfReferral));
    }

    let mut referee = self
      .store
      .get_user(new_user_id)
      .await
      .map_err(AttemptError::transient)?
      .ok_or_else(|| AttemptError::Permanent(Error::UnknownNewUser(new_user_id.clone())))?;

    if referee.referred_by.is_some() {
      // An earlier attempt may have timed out after its commit went through.
      if attempt > 1
        && referee.referred_by.as_ref() == Some(&referrer.id)
        && self.landed(&referrer.id, claim).await?
      {
        let edge = self
          .store
          .referrals_by(&referrer.id)
          .await
          .map_err(AttemptError::transient)?
          .into_iter()
          .find(|r| r.referred_id == *new_user_id);
        if let Some(record) = edge {
          tracing::debug!(user = %new_user_id, attempt, "earlier referral attempt landed");
          return Ok((referrer, referee, record));
        }
      }
      return Err(AttemptError::Permanent(Error::AlreadyReferred(
        new_user_id.clone(),
      )));
    }

    let now = Utc::now();
    let referrer_bonus = self.policy.referrer_bonus;
    let referee_bonus = self.policy.referee_bonus;
    let invitee = referee.display_name.as_deref().unwrap_or(new_user_id.as_str());

    let record = ReferralRecord {
      referrer_id:    referrer.id.clone(),
      referred_id:    new_user_id.clone(),
      points_awarded: referrer_bonus,
      timestamp:      now,
    };

    let referrer_reward = RewardRecord::new(
      referrer.id.clone(),
      signed(referrer_bonus),
      RewardKind::Referral,
      format!("Invited {invitee}"),
      now,
    )
    .with_id(claim);

    let batch = WriteBatch::new()
      .require(Precondition::UserExists(referrer.id.clone()))
      .require(Precondition::NotReferred(new_user_id.clone()))
      .push(Mutation::Reward(referrer_reward))
      .push(Mutation::Reward(RewardRecord::new(
        new_user_id.clone(),
        signed(referee_bonus),
        RewardKind::Welcome,
        "Joined with a referral code",
        now,
      )))
      .push(Mutation::SetReferredBy {
        user_id:     new_user_id.clone(),
        referrer_id: referrer.id.clone(),
      })
      .push(Mutation::Referral(record.clone()));

    match self.store.commit(batch).await.map_err(AttemptError::transient)? {
      CommitOutcome::Applied => {}
      CommitOutcome::Rejected(conflict) => {
        return Err(AttemptError::transient(format!(
          "write rejected: {conflict:?}"
        )));
      }
    }

    referrer.points += referrer_bonus;
    referee.points += referee_bonus;
    referee.referred_by = Some(referrer.id.clone());
    Ok((referrer, referee, record))
  }

  /// Whether the ledger already holds the reward `claim` for `user_id`.
  async fn landed(&self, user_id: &UserId, claim: Uuid) -> Result<bool, AttemptError> {
    let rewards = self.store.rewards_for(user_id).await.map_err(AttemptError::transient)?;
    Ok(rewards.iter().any(|r| r.reward_id == claim))
  }

  /// Re-read a user after a committed write. The write has already landed,
  /// so a failed read falls back to the projected snapshot.
  pub(super) async fn refreshed(&self, projected: UserRecord) -> UserRecord {
    match self.store.get_user(&projected.id).await {
      Ok(Some(user)) => user,
      Ok(None) => projected,
      Err(e) => {
        tracing::warn!(user = %projected.id, error = %e, "refresh after write failed");
        projected
      }
    }
  }
}
