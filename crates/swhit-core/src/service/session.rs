//! Session start: create the user on first sight, refresh it afterwards.

use chrono::Utc;
use serde::Serialize;

use super::{AirdropService, ReferralReceipt};
use crate::{
  Error, Result,
  identity::HostSession,
  referral_code,
  store::{AirdropStore, InsertOutcome},
  user::UserRecord,
};

#[derive(Debug, Serialize)]
pub struct SessionOutcome {
  /// The user as it stands after this session start.
  pub user:     UserRecord,
  /// `true` when this call created the record.
  pub created:  bool,
  /// Result of redeeming the pending referral code, if one was applied.
  #[serde(skip)]
  pub referral: Option<Result<ReferralReceipt>>,
}

impl<S: AirdropStore> AirdropService<S> {
  /// Create or refresh the record for the session's identity.
  ///
  /// A referral code (`referral`, else the deep-link `start_param`) is
  /// redeemed on every session that carries one. Its outcome never fails the
  /// session. A signup whose referral failed transiently is finished by the
  /// next launch with the same code; once the user is referred, later
  /// launches report [`Error::AlreadyReferred`] and credit nothing.
  pub async fn upsert_session(
    &self,
    session: &HostSession,
    referral: Option<&str>,
  ) -> Result<SessionOutcome> {
    let identity = &session.identity;
    let now = Utc::now();
    let pending = referral
      .or(session.start_param.as_deref())
      .map(str::trim)
      .filter(|c| !c.is_empty());

    if let Some(user) = self
      .store
      .touch_session(identity, now)
      .await
      .map_err(Error::unavailable)?
    {
      return Ok(self.redeem_pending(user, false, pending).await);
    }

    let mut created = None;
    for salt in 0..referral_code::MAX_SALT {
      let code = referral_code::derive(&identity.id, salt);
      let record = UserRecord::new(identity, code, self.policy.start_grant, now);
      match self
        .store
        .insert_user(record.clone())
        .await
        .map_err(Error::unavailable)?
      {
        InsertOutcome::Inserted => {
          created = Some(record);
          break;
        }
        InsertOutcome::IdTaken => {
          // Lost a creation race with another session for the same id.
          let user = self
            .store
            .touch_session(identity, now)
            .await
            .map_err(Error::unavailable)?
            .ok_or_else(|| Error::UnknownUser(identity.id.clone()))?;
          return Ok(self.redeem_pending(user, false, pending).await);
        }
        InsertOutcome::CodeTaken => {
          tracing::debug!(user = %identity.id, salt, "referral code collision");
        }
      }
    }

    let user = created.ok_or_else(|| Error::ReferralCodeExhausted(identity.id.clone()))?;
    tracing::info!(user = %user.id, code = %user.referral_code, "user created");

    Ok(self.redeem_pending(user, true, pending).await)
  }

  async fn redeem_pending(
    &self,
    user: UserRecord,
    created: bool,
    pending: Option<&str>,
  ) -> SessionOutcome {
    let Some(code) = pending else {
      return SessionOutcome { user, created, referral: None };
    };

    let outcome = self.apply_referral(&user.id, code).await;
    let user = match &outcome {
      Ok(receipt) => receipt.referee.clone(),
      Err(_) => user,
    };
    SessionOutcome { user, created, referral: Some(outcome) }
  }
}
