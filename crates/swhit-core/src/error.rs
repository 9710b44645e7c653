//! Error types for `swhit-core`.

use thiserror::Error;

use crate::user::UserId;

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid referral code: {0:?}")]
  InvalidCode(String),

  #[error("a user cannot redeem their own referral code")]
  SelfReferral,

  #[error("referred user not found: {0}")]
  UnknownNewUser(UserId),

  #[error("user {0} has already been referred")]
  AlreadyReferred(UserId),

  #[error("user {user_id} already completed task {task_id:?}")]
  AlreadyCompleted { user_id: UserId, task_id: String },

  #[error("user not found: {0}")]
  UnknownUser(UserId),

  #[error("task not found or inactive: {0:?}")]
  UnknownTask(String),

  #[error("gave up after {attempts} attempts: {reason}")]
  TransientFailure { attempts: u32, reason: String },

  #[error("no free referral code for user {0}")]
  ReferralCodeExhausted(UserId),

  #[error("store unavailable: {0}")]
  Unavailable(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
  /// Wrap a backend error. Used on paths that are not retried.
  pub fn unavailable<E>(err: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Unavailable(Box::new(err))
  }

  /// Validation failures that must never be retried.
  pub fn is_permanent(&self) -> bool {
    matches!(
      self,
      Self::InvalidCode(_)
        | Self::SelfReferral
        | Self::UnknownNewUser(_)
        | Self::AlreadyReferred(_)
        | Self::AlreadyCompleted { .. }
        | Self::UnknownUser(_)
        | Self::UnknownTask(_)
    )
  }

  /// Short machine-readable tag, used by the API error body.
  pub fn code(&self) -> &'static str {
    match self {
      Self::InvalidCode(_) => "invalid_code",
      Self::SelfReferral => "self_referral",
      Self::UnknownNewUser(_) => "unknown_new_user",
      Self::AlreadyReferred(_) => "already_referred",
      Self::AlreadyCompleted { .. } => "already_completed",
      Self::UnknownUser(_) => "unknown_user",
      Self::UnknownTask(_) => "unknown_task",
      Self::TransientFailure { .. } => "transient_failure",
      Self::ReferralCodeExhausted(_) => "referral_code_exhausted",
      Self::Unavailable(_) => "unavailable",
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
