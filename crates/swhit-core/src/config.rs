//! Point amounts and retry tuning for the credit workflows.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditPolicy {
  /// Balance of a freshly created user.
  pub start_grant:        u64,
  /// Paid to the owner of a redeemed referral code.
  pub referrer_bonus:     u64,
  /// Paid to the user redeeming a referral code.
  pub referee_bonus:      u64,
  pub max_retries:        u32,
  pub backoff_step_ms:    u64,
  pub attempt_timeout_ms: u64,
}

impl Default for CreditPolicy {
  fn default() -> Self {
    Self {
      start_grant:        1_500,
      referrer_bonus:     2_500,
      referee_bonus:      1_500,
      max_retries:        3,
      backoff_step_ms:    1_000,
      attempt_timeout_ms: 5_000,
    }
  }
}

impl CreditPolicy {
  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_retries:     self.max_retries,
      backoff_step:    Duration::from_millis(self.backoff_step_ms),
      attempt_timeout: Duration::from_millis(self.attempt_timeout_ms),
    }
  }
}
