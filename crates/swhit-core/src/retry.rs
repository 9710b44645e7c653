//! Bounded retry with linear backoff.
//!
//! The combinator knows nothing about referrals or tasks: an attempt reports
//! either success, a permanent failure (returned immediately) or a transient
//! failure (retried after `attempt × backoff_step`). Each attempt is bounded by
//! `attempt_timeout`; running out of time counts as transient.

use std::{future::Future, time::Duration};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
  /// Retries after the first attempt.
  pub max_retries:     u32,
  pub backoff_step:    Duration,
  pub attempt_timeout: Duration,
}

impl RetryPolicy {
  /// Delay before retry number `retry` (1-based).
  pub fn backoff(&self, retry: u32) -> Duration { self.backoff_step * retry }
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self {
      max_retries:     3,
      backoff_step:    Duration::from_millis(1_000),
      attempt_timeout: Duration::from_secs(5),
    }
  }
}

/// How a single attempt failed.
#[derive(Debug)]
pub enum AttemptError {
  Permanent(Error),
  Transient(String),
}

impl AttemptError {
  pub fn transient(reason: impl std::fmt::Display) -> Self {
    Self::Transient(reason.to_string())
  }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy is spent.
///
/// `attempt` receives the 1-based attempt number and must re-validate from
/// scratch every time.
pub async fn with_retry<T, F, Fut>(
  policy: &RetryPolicy,
  operation: &str,
  mut attempt: F,
) -> Result<T>
where
  F: FnMut(u32) -> Fut,
  Fut: Future<Output = Result<T, AttemptError>>,
{
  let mut number = 1;
  loop {
    let outcome = tokio::time::timeout(policy.attempt_timeout, attempt(number))
      .await
      .unwrap_or_else(|_| Err(AttemptError::transient("attempt timed out")));

    let reason = match outcome {
      Ok(value) => return Ok(value),
      Err(AttemptError::Permanent(e)) => return Err(e),
      Err(AttemptError::Transient(reason)) => reason,
    };

    if number > policy.max_retries {
      tracing::error!(operation, attempts = number, %reason, "retries exhausted");
      return Err(Error::TransientFailure { attempts: number, reason });
    }

    let delay = policy.backoff(number);
    tracing::warn!(
      operation,
      attempt = number,
      delay_ms = delay.as_millis() as u64,
      %reason,
      "transient failure; retrying"
    );
    tokio::time::sleep(delay).await;
    number += 1;
  }
}

#[cfg(test)]
mod tests {
  use std::sync::atomic::{AtomicU32, Ordering};

  use super::*;

  fn fast(max_retries: u32) -> RetryPolicy {
    RetryPolicy {
      max_retries,
      backoff_step: Duration::from_millis(1),
      attempt_timeout: Duration::from_millis(200),
    }
  }

  #[test]
  fn backoff_is_linear() {
    let policy = RetryPolicy::default();
    assert_eq!(policy.backoff(1), Duration::from_millis(1_000));
    assert_eq!(policy.backoff(3), Duration::from_millis(3_000));
  }

  #[tokio::test]
  async fn succeeds_after_transient_failures() {
    let calls = AtomicU32::new(0);
    let value = with_retry(&fast(3), "test", |n| {
      calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if n < 3 { Err(AttemptError::transient("busy")) } else { Ok(n) }
      }
    })
    .await
    .unwrap();
    assert_eq!(value, 3);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn permanent_failure_is_not_retried() {
    let calls = AtomicU32::new(0);
    let err = with_retry(&fast(3), "test", |_| {
      calls.fetch_add(1, Ordering::SeqCst);
      async { Err::<(), _>(AttemptError::Permanent(Error::SelfReferral)) }
    })
    .await
    .unwrap_err();
    assert!(matches!(err, Error::SelfReferral));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[tokio::test]
  async fn exhaustion_reports_attempt_count() {
    let err = with_retry(&fast(2), "test", |_| async {
      Err::<(), _>(AttemptError::transient("conflict"))
    })
    .await
    .unwrap_err();
    match err {
      Error::TransientFailure { attempts, reason } => {
        assert_eq!(attempts, 3);
        assert_eq!(reason, "conflict");
      }
      other => panic!("unexpected error: {other}"),
    }
  }

  #[tokio::test]
  async fn slow_attempt_counts_as_transient() {
    let calls = AtomicU32::new(0);
    let value = with_retry(&fast(1), "test", |n| {
      calls.fetch_add(1, Ordering::SeqCst);
      async move {
        if n == 1 {
          tokio::time::sleep(Duration::from_secs(5)).await;
        }
        Ok::<_, AttemptError>(n)
      }
    })
    .await
    .unwrap();
    assert_eq!(value, 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
  }
}
