//! Identity resolution from the Telegram WebApp session payload.
//!
//! The host hands the web app an `initData` string: URL-encoded fields
//! including a JSON `user`, an optional `start_param` deep-link value, the
//! `auth_date` and an HMAC `hash` signed with the bot token. Resolution either
//! yields a [`HostSession`] or nothing; a missing or malformed payload means
//! "cannot authenticate" and is never retried.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::user::{Identity, UserId};

type HmacSha256 = Hmac<Sha256>;

/// Key used to derive the signing secret from the bot token.
const WEB_APP_DATA_KEY: &[u8] = b"WebAppData";

// ─── Configuration ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityConfig {
  /// When set, every payload must carry a valid signature for this token.
  #[serde(default)]
  pub bot_token:    Option<String>,
  /// Reject payloads whose `auth_date` is older than this many seconds.
  #[serde(default)]
  pub max_age_secs: Option<u64>,
  /// Substitute [`dev_identity`] when no payload is present.
  #[serde(default)]
  pub dev_fallback: bool,
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// What the host told us about the current session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostSession {
  pub identity:    Identity,
  /// Deep-link parameter; carries a referral code on first launch.
  pub start_param: Option<String>,
}

/// Placeholder identity for local development without a Telegram host.
pub fn dev_identity() -> Identity {
  Identity {
    id:            UserId::from("12345"),
    display_name:  Some("Test User".to_owned()),
    language_code: Some("en".to_owned()),
  }
}

#[derive(Debug, Error)]
pub enum IdentityError {
  #[error("no session payload")]
  Missing,
  #[error("malformed session payload: {0}")]
  Malformed(String),
  #[error("session payload lacks field {0:?}")]
  MissingField(&'static str),
  #[error("session signature mismatch")]
  BadSignature,
  #[error("session payload expired")]
  Expired,
}

/// The `user` field of `initData`.
#[derive(Debug, Deserialize)]
struct WebAppUser {
  id:            i64,
  first_name:    Option<String>,
  last_name:     Option<String>,
  username:      Option<String>,
  language_code: Option<String>,
}

impl WebAppUser {
  fn display_name(&self) -> Option<String> {
    let full = [self.first_name.as_deref(), self.last_name.as_deref()]
      .into_iter()
      .flatten()
      .map(str::trim)
      .filter(|s| !s.is_empty())
      .collect::<Vec<_>>()
      .join(" ");
    if full.is_empty() {
      self.username.clone().filter(|u| !u.is_empty())
    } else {
      Some(full)
    }
  }
}

// ─── Resolution ──────────────────────────────────────────────────────────────

/// Resolve the session payload into a [`HostSession`].
///
/// Returns `None` whenever the caller cannot be authenticated.
pub fn resolve_identity(
  init_data: Option<&str>,
  config: &IdentityConfig,
  now: DateTime<Utc>,
) -> Option<HostSession> {
  match parse_init_data(init_data, config, now) {
    Ok(session) => Some(session),
    Err(IdentityError::Missing) if config.dev_fallback => {
      tracing::debug!("no host session payload; using development identity");
      Some(HostSession { identity: dev_identity(), start_param: None })
    }
    Err(e) => {
      tracing::warn!(error = %e, "rejected host session payload");
      None
    }
  }
}

/// Parse and, if configured, verify `initData`.
pub fn parse_init_data(
  init_data: Option<&str>,
  config: &IdentityConfig,
  now: DateTime<Utc>,
) -> Result<HostSession, IdentityError> {
  let raw = init_data
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or(IdentityError::Missing)?;

  let pairs: Vec<(String, String)> = serde_urlencoded::from_str(raw)
    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
  let field = |name: &str| {
    pairs
      .iter()
      .find(|(k, _)| k == name)
      .map(|(_, v)| v.as_str())
  };

  if let Some(token) = &config.bot_token {
    let hash = field("hash").ok_or(IdentityError::MissingField("hash"))?;
    verify_signature(&pairs, hash, token)?;
  }

  if let Some(max_age) = config.max_age_secs {
    let auth_date: i64 = field("auth_date")
      .ok_or(IdentityError::MissingField("auth_date"))?
      .parse()
      .map_err(|_| IdentityError::Malformed("auth_date".to_owned()))?;
    let age = now.timestamp().saturating_sub(auth_date);
    if age < 0 || age as u64 > max_age {
      return Err(IdentityError::Expired);
    }
  }

  let user: WebAppUser =
    serde_json::from_str(field("user").ok_or(IdentityError::MissingField("user"))?)
      .map_err(|e| IdentityError::Malformed(e.to_string()))?;

  let identity = Identity {
    id:            UserId::new(user.id.to_string()),
    display_name:  user.display_name(),
    language_code: user.language_code.filter(|l| !l.is_empty()),
  };
  let start_param = field("start_param")
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(str::to_owned);

  Ok(HostSession { identity, start_param })
}

/// The `key=value` lines, sorted by key, that the host signs.
fn data_check_string(pairs: &[(String, String)]) -> String {
  let mut lines: Vec<String> = pairs
    .iter()
    .filter(|(k, _)| k != "hash")
    .map(|(k, v)| format!("{k}={v}"))
    .collect();
  lines.sort();
  lines.join("\n")
}

fn signing_key(bot_token: &str) -> Result<Vec<u8>, IdentityError> {
  let mut mac = HmacSha256::new_from_slice(WEB_APP_DATA_KEY)
    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
  mac.update(bot_token.as_bytes());
  Ok(mac.finalize().into_bytes().to_vec())
}

fn verify_signature(
  pairs: &[(String, String)],
  hash: &str,
  bot_token: &str,
) -> Result<(), IdentityError> {
  let expected = hex::decode(hash).map_err(|_| IdentityError::BadSignature)?;
  let key = signing_key(bot_token)?;
  let mut mac = HmacSha256::new_from_slice(&key)
    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
  mac.update(data_check_string(pairs).as_bytes());
  mac.verify_slice(&expected).map_err(|_| IdentityError::BadSignature)
}

/// Build a signed `initData` string; the inverse of [`parse_init_data`].
///
/// Used by tests and by tooling that needs to impersonate the host.
pub fn sign_init_data(
  fields: &[(&str, &str)],
  bot_token: &str,
) -> Result<String, IdentityError> {
  let pairs: Vec<(String, String)> = fields
    .iter()
    .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
    .collect();
  let key = signing_key(bot_token)?;
  let mut mac = HmacSha256::new_from_slice(&key)
    .map_err(|e| IdentityError::Malformed(e.to_string()))?;
  mac.update(data_check_string(&pairs).as_bytes());
  let hash = hex::encode(mac.finalize().into_bytes());

  let mut signed = pairs;
  signed.push(("hash".to_owned(), hash));
  serde_urlencoded::to_string(&signed)
    .map_err(|e| IdentityError::Malformed(e.to_string()))
}
