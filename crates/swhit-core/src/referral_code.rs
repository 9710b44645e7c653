//! Referral code derivation and share links.
//!
//! Codes are derived from the user id so that re-running creation for the same
//! user yields the same code. The salt only moves when the store reports a
//! collision with another user's code.

use sha2::{Digest, Sha256};

use crate::user::UserId;

pub const CODE_PREFIX: &str = "REF";

/// Hex characters kept from the digest.
const CODE_HEX_LEN: usize = 8;

/// Collisions tolerated before creation gives up.
pub const MAX_SALT: u32 = 16;

/// Derive the referral code for `id` under `salt`.
pub fn derive(id: &UserId, salt: u32) -> String {
  let mut hasher = Sha256::new();
  hasher.update(id.as_str().as_bytes());
  hasher.update(b":");
  hasher.update(salt.to_le_bytes());
  let digest = hex::encode_upper(hasher.finalize());
  format!("{CODE_PREFIX}{}", &digest[..CODE_HEX_LEN])
}

/// Normalise user input before lookup: codes are case-insensitive and may be
/// pasted with surrounding whitespace.
pub fn normalize(code: &str) -> String { code.trim().to_ascii_uppercase() }

/// Shareable sign-up link carrying `code`.
pub fn referral_link(public_url: &str, code: &str) -> String {
  format!("{}/signup?referral={code}", public_url.trim_end_matches('/'))
}
