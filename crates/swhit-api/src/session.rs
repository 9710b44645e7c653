//! Handler for `POST /session` and the user view shared by `/me`.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/session` | Optional body `{"referral":"REF..."}`; falls back to `start_param` |

use axum::{Json, body::Bytes, extract::State, http::StatusCode, response::IntoResponse};
use serde::{Deserialize, Serialize};
use swhit_core::{
  referral_code::referral_link,
  service::ReferralReceipt,
  store::AirdropStore,
  user::{Rank, UserRecord},
};

use crate::{AppState, Session, error::ApiError};

// ─── User view ───────────────────────────────────────────────────────────────

/// A user record with its derived rank and share link.
#[derive(Debug, Serialize)]
pub struct UserView {
  #[serde(flatten)]
  pub user:          UserRecord,
  pub rank:          Rank,
  pub referral_link: String,
}

impl UserView {
  pub fn new(user: UserRecord, public_url: &str) -> Self {
    let referral_link = referral_link(public_url, &user.referral_code);
    Self { rank: user.rank(), user, referral_link }
  }
}

// ─── Start session ───────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct StartBody {
  pub referral: Option<String>,
}

/// What happened to the referral code presented with the session.
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReferralOutcome {
  Applied { receipt: ReferralReceipt },
  Rejected { code: &'static str, error: String },
}

#[derive(Debug, Serialize)]
pub struct StartResponse {
  pub user:     UserView,
  pub created:  bool,
  #[serde(skip_serializing_if = "Option::is_none")]
  pub referral: Option<ReferralOutcome>,
}

/// `POST /session`
///
/// Responds `201 Created` when the call registered the user.
pub async fn start<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
  body: Bytes,
) -> Result<impl IntoResponse, ApiError>
where
  S: AirdropStore + 'static,
{
  let body: StartBody = if body.iter().all(u8::is_ascii_whitespace) {
    StartBody::default()
  } else {
    serde_json::from_slice(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
  };

  let service = state.service.clone();
  let outcome = tokio::spawn(async move {
    service.upsert_session(&session, body.referral.as_deref()).await
  })
  .await
  .map_err(|e| ApiError::Internal(e.to_string()))??;

  let referral = outcome.referral.map(|r| match r {
    Ok(receipt) => ReferralOutcome::Applied { receipt },
    Err(e) => ReferralOutcome::Rejected { code: e.code(), error: e.to_string() },
  });
  let status = if outcome.created { StatusCode::CREATED } else { StatusCode::OK };
  let response = StartResponse {
    user: UserView::new(outcome.user, &state.public_url),
    created: outcome.created,
    referral,
  };
  Ok((status, Json(response)))
}
