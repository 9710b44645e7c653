//! Handlers for the caller's own records.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/me` | 404 until the session has been started |
//! | `POST` | `/me/referral` | Body: `{"code":"REF..."}` |
//! | `GET`  | `/me/referrals` | Count, points earned and the referral edges |
//! | `GET`  | `/me/rewards` | Ledger entries, newest first |

use axum::{Json, extract::State};
use serde::Deserialize;
use swhit_core::{
  Error as CoreError,
  ledger::RewardRecord,
  service::{ReferralReceipt, ReferralStats},
  store::AirdropStore,
};

use crate::{AppState, Session, error::ApiError, session::UserView};

/// `GET /me`
pub async fn profile<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
) -> Result<Json<UserView>, ApiError>
where
  S: AirdropStore + 'static,
{
  let id = session.identity.id;
  let user = state
    .service
    .get_user(&id)
    .await?
    .ok_or_else(|| CoreError::UnknownUser(id.clone()))?;
  Ok(Json(UserView::new(user, &state.public_url)))
}

#[derive(Debug, Deserialize)]
pub struct RedeemBody {
  pub code: String,
}

/// `POST /me/referral`: redeem a code for a user created without one.
pub async fn redeem<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
  Json(body): Json<RedeemBody>,
) -> Result<Json<ReferralReceipt>, ApiError>
where
  S: AirdropStore + 'static,
{
  let service = state.service.clone();
  let id = session.identity.id;
  let receipt = tokio::spawn(async move { service.apply_referral(&id, &body.code).await })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
  Ok(Json(receipt))
}

/// `GET /me/referrals`
pub async fn referrals<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
) -> Result<Json<ReferralStats>, ApiError>
where
  S: AirdropStore + 'static,
{
  Ok(Json(state.service.referral_stats(&session.identity.id).await?))
}

/// `GET /me/rewards`
pub async fn rewards<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
) -> Result<Json<Vec<RewardRecord>>, ApiError>
where
  S: AirdropStore + 'static,
{
  Ok(Json(state.service.reward_history(&session.identity.id).await?))
}
