//! Public, unauthenticated reads.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/leaderboard` | Optional `?limit=n`, clamped to 1..=100, default 10 |
//! | `GET`  | `/stats` | Total registered users |

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use swhit_core::{
  service::{CampaignStats, LeaderboardEntry},
  store::AirdropStore,
};

use crate::{AppState, error::ApiError};

pub const DEFAULT_LIMIT: usize = 10;
pub const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct TopParams {
  pub limit: Option<usize>,
}

/// `GET /leaderboard[?limit=<n>]`
pub async fn top<S>(
  State(state): State<AppState<S>>,
  Query(params): Query<TopParams>,
) -> Result<Json<Vec<LeaderboardEntry>>, ApiError>
where
  S: AirdropStore + 'static,
{
  let limit = params.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
  Ok(Json(state.service.top_users(limit).await?))
}

/// `GET /stats`
pub async fn stats<S>(
  State(state): State<AppState<S>>,
) -> Result<Json<CampaignStats>, ApiError>
where
  S: AirdropStore + 'static,
{
  Ok(Json(state.service.stats().await?))
}
