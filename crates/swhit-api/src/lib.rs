//! JSON REST API for the SWHIT airdrop.
//!
//! Exposes an axum [`Router`] backed by any [`swhit_core::store::AirdropStore`].
//! Callers authenticate with `Authorization: tma <initData>`; TLS and
//! transport concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", swhit_api::api_router(state))
//! ```

pub mod auth;
pub mod error;
pub mod leaderboard;
pub mod me;
pub mod session;
pub mod tasks;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use swhit_core::{identity::IdentityConfig, service::AirdropService, store::AirdropStore};

pub use auth::Session;
pub use error::ApiError;

// ─── Application state ───────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct AppState<S> {
  pub service:    Arc<AirdropService<S>>,
  pub identity:   Arc<IdentityConfig>,
  /// Base URL of the mini-app, used to build share links.
  pub public_url: Arc<str>,
}

impl<S> Clone for AppState<S> {
  fn clone(&self) -> Self {
    Self {
      service:    self.service.clone(),
      identity:   self.identity.clone(),
      public_url: self.public_url.clone(),
    }
  }
}

// ─── Router ──────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: AppState<S>) -> Router<()>
where
  S: AirdropStore + 'static,
{
  Router::new()
    .route("/session", post(session::start::<S>))
    // The caller's own records
    .route("/me", get(me::profile::<S>))
    .route("/me/referral", post(me::redeem::<S>))
    .route("/me/referrals", get(me::referrals::<S>))
    .route("/me/rewards", get(me::rewards::<S>))
    // Tasks
    .route("/tasks", get(tasks::board::<S>))
    .route("/tasks/{id}/complete", post(tasks::complete::<S>))
    // Public reads
    .route("/leaderboard", get(leaderboard::top::<S>))
    .route("/stats", get(leaderboard::stats::<S>))
    .with_state(state)
}
