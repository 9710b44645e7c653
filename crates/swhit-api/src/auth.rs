//! `Authorization: tma <initData>` extractor.

use axum::{
  extract::FromRequestParts,
  http::{HeaderMap, header, request::Parts},
};
use chrono::Utc;
use swhit_core::{
  identity::{HostSession, IdentityConfig, resolve_identity},
  store::AirdropStore,
};

use crate::{AppState, error::ApiError};

/// Scheme prefix of the authorization header sent by the mini-app.
const SCHEME: &str = "tma ";

/// The authenticated caller. Present in a handler means the request carried
/// a verified host session, or the development identity when allowed.
#[derive(Debug, Clone)]
pub struct Session(pub HostSession);

/// Resolve the caller from request headers.
pub fn verify_session(headers: &HeaderMap, config: &IdentityConfig) -> Result<HostSession, ApiError> {
  let init_data = match headers.get(header::AUTHORIZATION) {
    None => None,
    Some(value) => {
      let value = value.to_str().map_err(|_| ApiError::Unauthorized)?;
      Some(value.strip_prefix(SCHEME).ok_or(ApiError::Unauthorized)?)
    }
  };
  resolve_identity(init_data, config, Utc::now()).ok_or(ApiError::Unauthorized)
}

impl<S> FromRequestParts<AppState<S>> for Session
where
  S: AirdropStore + 'static,
{
  type Rejection = ApiError;

  async fn from_request_parts(
    parts: &mut Parts,
    state: &AppState<S>,
  ) -> Result<Self, Self::Rejection> {
    verify_session(&parts.headers, &state.identity).map(Session)
  }
}
