//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use serde_json::json;
use swhit_core::Error as CoreError;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("missing or invalid session")]
  Unauthorized,

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Core(#[from] CoreError),

  /// A spawned workflow panicked or was aborted.
  #[error("internal error: {0}")]
  Internal(String),
}

impl ApiError {
  fn status(&self) -> StatusCode {
    match self {
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::BadRequest(_) => StatusCode::BAD_REQUEST,
      Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
      Self::Core(e) => match e {
        CoreError::InvalidCode(_)
        | CoreError::UnknownNewUser(_)
        | CoreError::UnknownUser(_)
        | CoreError::UnknownTask(_) => StatusCode::NOT_FOUND,
        CoreError::SelfReferral => StatusCode::BAD_REQUEST,
        CoreError::AlreadyReferred(_) | CoreError::AlreadyCompleted { .. } => {
          StatusCode::CONFLICT
        }
        CoreError::TransientFailure { .. } | CoreError::Unavailable(_) => {
          StatusCode::SERVICE_UNAVAILABLE
        }
        CoreError::ReferralCodeExhausted(_) => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }

  fn code(&self) -> &'static str {
    match self {
      Self::Unauthorized => "unauthorized",
      Self::BadRequest(_) => "bad_request",
      Self::Internal(_) => "internal",
      Self::Core(e) => e.code(),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }
    let body = json!({ "error": self.to_string(), "code": self.code() });
    (status, Json(body)).into_response()
  }
}
