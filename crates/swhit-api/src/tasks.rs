//! Handlers for `/tasks` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/tasks` | Active tasks with the caller's completion flags |
//! | `POST` | `/tasks/{id}/complete` | 409 if already completed |

use axum::{
  Json,
  extract::{Path, State},
};
use swhit_core::{service::TaskReceipt, store::AirdropStore, task::TaskStatus};

use crate::{AppState, Session, error::ApiError};

/// `GET /tasks`
pub async fn board<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
) -> Result<Json<Vec<TaskStatus>>, ApiError>
where
  S: AirdropStore + 'static,
{
  Ok(Json(state.service.task_board(&session.identity.id).await?))
}

/// `POST /tasks/{id}/complete`
pub async fn complete<S>(
  State(state): State<AppState<S>>,
  Session(session): Session,
  Path(task_id): Path<String>,
) -> Result<Json<TaskReceipt>, ApiError>
where
  S: AirdropStore + 'static,
{
  let service = state.service.clone();
  let id = session.identity.id;
  let receipt = tokio::spawn(async move { service.complete_task(&id, &task_id).await })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;
  Ok(Json(receipt))
}
