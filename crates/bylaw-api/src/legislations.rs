//! Handlers for `/legislations` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/legislations` | `?search=&status=&page=&limit=` |
//! | `POST` | `/legislations` | Creates the main branch alongside |
//! | `GET`  | `/legislations/{id}` | 404 if not found |
//! | `PUT`  | `/legislations/{id}/status` | Body: `{"status":"active"}`; honours `If-Match` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::Response,
};
use bylaw_core::{
  legislation::{Legislation, LegislationStatus, NewLegislation},
  store::{LegislationQuery, LegislationStore},
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  envelope::{JsonBody, Listing, QueryParams, data, if_match, tagged},
  error::ApiError,
};

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /legislations`
pub async fn list<S: LegislationStore>(
  State(store): State<Arc<S>>,
  QueryParams(query): QueryParams<LegislationQuery>,
) -> Result<Json<Listing<Legislation>>, ApiError> {
  let page = store.list_legislations(&query).await.map_err(ApiError::store)?;
  Ok(Json(page.into()))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /legislations`
pub async fn create<S: LegislationStore>(
  State(store): State<Arc<S>>,
  JsonBody(body): JsonBody<NewLegislation>,
) -> Result<Response, ApiError> {
  let legislation = store.create_legislation(body).await.map_err(ApiError::store)?;
  Ok(tagged(legislation.revision, (StatusCode::CREATED, data(legislation))))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /legislations/{id}`
pub async fn get_one<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
  let legislation = store
    .get_legislation(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("legislation {id}")))?;
  Ok(tagged(legislation.revision, data(legislation)))
}

// ─── Status ───────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct StatusBody {
  pub status: LegislationStatus,
}

/// `PUT /legislations/{id}/status`
pub async fn set_status<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  JsonBody(body): JsonBody<StatusBody>,
) -> Result<Response, ApiError> {
  let expected = if_match(&headers)?;
  let legislation = store
    .set_legislation_status(id, body.status, expected)
    .await
    .map_err(ApiError::store)?;
  Ok(tagged(legislation.revision, data(legislation)))
}
