//! Handlers for `/legislations/{id}/versions` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/versions` | Oldest first |
//! | `POST` | `/versions` | Appends to the log |
//! | `POST` | `/versions/consolidate` | Body: `{"versionIds":[...],"author":"..."}` |
//! | `PUT`  | `/versions/{version_id}/current` | Also used to restore; honours `If-Match` |
//! | `POST` | `/versions/{version_id}/reviews` | Body: `{"decision":"approved","reviewer":"..."}` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::Response,
};
use bylaw_core::{
  consolidate::ConsolidateRequest,
  store::LegislationStore,
  version::{NewReview, NewVersion, Version},
};
use uuid::Uuid;

use crate::{
  envelope::{Data, JsonBody, data, if_match, tagged},
  error::ApiError,
};

/// `GET /legislations/{id}/versions`
pub async fn list<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Data<Vec<Version>>>, ApiError> {
  let versions = store.list_versions(id).await.map_err(ApiError::store)?;
  Ok(data(versions))
}

/// `POST /legislations/{id}/versions`
pub async fn create<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<NewVersion>,
) -> Result<Response, ApiError> {
  let version = store.record_version(id, body).await.map_err(ApiError::store)?;
  Ok(tagged(version.revision, (StatusCode::CREATED, data(version.value))))
}

/// `POST /legislations/{id}/versions/consolidate`
pub async fn consolidate<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<ConsolidateRequest>,
) -> Result<Response, ApiError> {
  let version = store.consolidate_versions(id, body).await.map_err(ApiError::store)?;
  Ok(tagged(version.revision, (StatusCode::CREATED, data(version.value))))
}

/// `PUT /legislations/{id}/versions/{version_id}/current`
pub async fn set_current<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, version_id)): Path<(Uuid, Uuid)>,
  headers: HeaderMap,
) -> Result<Response, ApiError> {
  let expected = if_match(&headers)?;
  let version = store
    .set_current_version(id, version_id, expected)
    .await
    .map_err(ApiError::store)?;
  Ok(tagged(version.revision, data(version.value)))
}

/// `POST /legislations/{id}/versions/{version_id}/reviews`
pub async fn review<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, version_id)): Path<(Uuid, Uuid)>,
  JsonBody(body): JsonBody<NewReview>,
) -> Result<Response, ApiError> {
  let review = store
    .review_version(id, version_id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(tagged(review.revision, (StatusCode::CREATED, data(review.value))))
}
