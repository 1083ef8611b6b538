//! Handlers for `/legislations/{id}/branches` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `GET`    | `/branches` | `?status=&page=&limit=&sortBy=&sortOrder=` |
//! | `POST`   | `/branches` | Honours `Idempotency-Key` |
//! | `GET`    | `/branches/{branch_id}` | 404 if not found |
//! | `DELETE` | `/branches/{branch_id}` | 422 for main or merged branches |
//! | `POST`   | `/branches/{branch_id}/apply` | Body: `{"apply":true}`; honours `If-Match` |
//! | `POST`   | `/branches/{branch_id}/merge` | 409 with `conflicts` until resolved |
//! | `GET`    | `/branches/{branch_id}/merge-preview` | `?targetBranchId=` |
//! | `GET`    | `/branches/{branch_id}/conflicts` | Logical conflicts in the branch |
//! | `GET`    | `/branches/{branch_id}/timeline` | `?baseDate=&monthWidth=&horizon=` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::{HeaderMap, StatusCode},
  response::Response,
};
use bylaw_core::{
  branch::{Branch, NewBranch},
  conflict::{Conflict, check_conflicts},
  merge::{MergeConflict, MergeRequest, Resolution},
  store::{BranchQuery, LegislationStore},
  timeline::{DEFAULT_MONTH_WIDTH, TimelineSpan, project_timeline},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
  envelope::{Data, JsonBody, Listing, QueryParams, data, if_match, tagged},
  error::ApiError,
};

pub const IDEMPOTENCY_KEY: &str = "idempotency-key";

async fn require_branch<S: LegislationStore>(
  store: &S,
  id: Uuid,
  branch_id: Uuid,
) -> Result<Branch, ApiError> {
  store
    .get_branch(id, branch_id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("branch {branch_id}")))
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /legislations/{id}/branches`
pub async fn list<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  QueryParams(query): QueryParams<BranchQuery>,
) -> Result<Json<Listing<Branch>>, ApiError> {
  let page = store.list_branches(id, &query).await.map_err(ApiError::store)?;
  Ok(Json(page.into()))
}

// ─── Create ───────────────────────────────────────────────────────────────────

/// `POST /legislations/{id}/branches`
///
/// An `Idempotency-Key` header takes precedence over a key in the body.
pub async fn create<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  headers: HeaderMap,
  JsonBody(mut body): JsonBody<NewBranch>,
) -> Result<Response, ApiError> {
  if let Some(key) = headers.get(IDEMPOTENCY_KEY) {
    let key = key
      .to_str()
      .map_err(|_| ApiError::BadRequest("Idempotency-Key is not valid ASCII".into()))?;
    body.idempotency_key = Some(key.to_owned());
  }
  let branch = store.create_branch(id, body).await.map_err(ApiError::store)?;
  Ok(tagged(branch.revision, (StatusCode::CREATED, data(branch.value))))
}

// ─── Get / delete ─────────────────────────────────────────────────────────────

/// `GET /legislations/{id}/branches/{branch_id}`
pub async fn get_one<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Data<Branch>>, ApiError> {
  Ok(data(require_branch(&*store, id, branch_id).await?))
}

/// `DELETE /legislations/{id}/branches/{branch_id}`
pub async fn delete_one<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
) -> Result<Response, ApiError> {
  let revision = store.delete_branch(id, branch_id).await.map_err(ApiError::store)?;
  Ok(tagged(revision, StatusCode::NO_CONTENT))
}

// ─── Apply ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ApplyBody {
  pub apply: bool,
}

/// `POST /legislations/{id}/branches/{branch_id}/apply`
pub async fn apply<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
  headers: HeaderMap,
  JsonBody(body): JsonBody<ApplyBody>,
) -> Result<Response, ApiError> {
  let expected = if_match(&headers)?;
  let branch = store
    .apply_branch(id, branch_id, body.apply, expected)
    .await
    .map_err(ApiError::store)?;
  Ok(tagged(branch.revision, data(branch.value)))
}

// ─── Merge ────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeBody {
  pub target_branch_id: Uuid,
  pub merged_by:        String,
  #[serde(default)]
  pub resolutions:      Vec<Resolution>,
}

/// `POST /legislations/{id}/branches/{branch_id}/merge`
///
/// The path names the source branch.
pub async fn merge<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
  headers: HeaderMap,
  JsonBody(body): JsonBody<MergeBody>,
) -> Result<Response, ApiError> {
  let request = MergeRequest {
    source_branch_id:  branch_id,
    target_branch_id:  body.target_branch_id,
    merged_by:         body.merged_by,
    resolutions:       body.resolutions,
    expected_revision: if_match(&headers)?,
  };
  let outcome = store.merge_branch(id, request).await.map_err(ApiError::store)?;
  Ok(tagged(outcome.revision, data(outcome.value)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewParams {
  pub target_branch_id: Uuid,
}

/// `GET /legislations/{id}/branches/{branch_id}/merge-preview?targetBranchId=`
pub async fn merge_preview<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
  QueryParams(params): QueryParams<PreviewParams>,
) -> Result<Json<Data<Vec<MergeConflict>>>, ApiError> {
  let conflicts = store
    .preview_merge(id, branch_id, params.target_branch_id)
    .await
    .map_err(ApiError::store)?;
  Ok(data(conflicts))
}

// ─── Derived views ────────────────────────────────────────────────────────────

/// `GET /legislations/{id}/branches/{branch_id}/conflicts`
pub async fn conflicts<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Data<Vec<Conflict>>>, ApiError> {
  let parameters = store.list_parameters(id, branch_id).await.map_err(ApiError::store)?;
  Ok(data(check_conflicts(&parameters)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineParams {
  /// Start of the month grid. Defaults to the legislation's creation time.
  pub base_date:   Option<DateTime<Utc>>,
  pub month_width: Option<u32>,
  pub horizon:     Option<DateTime<Utc>>,
}

/// `GET /legislations/{id}/branches/{branch_id}/timeline`
pub async fn timeline<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
  QueryParams(params): QueryParams<TimelineParams>,
) -> Result<Json<Data<TimelineSpan>>, ApiError> {
  let base_date = match params.base_date {
    Some(date) => date,
    None => {
      store
        .get_legislation(id)
        .await
        .map_err(ApiError::store)?
        .ok_or_else(|| ApiError::NotFound(format!("legislation {id}")))?
        .created_at
    }
  };
  let branch = require_branch(&*store, id, branch_id).await?;
  let width = params.month_width.unwrap_or(DEFAULT_MONTH_WIDTH);
  Ok(data(project_timeline(&branch, base_date, width, params.horizon)))
}
