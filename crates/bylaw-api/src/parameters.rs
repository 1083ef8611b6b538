//! Handlers for `/legislations/{id}/branches/{branch_id}/parameters`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::Response,
};
use bylaw_core::{
  parameter::{NewParameter, Parameter},
  store::LegislationStore,
};
use uuid::Uuid;

use crate::{
  envelope::{Data, JsonBody, data, tagged},
  error::ApiError,
};

/// `GET .../parameters`, oldest first.
pub async fn list<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<Data<Vec<Parameter>>>, ApiError> {
  let parameters = store.list_parameters(id, branch_id).await.map_err(ApiError::store)?;
  Ok(data(parameters))
}

/// `POST .../parameters`
pub async fn create<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id)): Path<(Uuid, Uuid)>,
  JsonBody(body): JsonBody<NewParameter>,
) -> Result<Response, ApiError> {
  let parameter = store
    .add_parameter(id, branch_id, body)
    .await
    .map_err(ApiError::store)?;
  Ok(tagged(parameter.revision, (StatusCode::CREATED, data(parameter.value))))
}

/// `DELETE .../parameters/{parameter_id}`
pub async fn delete_one<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path((id, branch_id, parameter_id)): Path<(Uuid, Uuid, Uuid)>,
) -> Result<Response, ApiError> {
  let revision = store
    .remove_parameter(id, branch_id, parameter_id)
    .await
    .map_err(ApiError::store)?;
  Ok(tagged(revision, StatusCode::NO_CONTENT))
}
