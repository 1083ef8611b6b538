//! Handlers for `/legislations/{id}/schedules`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, State},
  http::StatusCode,
  response::Response,
};
use bylaw_core::{
  schedule::{GisSchedule, NewSchedule},
  store::LegislationStore,
};
use uuid::Uuid;

use crate::{
  envelope::{Data, JsonBody, data, tagged},
  error::ApiError,
};

/// `GET /legislations/{id}/schedules`
pub async fn list<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
) -> Result<Json<Data<Vec<GisSchedule>>>, ApiError> {
  let schedules = store.list_schedules(id).await.map_err(ApiError::store)?;
  Ok(data(schedules))
}

/// `POST /legislations/{id}/schedules`
pub async fn create<S: LegislationStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Uuid>,
  JsonBody(body): JsonBody<NewSchedule>,
) -> Result<Response, ApiError> {
  let schedule = store.add_schedule(id, body).await.map_err(ApiError::store)?;
  Ok(tagged(schedule.revision, (StatusCode::CREATED, data(schedule.value))))
}
