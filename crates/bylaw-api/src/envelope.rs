//! Response envelopes, revision tags, and extractors that report rejections
//! in the API's own error format.

use axum::{
  Json,
  extract::{FromRequest, FromRequestParts, Query, Request, rejection::JsonRejection},
  http::{HeaderMap, HeaderValue, header, request::Parts},
  response::{IntoResponse, Response},
};
use bylaw_core::store::Page;
use serde::{Serialize, de::DeserializeOwned};

use crate::error::ApiError;

// ─── Envelopes ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Data<T> {
  pub data: T,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
  pub total: u64,
  pub page:  u32,
  pub limit: u32,
}

#[derive(Debug, Serialize)]
pub struct Listing<T> {
  pub data:       Vec<T>,
  pub pagination: Pagination,
}

impl<T> From<Page<T>> for Listing<T> {
  fn from(page: Page<T>) -> Self {
    Self {
      data:       page.items,
      pagination: Pagination { total: page.total, page: page.page, limit: page.limit },
    }
  }
}

pub fn data<T>(data: T) -> Json<Data<T>> { Json(Data { data }) }

// ─── Revision tags ────────────────────────────────────────────────────────────

/// The entity tag of a legislation at `revision`, e.g. `"r7"`.
pub fn etag(revision: u64) -> String { format!("\"r{revision}\"") }

/// Strip surrounding double-quotes (and a weak `W/` prefix) from an ETag.
fn strip_etag_quotes(s: &str) -> &str {
  let s = s.trim();
  let s = s.strip_prefix("W/").unwrap_or(s);
  s.strip_prefix('"').and_then(|s| s.strip_suffix('"')).unwrap_or(s)
}

/// The revision named by an `If-Match` header, if one was sent. Accepts
/// `"r7"`, `r7` and a bare `7`.
pub fn if_match(headers: &HeaderMap) -> Result<Option<u64>, ApiError> {
  let Some(value) = headers.get(header::IF_MATCH) else {
    return Ok(None);
  };
  let raw = value
    .to_str()
    .map_err(|_| ApiError::BadRequest("If-Match is not valid ASCII".into()))?;
  let tag = strip_etag_quotes(raw);
  let digits = tag.strip_prefix('r').unwrap_or(tag);
  digits
    .parse()
    .map(Some)
    .map_err(|_| ApiError::BadRequest(format!("unrecognised If-Match tag: {raw}")))
}

/// Attach the aggregate's revision tag to a response.
pub fn tagged(revision: u64, response: impl IntoResponse) -> Response {
  let mut res = response.into_response();
  if let Ok(value) = HeaderValue::from_str(&etag(revision)) {
    res.headers_mut().insert(header::ETAG, value);
  }
  res
}

// ─── Extractors ───────────────────────────────────────────────────────────────

/// [`Json`] whose rejection is a `Validation` error body.
pub struct JsonBody<T>(pub T);

impl<T, S> FromRequest<S> for JsonBody<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
    let Json(value) = Json::<T>::from_request(req, state)
      .await
      .map_err(|e: JsonRejection| ApiError::BadRequest(e.body_text()))?;
    Ok(Self(value))
  }
}

/// [`Query`] whose rejection is a `Validation` error body.
pub struct QueryParams<T>(pub T);

impl<T, S> FromRequestParts<S> for QueryParams<T>
where
  T: DeserializeOwned,
  S: Send + Sync,
{
  type Rejection = ApiError;

  async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
    let Query(value) = Query::<T>::from_request_parts(parts, state)
      .await
      .map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Self(value))
  }
}
