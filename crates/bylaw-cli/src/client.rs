//! Async HTTP client wrapping the bylaw JSON API.
//!
//! Every non-2xx response is mapped onto a typed [`ClientError`]. A request
//! that fails in flight is reported as [`ClientError::Transport`]; its outcome
//! on the server is unknown and is never assumed to have succeeded.

use std::time::Duration;

use bylaw_core::{
  ErrorKind,
  branch::{Branch, NewBranch},
  conflict::Conflict,
  consolidate::ConsolidateRequest,
  legislation::{Legislation, LegislationStatus, NewLegislation},
  merge::{MergeConflict, MergeOutcome, MergeRequest, Resolution},
  parameter::{NewParameter, Parameter},
  schedule::{GisSchedule, NewSchedule},
  store::{BranchQuery, LegislationQuery, Page, Revised},
  timeline::TimelineSpan,
  version::{NewReview, NewVersion, Version, VersionReview},
  wms::FeatureInfoRequest,
};
use chrono::{DateTime, Utc};
use reqwest::{
  Client, RequestBuilder, StatusCode,
  header::{ETAG, HeaderMap},
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

const IDEMPOTENCY_KEY: &str = "Idempotency-Key";

/// Attempts made for one logical branch create before giving up.
const CREATE_ATTEMPTS: u32 = 3;

// ─── Errors ───────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ClientError {
  #[error("invalid request: {0}")]
  Validation(String),

  #[error("rejected: {0}")]
  Invariant(String),

  #[error("conflict: {message}")]
  Conflict {
    message:   String,
    conflicts: Vec<MergeConflict>,
  },

  #[error("not found: {0}")]
  NotFound(String),

  #[error("request failed: {0}")]
  Transport(String),

  #[error("server error ({status}): {message}")]
  Server { status: u16, message: String },
}

impl ClientError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation(_) => ErrorKind::Validation,
      Self::Invariant(_) => ErrorKind::Invariant,
      Self::Conflict { .. } => ErrorKind::Conflict,
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::Transport(_) => ErrorKind::Transport,
      Self::Server { .. } => ErrorKind::Internal,
    }
  }

  fn transport(e: reqwest::Error) -> Self { Self::Transport(e.to_string()) }
}

impl From<bylaw_core::Error> for ClientError {
  fn from(e: bylaw_core::Error) -> Self {
    match e.kind() {
      ErrorKind::Invariant => Self::Invariant(e.to_string()),
      _ => Self::Validation(e.to_string()),
    }
  }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
  error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
  kind:      ErrorKind,
  message:   String,
  #[serde(default)]
  conflicts: Vec<MergeConflict>,
}

/// Map a non-2xx response onto a [`ClientError`]. The error body's `kind`
/// wins; the status code is the fallback for bodies from other sources.
pub fn classify(status: StatusCode, body: &[u8]) -> ClientError {
  if let Ok(ErrorEnvelope { error }) = serde_json::from_slice::<ErrorEnvelope>(body) {
    return match error.kind {
      ErrorKind::Validation => ClientError::Validation(error.message),
      ErrorKind::Invariant => ClientError::Invariant(error.message),
      ErrorKind::Conflict => {
        ClientError::Conflict { message: error.message, conflicts: error.conflicts }
      }
      ErrorKind::NotFound => ClientError::NotFound(error.message),
      ErrorKind::Transport => ClientError::Transport(error.message),
      ErrorKind::Internal => {
        ClientError::Server { status: status.as_u16(), message: error.message }
      }
    };
  }

  let message = String::from_utf8_lossy(body).trim().to_string();
  match status {
    StatusCode::BAD_REQUEST => ClientError::Validation(message),
    StatusCode::NOT_FOUND => ClientError::NotFound(message),
    StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => {
      ClientError::Conflict { message, conflicts: Vec::new() }
    }
    StatusCode::UNPROCESSABLE_ENTITY => ClientError::Invariant(message),
    StatusCode::BAD_GATEWAY | StatusCode::GATEWAY_TIMEOUT => ClientError::Transport(message),
    _ => ClientError::Server { status: status.as_u16(), message },
  }
}

// ─── Envelopes ────────────────────────────────────────────────────────────────

#[derive(Deserialize)]
struct Data<T> {
  data: T,
}

#[derive(Deserialize)]
struct Pagination {
  total: u64,
  page:  u32,
  limit: u32,
}

#[derive(Deserialize)]
struct Listing<T> {
  data:       Vec<T>,
  pagination: Pagination,
}

impl<T> From<Listing<T>> for Page<T> {
  fn from(l: Listing<T>) -> Self {
    Page {
      items: l.data,
      total: l.pagination.total,
      page:  l.pagination.page,
      limit: l.pagination.limit,
    }
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct TimelineParams {
  #[serde(skip_serializing_if = "Option::is_none")]
  base_date:   Option<DateTime<Utc>>,
  #[serde(skip_serializing_if = "Option::is_none")]
  month_width: Option<u32>,
  #[serde(skip_serializing_if = "Option::is_none")]
  horizon:     Option<DateTime<Utc>>,
}

/// Revision named by an `ETag: "r<revision>"` header.
fn etag_revision(headers: &HeaderMap) -> Option<u64> {
  let tag = headers.get(ETAG)?.to_str().ok()?;
  tag.trim_start_matches("W/").trim_matches('"').strip_prefix('r')?.parse().ok()
}

fn if_match(req: RequestBuilder, expected_revision: Option<u64>) -> RequestBuilder {
  match expected_revision {
    Some(rev) => req.header(reqwest::header::IF_MATCH, format!("\"r{rev}\"")),
    None => req,
  }
}

// ─── Client ───────────────────────────────────────────────────────────────────

/// Connection settings for the bylaw API.
#[derive(Debug, Clone)]
pub struct ApiConfig {
  pub base_url: String,
  /// Sent as a bearer token when non-empty.
  pub token:    String,
}

/// Async HTTP client for the bylaw JSON REST API.
///
/// Cheap to clone: the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
    let client = Client::builder().timeout(Duration::from_secs(30)).build()?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.token.is_empty() {
      req
    } else {
      req.bearer_auth(&self.config.token)
    }
  }

  /// Send `req` and return the status, headers and raw body of a
  /// successful response.
  async fn execute(
    &self,
    req: RequestBuilder,
  ) -> Result<(StatusCode, HeaderMap, Vec<u8>), ClientError> {
    let resp = self.auth(req).send().await.map_err(ClientError::transport)?;
    let status = resp.status();
    let headers = resp.headers().clone();
    let body = resp.bytes().await.map_err(ClientError::transport)?;
    if !status.is_success() {
      let err = classify(status, &body);
      tracing::debug!(%status, error = %err, "request rejected");
      return Err(err);
    }
    Ok((status, headers, body.to_vec()))
  }

  async fn decode_tagged<T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
  ) -> Result<(T, Option<u64>), ClientError> {
    let (status, headers, body) = self.execute(req).await?;
    let value = serde_json::from_slice(&body).map_err(|e| ClientError::Server {
      status:  status.as_u16(),
      message: format!("unexpected response body: {e}"),
    })?;
    Ok((value, etag_revision(&headers)))
  }

  async fn decode<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
    self.decode_tagged(req).await.map(|(value, _)| value)
  }

  async fn data<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T, ClientError> {
    self.decode::<Data<T>>(req).await.map(|d| d.data)
  }

  /// Like [`ApiClient::data`], paired with the revision the response's
  /// `ETag` names.
  async fn revised<T: DeserializeOwned>(
    &self,
    req: RequestBuilder,
  ) -> Result<Revised<T>, ClientError> {
    let (Data { data }, revision) = self.decode_tagged::<Data<T>>(req).await?;
    let revision = revision.ok_or_else(|| ClientError::Server {
      status:  StatusCode::OK.as_u16(),
      message: "response carried no revision ETag".into(),
    })?;
    Ok(Revised::new(data, revision))
  }

  async fn page<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<Page<T>, ClientError> {
    self.decode::<Listing<T>>(req).await.map(Page::from)
  }

  // ── Legislation ───────────────────────────────────────────────────────────

  /// `GET /api/legislations`
  pub async fn list_legislations(
    &self,
    query: &LegislationQuery,
  ) -> Result<Page<Legislation>, ClientError> {
    self.page(self.client.get(self.url("/legislations")).query(query)).await
  }

  /// `GET /api/legislations/{id}`
  pub async fn get_legislation(&self, id: Uuid) -> Result<Legislation, ClientError> {
    self.data(self.client.get(self.url(&format!("/legislations/{id}")))).await
  }

  /// `POST /api/legislations`
  pub async fn create_legislation(
    &self,
    input: &NewLegislation,
  ) -> Result<Legislation, ClientError> {
    self.data(self.client.post(self.url("/legislations")).json(input)).await
  }

  /// `PUT /api/legislations/{id}/status`
  pub async fn set_legislation_status(
    &self,
    id: Uuid,
    status: LegislationStatus,
    expected_revision: Option<u64>,
  ) -> Result<Legislation, ClientError> {
    let req = self
      .client
      .put(self.url(&format!("/legislations/{id}/status")))
      .json(&json!({ "status": status }));
    self.data(if_match(req, expected_revision)).await
  }

  // ── Branches ──────────────────────────────────────────────────────────────

  /// `GET /api/legislations/{id}/branches`
  pub async fn list_branches(
    &self,
    id: Uuid,
    query: &BranchQuery,
  ) -> Result<Page<Branch>, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches"));
    self.page(self.client.get(url).query(query)).await
  }

  /// `POST /api/legislations/{id}/branches`
  ///
  /// One idempotency key covers every attempt, so a retry after a lost
  /// response returns the branch the first attempt created.
  pub async fn create_branch(&self, id: Uuid, mut input: NewBranch) -> Result<Branch, ClientError> {
    let key = input
      .idempotency_key
      .take()
      .unwrap_or_else(|| Uuid::new_v4().to_string());
    let url = self.url(&format!("/legislations/{id}/branches"));

    let mut attempt = 1;
    loop {
      let req = self.client.post(&url).header(IDEMPOTENCY_KEY, &key).json(&input);
      match self.data(req).await {
        Err(ClientError::Transport(reason)) if attempt < CREATE_ATTEMPTS => {
          tracing::warn!(attempt, %reason, "branch create failed in flight; retrying");
          attempt += 1;
        }
        other => return other,
      }
    }
  }

  /// `GET /api/legislations/{id}/branches/{branch_id}`
  pub async fn get_branch(&self, id: Uuid, branch_id: Uuid) -> Result<Branch, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}"));
    self.data(self.client.get(url)).await
  }

  /// `DELETE /api/legislations/{id}/branches/{branch_id}`
  pub async fn delete_branch(&self, id: Uuid, branch_id: Uuid) -> Result<(), ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}"));
    self.execute(self.client.delete(url)).await.map(|_| ())
  }

  /// `POST /api/legislations/{id}/branches/{branch_id}/apply`
  ///
  /// Returns the branch with the revision the write committed.
  pub async fn apply_branch(
    &self,
    id: Uuid,
    branch_id: Uuid,
    apply: bool,
    expected_revision: Option<u64>,
  ) -> Result<Revised<Branch>, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}/apply"));
    let req = self.client.post(url).json(&json!({ "apply": apply }));
    self.revised(if_match(req, expected_revision)).await
  }

  /// `GET /api/legislations/{id}/branches/{branch_id}/merge-preview`
  pub async fn preview_merge(
    &self,
    id: Uuid,
    source: Uuid,
    target: Uuid,
  ) -> Result<Vec<MergeConflict>, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{source}/merge-preview"));
    self
      .data(self.client.get(url).query(&[("targetBranchId", target)]))
      .await
  }

  /// `POST /api/legislations/{id}/branches/{source}/merge`
  pub async fn merge_branch(
    &self,
    id: Uuid,
    request: &MergeRequest,
  ) -> Result<MergeOutcome, ClientError> {
    let source = request.source_branch_id;
    let url = self.url(&format!("/legislations/{id}/branches/{source}/merge"));
    let body = MergeBody {
      target_branch_id: request.target_branch_id,
      merged_by:        &request.merged_by,
      resolutions:      &request.resolutions,
    };
    let req = self.client.post(url).json(&body);
    self.data(if_match(req, request.expected_revision)).await
  }

  /// `GET /api/legislations/{id}/branches/{branch_id}/conflicts`
  pub async fn conflicts(&self, id: Uuid, branch_id: Uuid) -> Result<Vec<Conflict>, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}/conflicts"));
    self.data(self.client.get(url)).await
  }

  /// `GET /api/legislations/{id}/branches/{branch_id}/timeline`
  pub async fn timeline(
    &self,
    id: Uuid,
    branch_id: Uuid,
    base_date: Option<DateTime<Utc>>,
    month_width: Option<u32>,
    horizon: Option<DateTime<Utc>>,
  ) -> Result<TimelineSpan, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}/timeline"));
    let params = TimelineParams { base_date, month_width, horizon };
    self.data(self.client.get(url).query(&params)).await
  }

  // ── Parameters ────────────────────────────────────────────────────────────

  pub async fn list_parameters(
    &self,
    id: Uuid,
    branch_id: Uuid,
  ) -> Result<Vec<Parameter>, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}/parameters"));
    self.data(self.client.get(url)).await
  }

  pub async fn add_parameter(
    &self,
    id: Uuid,
    branch_id: Uuid,
    input: &NewParameter,
  ) -> Result<Parameter, ClientError> {
    let url = self.url(&format!("/legislations/{id}/branches/{branch_id}/parameters"));
    self.data(self.client.post(url).json(input)).await
  }

  pub async fn remove_parameter(
    &self,
    id: Uuid,
    branch_id: Uuid,
    parameter_id: Uuid,
  ) -> Result<(), ClientError> {
    let url = self.url(&format!(
      "/legislations/{id}/branches/{branch_id}/parameters/{parameter_id}"
    ));
    self.execute(self.client.delete(url)).await.map(|_| ())
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  pub async fn list_versions(&self, id: Uuid) -> Result<Vec<Version>, ClientError> {
    self.data(self.client.get(self.url(&format!("/legislations/{id}/versions")))).await
  }

  pub async fn record_version(&self, id: Uuid, input: &NewVersion) -> Result<Version, ClientError> {
    let url = self.url(&format!("/legislations/{id}/versions"));
    self.data(self.client.post(url).json(input)).await
  }

  /// `PUT /api/legislations/{id}/versions/{version_id}/current`
  pub async fn set_current_version(
    &self,
    id: Uuid,
    version_id: Uuid,
    expected_revision: Option<u64>,
  ) -> Result<Version, ClientError> {
    let url = self.url(&format!("/legislations/{id}/versions/{version_id}/current"));
    self.data(if_match(self.client.put(url), expected_revision)).await
  }

  pub async fn review_version(
    &self,
    id: Uuid,
    version_id: Uuid,
    review: &NewReview,
  ) -> Result<VersionReview, ClientError> {
    let url = self.url(&format!("/legislations/{id}/versions/{version_id}/reviews"));
    self.data(self.client.post(url).json(review)).await
  }

  pub async fn consolidate_versions(
    &self,
    id: Uuid,
    request: &ConsolidateRequest,
  ) -> Result<Version, ClientError> {
    let url = self.url(&format!("/legislations/{id}/versions/consolidate"));
    self.data(self.client.post(url).json(request)).await
  }

  // ── Schedules ─────────────────────────────────────────────────────────────

  pub async fn list_schedules(&self, id: Uuid) -> Result<Vec<GisSchedule>, ClientError> {
    self.data(self.client.get(self.url(&format!("/legislations/{id}/schedules")))).await
  }

  pub async fn add_schedule(&self, id: Uuid, input: &NewSchedule) -> Result<GisSchedule, ClientError> {
    let url = self.url(&format!("/legislations/{id}/schedules"));
    self.data(self.client.post(url).json(input)).await
  }

  // ── WMS ───────────────────────────────────────────────────────────────────

  /// Issue a WMS `GetFeatureInfo` request against an external map server.
  /// The bylaw API token is not forwarded.
  pub async fn identify(
    &self,
    wms_url: &str,
    request: &FeatureInfoRequest,
  ) -> Result<serde_json::Value, ClientError> {
    let pairs = request.query_pairs()?;
    let resp = self
      .client
      .get(wms_url)
      .query(&pairs)
      .send()
      .await
      .map_err(ClientError::transport)?;
    let status = resp.status();
    let body = resp.bytes().await.map_err(ClientError::transport)?;
    if !status.is_success() {
      return Err(classify(status, &body));
    }
    serde_json::from_slice(&body).map_err(|e| ClientError::Server {
      status:  status.as_u16(),
      message: format!("GetFeatureInfo did not return JSON: {e}"),
    })
  }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MergeBody<'a> {
  target_branch_id: Uuid,
  merged_by:        &'a str,
  resolutions:      &'a [Resolution],
}

#[cfg(test)]
mod tests {
  use std::sync::Arc;

  use bylaw_core::{legislation::LegislationType, parameter::{Operator, RuleType}};
  use bylaw_store_sqlite::SqliteStore;
  use chrono::NaiveDate;

  use super::*;

  #[test]
  fn error_body_kind_wins_over_status() {
    let body = br#"{"error":{"kind":"invariant","message":"main branch"}}"#;
    let err = classify(StatusCode::BAD_REQUEST, body);
    assert_eq!(err.kind(), ErrorKind::Invariant);
  }

  #[test]
  fn conflict_body_carries_conflicts() {
    let body = json!({
      "error": {
        "kind": "conflict",
        "message": "merge blocked",
        "conflicts": [{
          "ruleType": "max_height",
          "landUse": "residential",
          "sourceValues": ["30 m"],
          "targetValues": ["25 m"],
        }],
      }
    });
    let err = classify(StatusCode::CONFLICT, body.to_string().as_bytes());
    match err {
      ClientError::Conflict { conflicts, .. } => {
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].rule_type, RuleType::MaxHeight);
      }
      other => panic!("expected conflict, got {other:?}"),
    }
  }

  #[test]
  fn etag_names_a_revision() {
    let mut headers = HeaderMap::new();
    assert_eq!(etag_revision(&headers), None);
    headers.insert(ETAG, "\"r12\"".parse().unwrap());
    assert_eq!(etag_revision(&headers), Some(12));
    headers.insert(ETAG, "W/\"r3\"".parse().unwrap());
    assert_eq!(etag_revision(&headers), Some(3));
    headers.insert(ETAG, "\"abc\"".parse().unwrap());
    assert_eq!(etag_revision(&headers), None);
  }

  #[test]
  fn foreign_bodies_fall_back_to_status() {
    assert_eq!(classify(StatusCode::NOT_FOUND, b"nope").kind(), ErrorKind::NotFound);
    assert_eq!(
      classify(StatusCode::UNPROCESSABLE_ENTITY, b"").kind(),
      ErrorKind::Invariant
    );
    assert_eq!(
      classify(StatusCode::SERVICE_UNAVAILABLE, b"down").kind(),
      ErrorKind::Internal
    );
  }

  async fn serve() -> ApiClient {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
      axum::serve(listener, bylaw_server::app(store)).await.unwrap();
    });
    ApiClient::new(ApiConfig { base_url: format!("http://{addr}"), token: String::new() })
      .unwrap()
  }

  fn bylaw() -> NewLegislation {
    NewLegislation {
      title:            "Zoning By-law".into(),
      jurisdiction:     "Toronto".into(),
      legislation_type: LegislationType::ZoningBylaw,
      effective_from:   NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      effective_to:     None,
    }
  }

  #[tokio::test]
  async fn round_trip_against_a_live_server() {
    let client = serve().await;
    let l = client.create_legislation(&bylaw()).await.unwrap();
    let id = l.legislation_id;

    let mut input = NewBranch::new("heights");
    input.idempotency_key = Some("fixed-key".into());
    let first = client.create_branch(id, input.clone()).await.unwrap();
    let again = client.create_branch(id, input).await.unwrap();
    assert_eq!(first.branch_id, again.branch_id);

    let page = client.list_branches(id, &BranchQuery::default()).await.unwrap();
    assert_eq!(page.total, 2);

    client
      .add_parameter(id, first.branch_id, &NewParameter::new(RuleType::Setback, Operator::GreaterEqual, "3"))
      .await
      .unwrap();
    assert_eq!(client.list_parameters(id, first.branch_id).await.unwrap().len(), 1);

    let err = client
      .apply_branch(id, first.branch_id, true, Some(l.revision))
      .await
      .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let fresh = client.get_legislation(id).await.unwrap();
    let applied = client
      .apply_branch(id, first.branch_id, true, Some(fresh.revision))
      .await
      .unwrap();
    assert!(applied.is_applied());
    assert_eq!(applied.revision, fresh.revision + 1);
    assert!(client.get_branch(id, first.branch_id).await.unwrap().is_applied());
  }

  #[tokio::test]
  async fn unreachable_server_is_a_transport_error() {
    let client = ApiClient::new(ApiConfig {
      base_url: "http://127.0.0.1:9".into(),
      token:    String::new(),
    })
    .unwrap();
    let err = client.get_legislation(Uuid::nil()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transport);
  }
}
