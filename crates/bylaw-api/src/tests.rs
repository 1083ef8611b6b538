use std::sync::Arc;

use axum::{
  Router,
  body::Body,
  http::{HeaderMap, Request, StatusCode, header},
};
use bylaw_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use tower::ServiceExt as _;

use crate::api_router;

async fn app() -> Router {
  let store = SqliteStore::open_in_memory().await.unwrap();
  api_router(Arc::new(store))
}

async fn send(
  app: &Router,
  method: &str,
  uri: &str,
  headers: Vec<(&str, &str)>,
  body: Option<Value>,
) -> (StatusCode, HeaderMap, Value) {
  let mut builder = Request::builder().method(method).uri(uri);
  for (k, v) in headers {
    builder = builder.header(k, v);
  }
  let req = match body {
    Some(json) => builder
      .header(header::CONTENT_TYPE, "application/json")
      .body(Body::from(json.to_string()))
      .unwrap(),
    None => builder.body(Body::empty()).unwrap(),
  };
  let res = app.clone().oneshot(req).await.unwrap();
  let status = res.status();
  let headers = res.headers().clone();
  let bytes = axum::body::to_bytes(res.into_body(), 1 << 20).await.unwrap();
  let value = if bytes.is_empty() {
    Value::Null
  } else {
    serde_json::from_slice(&bytes).unwrap()
  };
  (status, headers, value)
}

async fn create_legislation(app: &Router) -> String {
  let (status, _, body) = send(
    app,
    "POST",
    "/legislations",
    vec![],
    Some(json!({
      "title": "Zoning By-law 2024-01",
      "jurisdiction": "Toronto",
      "legislationType": "zoning_bylaw",
      "effectiveFrom": "2024-01-01",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  body["data"]["legislationId"].as_str().unwrap().to_owned()
}

async fn main_branch_id(app: &Router, lid: &str) -> String {
  let (_, _, body) = send(app, "GET", &format!("/legislations/{lid}/branches"), vec![], None).await;
  body["data"]
    .as_array()
    .unwrap()
    .iter()
    .find(|b| b["isMain"] == json!(true))
    .unwrap()["branchId"]
    .as_str()
    .unwrap()
    .to_owned()
}

async fn create_branch(app: &Router, lid: &str, name: &str) -> String {
  let (status, _, body) = send(
    app,
    "POST",
    &format!("/legislations/{lid}/branches"),
    vec![],
    Some(json!({ "name": name })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  body["data"]["branchId"].as_str().unwrap().to_owned()
}

async fn add_parameter(app: &Router, lid: &str, bid: &str, rule: &str, value: &str) {
  let (status, ..) = send(
    app,
    "POST",
    &format!("/legislations/{lid}/branches/{bid}/parameters"),
    vec![],
    Some(json!({
      "ruleType": rule,
      "operator": "less_equal",
      "landUse": "residential",
      "value": value,
      "unit": "m",
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
}

fn etag(headers: &HeaderMap) -> String {
  headers[header::ETAG].to_str().unwrap().to_owned()
}

// ── Legislation ─────────────────────────────────────────────────────────────

#[tokio::test]
async fn create_and_fetch_legislation_with_etag() {
  let app = app().await;
  let lid = create_legislation(&app).await;

  let (status, headers, body) =
    send(&app, "GET", &format!("/legislations/{lid}"), vec![], None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "draft");
  let tag = etag(&headers);
  assert!(tag.starts_with("\"r") && tag.ends_with('"'));
}

#[tokio::test]
async fn missing_legislation_is_404_with_error_body() {
  let app = app().await;
  let (status, _, body) = send(
    &app,
    "GET",
    "/legislations/00000000-0000-0000-0000-000000000000",
    vec![],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NOT_FOUND);
  assert_eq!(body["error"]["kind"], "not_found");
}

#[tokio::test]
async fn malformed_body_is_a_validation_error() {
  let app = app().await;
  let (status, _, body) =
    send(&app, "POST", "/legislations", vec![], Some(json!({ "title": "x" }))).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["kind"], "validation");
}

#[tokio::test]
async fn illegal_status_transition_is_422() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let uri = format!("/legislations/{lid}/status");

  let (status, ..) = send(&app, "PUT", &uri, vec![], Some(json!({ "status": "cancelled" }))).await;
  assert_eq!(status, StatusCode::OK);
  let (status, _, body) =
    send(&app, "PUT", &uri, vec![], Some(json!({ "status": "active" }))).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["error"]["kind"], "invariant");
}

#[tokio::test]
async fn legislation_listing_is_paginated() {
  let app = app().await;
  create_legislation(&app).await;
  create_legislation(&app).await;

  let (status, _, body) = send(&app, "GET", "/legislations?limit=1", vec![], None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"].as_array().unwrap().len(), 1);
  assert_eq!(body["pagination"]["total"], 2);
  assert_eq!(body["pagination"]["limit"], 1);

  let (status, _, body) = send(&app, "GET", "/legislations?limit=500", vec![], None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["kind"], "validation");
}

// ── Branches ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn new_legislation_lists_its_main_branch() {
  let app = app().await;
  let lid = create_legislation(&app).await;

  let (status, _, body) =
    send(&app, "GET", &format!("/legislations/{lid}/branches"), vec![], None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["pagination"]["total"], 1);
  let main = &body["data"][0];
  assert_eq!(main["isMain"], true);
  assert_eq!(main["status"], "active");
}

#[tokio::test]
async fn idempotency_key_replays_the_first_create() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let uri = format!("/legislations/{lid}/branches");
  let body = json!({ "name": "height-review" });

  let (s1, _, first) =
    send(&app, "POST", &uri, vec![("Idempotency-Key", "abc")], Some(body.clone())).await;
  let (s2, _, second) =
    send(&app, "POST", &uri, vec![("Idempotency-Key", "abc")], Some(body.clone())).await;
  assert_eq!(s1, StatusCode::CREATED);
  assert_eq!(s2, StatusCode::CREATED);
  assert_eq!(first["data"]["branchId"], second["data"]["branchId"]);

  // Without a key the duplicate name is rejected.
  let (s3, _, err) = send(&app, "POST", &uri, vec![], Some(body)).await;
  assert_eq!(s3, StatusCode::BAD_REQUEST);
  assert_eq!(err["error"]["kind"], "validation");
}

#[tokio::test]
async fn main_branch_cannot_be_deleted() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let main = main_branch_id(&app, &lid).await;

  let (status, _, body) =
    send(&app, "DELETE", &format!("/legislations/{lid}/branches/{main}"), vec![], None).await;
  assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
  assert_eq!(body["error"]["kind"], "invariant");
}

#[tokio::test]
async fn delete_branch_returns_204_then_404() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let bid = create_branch(&app, &lid, "scratch").await;
  let uri = format!("/legislations/{lid}/branches/{bid}");

  let (status, headers, _) = send(&app, "DELETE", &uri, vec![], None).await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  assert!(headers.contains_key(header::ETAG));

  let (status, ..) = send(&app, "GET", &uri, vec![], None).await;
  assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn apply_with_stale_if_match_is_409() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let bid = create_branch(&app, &lid, "b").await;
  let uri = format!("/legislations/{lid}/branches/{bid}/apply");

  let (status, headers, body) =
    send(&app, "POST", &uri, vec![], Some(json!({ "apply": true }))).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["metadata"]["isApplied"], true);
  let fresh = etag(&headers);

  // A tag from before the last write.
  let (status, _, body) = send(
    &app,
    "POST",
    &uri,
    vec![("If-Match", "r1")],
    Some(json!({ "apply": false })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["kind"], "conflict");

  let (status, ..) = send(
    &app,
    "POST",
    &uri,
    vec![("If-Match", fresh.as_str())],
    Some(json!({ "apply": false })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn write_etags_name_the_revision_each_write_committed() {
  let app = app().await;
  let lid = create_legislation(&app).await;

  let (status, headers, body) = send(
    &app,
    "POST",
    &format!("/legislations/{lid}/branches"),
    vec![],
    Some(json!({ "name": "b" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(etag(&headers), "\"r1\"");
  let bid = body["data"]["branchId"].as_str().unwrap().to_owned();

  let apply = format!("/legislations/{lid}/branches/{bid}/apply");
  let (_, headers, _) = send(&app, "POST", &apply, vec![], Some(json!({ "apply": true }))).await;
  let seen = etag(&headers);
  assert_eq!(seen, "\"r2\"");

  // Another writer lands after the apply.
  let (_, headers, _) = send(
    &app,
    "POST",
    &format!("/legislations/{lid}/branches/{bid}/parameters"),
    vec![],
    Some(json!({ "ruleType": "setback", "operator": "greater_equal", "value": "3" })),
  )
  .await;
  assert_eq!(etag(&headers), "\"r3\"");

  let (status, _, body) = send(
    &app,
    "POST",
    &apply,
    vec![("If-Match", seen.as_str())],
    Some(json!({ "apply": false })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  assert_eq!(body["error"]["kind"], "conflict");

  let (status, headers, _) = send(
    &app,
    "DELETE",
    &format!("/legislations/{lid}/branches/{bid}"),
    vec![],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::NO_CONTENT);
  assert_eq!(etag(&headers), "\"r4\"");
}

#[tokio::test]
async fn conflicting_merge_reports_conflicts_then_succeeds() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let main = main_branch_id(&app, &lid).await;
  let bid = create_branch(&app, &lid, "taller").await;
  add_parameter(&app, &lid, &main, "max_height", "25").await;
  add_parameter(&app, &lid, &bid, "max_height", "30").await;

  let (status, _, preview) = send(
    &app,
    "GET",
    &format!("/legislations/{lid}/branches/{bid}/merge-preview?targetBranchId={main}"),
    vec![],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(preview["data"].as_array().unwrap().len(), 1);

  let uri = format!("/legislations/{lid}/branches/{bid}/merge");
  let (status, _, body) = send(
    &app,
    "POST",
    &uri,
    vec![],
    Some(json!({ "targetBranchId": main, "mergedBy": "planner" })),
  )
  .await;
  assert_eq!(status, StatusCode::CONFLICT);
  let conflicts = body["error"]["conflicts"].as_array().unwrap();
  assert_eq!(conflicts.len(), 1);
  assert_eq!(conflicts[0]["ruleType"], "max_height");

  let (status, _, body) = send(
    &app,
    "POST",
    &uri,
    vec![],
    Some(json!({
      "targetBranchId": main,
      "mergedBy": "planner",
      "resolutions": [{ "ruleType": "max_height", "landUse": "residential", "take": "source" }],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["source"]["status"], "merged");
  assert_eq!(body["data"]["source"]["mergedIntoBranchId"], json!(main));

  let (_, _, params) = send(
    &app,
    "GET",
    &format!("/legislations/{lid}/branches/{main}/parameters"),
    vec![],
    None,
  )
  .await;
  assert_eq!(params["data"][0]["value"], "30");
}

#[tokio::test]
async fn branch_conflicts_endpoint_runs_the_checker() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let bid = create_branch(&app, &lid, "contradictory").await;
  add_parameter(&app, &lid, &bid, "max_height", "20").await;
  add_parameter(&app, &lid, &bid, "min_height", "30").await;

  let (status, _, body) = send(
    &app,
    "GET",
    &format!("/legislations/{lid}/branches/{bid}/conflicts"),
    vec![],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let conflicts = body["data"].as_array().unwrap();
  assert_eq!(conflicts.len(), 1);
  assert_eq!(conflicts[0]["variable"], "height");
}

#[tokio::test]
async fn timeline_uses_the_supplied_grid() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let bid = create_branch(&app, &lid, "b").await;

  let (status, _, body) = send(
    &app,
    "GET",
    &format!("/legislations/{lid}/branches/{bid}/timeline?baseDate=2000-01-01T00:00:00Z&monthWidth=10"),
    vec![],
    None,
  )
  .await;
  assert_eq!(status, StatusCode::OK);
  let span = &body["data"];
  let start = span["startMonth"].as_i64().unwrap();
  assert!(start > 0);
  assert_eq!(span["offsetUnits"].as_i64().unwrap(), start * 10);
}

// ── Versions ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn first_published_version_becomes_current_but_draft_does_not() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let uri = format!("/legislations/{lid}/versions");

  let (status, _, published) = send(
    &app,
    "POST",
    &uri,
    vec![],
    Some(json!({ "label": "v1", "author": "clerk", "stage": "published" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(published["data"]["status"], "current");
  let vid = published["data"]["versionId"].as_str().unwrap().to_owned();

  let (_, _, draft) = send(
    &app,
    "POST",
    &uri,
    vec![],
    Some(json!({ "label": "v2", "author": "clerk" })),
  )
  .await;
  let draft_id = draft["data"]["versionId"].as_str().unwrap().to_owned();

  let (status, _, body) =
    send(&app, "PUT", &format!("{uri}/{vid}/current"), vec![], None).await;
  assert_eq!(status, StatusCode::OK);
  assert_eq!(body["data"]["status"], "current");

  let (status, ..) =
    send(&app, "PUT", &format!("{uri}/{draft_id}/current"), vec![], None).await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (_, _, listed) = send(&app, "GET", &uri, vec![], None).await;
  let statuses: Vec<&str> = listed["data"]
    .as_array()
    .unwrap()
    .iter()
    .map(|v| v["status"].as_str().unwrap())
    .collect();
  assert_eq!(statuses, vec!["current", "draft"]);
}

#[tokio::test]
async fn reviews_and_consolidation() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let uri = format!("/legislations/{lid}/versions");

  let mut ids = Vec::new();
  for (label, date, text) in [
    ("v0", "2023-06-01T00:00:00Z", "20 m"),
    ("v1", "2024-01-01T00:00:00Z", "25 m"),
    ("v2", "2024-03-01T00:00:00Z", "30 m"),
  ] {
    let (_, _, body) = send(
      &app,
      "POST",
      &uri,
      vec![],
      Some(json!({
        "label": label,
        "author": "clerk",
        "date": date,
        "stage": "published",
        "amendmentValue": { "height": text },
      })),
    )
    .await;
    ids.push(body["data"]["versionId"].as_str().unwrap().to_owned());
  }

  let (status, _, review) = send(
    &app,
    "POST",
    &format!("{uri}/{}/reviews", ids[1]),
    vec![],
    Some(json!({ "decision": "approved", "reviewer": "council" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  assert_eq!(review["data"]["decision"], "approved");

  let (status, _, merged) = send(
    &app,
    "POST",
    &format!("{uri}/consolidate"),
    vec![],
    Some(json!({ "versionIds": [ids[2], ids[1]], "author": "clerk" })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED);
  let version = &merged["data"];
  assert_eq!(version["status"], "draft");
  assert_eq!(version["amendmentValue"]["height"], "30 m");
  assert_eq!(version["consolidatedFrom"], json!([ids[1], ids[2]]));

  // v0 became current when it was published and is not selectable.
  let (status, ..) = send(
    &app,
    "POST",
    &format!("{uri}/consolidate"),
    vec![],
    Some(json!({ "versionIds": [ids[0], ids[1]], "author": "clerk" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);

  let (status, _, body) = send(
    &app,
    "POST",
    &format!("{uri}/consolidate"),
    vec![],
    Some(json!({ "versionIds": [ids[1]], "author": "clerk" })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
  assert_eq!(body["error"]["kind"], "validation");
}

// ── Schedules ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn schedules_round_trip_polygons() {
  let app = app().await;
  let lid = create_legislation(&app).await;
  let uri = format!("/legislations/{lid}/schedules");

  let (status, _, body) = send(
    &app,
    "POST",
    &uri,
    vec![],
    Some(json!({
      "name": "Height overlay",
      "scheduleType": "zoning_map",
      "polygons": [{
        "type": "Polygon",
        "coordinates": [[[-79.4, 43.6], [-79.3, 43.6], [-79.3, 43.7], [-79.4, 43.6]]],
      }],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::CREATED, "{body}");

  let (_, _, listed) = send(&app, "GET", &uri, vec![], None).await;
  assert_eq!(listed["data"].as_array().unwrap().len(), 1);
  assert_eq!(listed["data"][0]["polygons"][0]["type"], "Polygon");

  let (status, ..) = send(
    &app,
    "POST",
    &uri,
    vec![],
    Some(json!({
      "name": "Broken",
      "scheduleType": "zoning_map",
      "polygons": [{ "type": "Polygon", "coordinates": [[[0.0, 0.0], [1.0, 1.0]]] }],
    })),
  )
  .await;
  assert_eq!(status, StatusCode::BAD_REQUEST);
}
