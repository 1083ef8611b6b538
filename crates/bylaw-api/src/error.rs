//! API error type and [`axum::response::IntoResponse`] implementation.
//!
//! Every failure is rendered as
//! `{"error": {"kind": ..., "message": ..., "conflicts": [...]?}}` with the
//! status derived from its [`ErrorKind`].

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use bylaw_core::{ErrorKind, error::DomainError};
use serde_json::json;
use thiserror::Error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  #[error("{0}")]
  Store(Box<dyn DomainError>),
}

impl ApiError {
  pub fn store<E: DomainError>(e: E) -> Self { Self::Store(Box::new(e)) }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound(_) => ErrorKind::NotFound,
      Self::BadRequest(_) => ErrorKind::Validation,
      Self::Store(e) => e.kind(),
    }
  }
}

pub fn status_for(kind: ErrorKind) -> StatusCode {
  match kind {
    ErrorKind::Validation => StatusCode::BAD_REQUEST,
    ErrorKind::Invariant => StatusCode::UNPROCESSABLE_ENTITY,
    ErrorKind::Conflict => StatusCode::CONFLICT,
    ErrorKind::NotFound => StatusCode::NOT_FOUND,
    ErrorKind::Transport => StatusCode::BAD_GATEWAY,
    ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let kind = self.kind();
    let status = status_for(kind);
    if status.is_server_error() {
      tracing::error!(error = %self, "request failed");
    }

    let mut body = json!({ "kind": kind, "message": self.to_string() });
    let conflicts = match &self {
      Self::Store(e) => e.domain().and_then(|d| d.merge_conflicts()),
      _ => None,
    };
    if let Some(conflicts) = conflicts {
      body["conflicts"] = json!(conflicts);
    }
    (status, Json(json!({ "error": body }))).into_response()
  }
}
