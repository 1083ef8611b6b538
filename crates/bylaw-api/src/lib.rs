//! JSON REST API for Bylaw.
//!
//! Exposes an axum [`Router`] backed by any
//! [`bylaw_core::store::LegislationStore`]. Auth, TLS, and transport concerns
//! are the caller's responsibility.
//!
//! Single entities are wrapped as `{"data": ...}`, listings as
//! `{"data": [...], "pagination": {...}}`. Responses that touch a legislation
//! aggregate carry its revision as `ETag: "r<revision>"`. On a write the tag
//! is the revision that write committed. Writes that accept `If-Match` fail
//! with `409` when the aggregate has moved on.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", bylaw_api::api_router(store.clone()))
//! ```

pub mod branches;
pub mod envelope;
pub mod error;
pub mod legislations;
pub mod parameters;
pub mod schedules;
pub mod versions;

use std::sync::Arc;

use axum::{
  Router,
  routing::{delete, get, post, put},
};
use bylaw_core::store::LegislationStore;

pub use error::ApiError;

/// Build a fully-materialised API router for `store`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: LegislationStore + 'static,
{
  Router::new()
    // Legislation
    .route(
      "/legislations",
      get(legislations::list::<S>).post(legislations::create::<S>),
    )
    .route("/legislations/{id}", get(legislations::get_one::<S>))
    .route("/legislations/{id}/status", put(legislations::set_status::<S>))
    // Branches
    .route(
      "/legislations/{id}/branches",
      get(branches::list::<S>).post(branches::create::<S>),
    )
    .route(
      "/legislations/{id}/branches/{branch_id}",
      get(branches::get_one::<S>).delete(branches::delete_one::<S>),
    )
    .route("/legislations/{id}/branches/{branch_id}/apply", post(branches::apply::<S>))
    .route("/legislations/{id}/branches/{branch_id}/merge", post(branches::merge::<S>))
    .route(
      "/legislations/{id}/branches/{branch_id}/merge-preview",
      get(branches::merge_preview::<S>),
    )
    .route(
      "/legislations/{id}/branches/{branch_id}/conflicts",
      get(branches::conflicts::<S>),
    )
    .route(
      "/legislations/{id}/branches/{branch_id}/timeline",
      get(branches::timeline::<S>),
    )
    // Parameters
    .route(
      "/legislations/{id}/branches/{branch_id}/parameters",
      get(parameters::list::<S>).post(parameters::create::<S>),
    )
    .route(
      "/legislations/{id}/branches/{branch_id}/parameters/{parameter_id}",
      delete(parameters::delete_one::<S>),
    )
    // Versions
    .route(
      "/legislations/{id}/versions",
      get(versions::list::<S>).post(versions::create::<S>),
    )
    .route("/legislations/{id}/versions/consolidate", post(versions::consolidate::<S>))
    .route(
      "/legislations/{id}/versions/{version_id}/current",
      put(versions::set_current::<S>),
    )
    .route(
      "/legislations/{id}/versions/{version_id}/reviews",
      post(versions::review::<S>),
    )
    // Schedules
    .route(
      "/legislations/{id}/schedules",
      get(schedules::list::<S>).post(schedules::create::<S>),
    )
    .with_state(store)
}

#[cfg(test)]
mod tests;
