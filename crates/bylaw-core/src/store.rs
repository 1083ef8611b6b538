//! The `LegislationStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `bylaw-store-sqlite`).
//! Higher layers (`bylaw-api`, `bylaw-server`) depend on this abstraction, not
//! on any concrete backend.

use std::{future::Future, ops::Deref};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  branch::{Branch, BranchState, NewBranch},
  consolidate::ConsolidateRequest,
  error::DomainError,
  legislation::{Legislation, LegislationStatus, NewLegislation},
  merge::{MergeConflict, MergeOutcome, MergeRequest},
  parameter::{NewParameter, Parameter},
  schedule::{GisSchedule, NewSchedule},
  version::{NewReview, NewVersion, Version, VersionReview},
};

pub const DEFAULT_PAGE_LIMIT: u32 = 20;
pub const MAX_PAGE_LIMIT: u32 = 100;

// ─── Paging ──────────────────────────────────────────────────────────────────

/// One page of a listing plus the size of the whole result set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
  pub items: Vec<T>,
  pub total: u64,
  pub page:  u32,
  pub limit: u32,
}

impl<T> Page<T> {
  pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
    Page {
      items: self.items.into_iter().map(f).collect(),
      total: self.total,
      page:  self.page,
      limit: self.limit,
    }
  }
}

fn default_page() -> u32 { 1 }

fn default_limit() -> u32 { DEFAULT_PAGE_LIMIT }

fn validate_paging(page: u32, limit: u32) -> Result<()> {
  if page == 0 {
    return Err(Error::validation("page", "pages start at 1"));
  }
  if limit == 0 || limit > MAX_PAGE_LIMIT {
    return Err(Error::validation(
      "limit",
      format!("must be between 1 and {MAX_PAGE_LIMIT}"),
    ));
  }
  Ok(())
}

/// Row offset of the first item on `page`.
pub fn page_offset(page: u32, limit: u32) -> u64 {
  u64::from(page.saturating_sub(1)) * u64::from(limit)
}

// ─── Revised ─────────────────────────────────────────────────────────────────

/// The result of a write together with the aggregate revision the write left
/// behind. A write that changed nothing reports the revision it observed.
#[derive(Debug, Clone, PartialEq)]
pub struct Revised<T> {
  pub value:    T,
  pub revision: u64,
}

impl<T> Revised<T> {
  pub fn new(value: T, revision: u64) -> Self { Self { value, revision } }

  pub fn into_inner(self) -> T { self.value }
}

impl<T> Deref for Revised<T> {
  type Target = T;

  fn deref(&self) -> &T { &self.value }
}

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
  Asc,
  #[default]
  Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BranchSort {
  #[default]
  CreatedAt,
  Name,
  Status,
}

/// Parameters for [`LegislationStore::list_branches`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchQuery {
  #[serde(default)]
  pub status:     Option<BranchState>,
  #[serde(default = "default_page")]
  pub page:       u32,
  #[serde(default = "default_limit")]
  pub limit:      u32,
  #[serde(default)]
  pub sort_by:    BranchSort,
  #[serde(default)]
  pub sort_order: SortOrder,
}

impl Default for BranchQuery {
  fn default() -> Self {
    Self {
      status:     None,
      page:       default_page(),
      limit:      default_limit(),
      sort_by:    BranchSort::default(),
      sort_order: SortOrder::default(),
    }
  }
}

impl BranchQuery {
  pub fn validate(&self) -> Result<()> { validate_paging(self.page, self.limit) }
}

/// Parameters for [`LegislationStore::list_legislations`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegislationQuery {
  /// Case-insensitive substring match over title and jurisdiction.
  #[serde(default)]
  pub search: Option<String>,
  #[serde(default)]
  pub status: Option<LegislationStatus>,
  #[serde(default = "default_page")]
  pub page:   u32,
  #[serde(default = "default_limit")]
  pub limit:  u32,
}

impl Default for LegislationQuery {
  fn default() -> Self {
    Self { search: None, status: None, page: default_page(), limit: default_limit() }
  }
}

impl LegislationQuery {
  pub fn validate(&self) -> Result<()> { validate_paging(self.page, self.limit) }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a legislation store backend.
///
/// A legislation is the aggregate root: its branches, parameters, versions and
/// schedules are only reached through it, and every write to any of them bumps
/// [`Legislation::revision`]. Writes on one aggregate are serialised by the
/// backend; operations on different legislations are independent.
///
/// Writes on a legislation's children return [`Revised`] values carrying the
/// revision read inside the write's own transaction.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait LegislationStore: Send + Sync {
  type Error: DomainError;

  // ── Legislation ───────────────────────────────────────────────────────

  /// Persist a new draft legislation together with its main branch.
  fn create_legislation(
    &self,
    input: NewLegislation,
  ) -> impl Future<Output = Result<Legislation, Self::Error>> + Send + '_;

  fn get_legislation(
    &self,
    legislation_id: Uuid,
  ) -> impl Future<Output = Result<Option<Legislation>, Self::Error>> + Send + '_;

  fn list_legislations<'a>(
    &'a self,
    query: &'a LegislationQuery,
  ) -> impl Future<Output = Result<Page<Legislation>, Self::Error>> + Send + 'a;

  /// Soft status transition. Legislation is never hard-deleted.
  fn set_legislation_status(
    &self,
    legislation_id: Uuid,
    status: LegislationStatus,
    expected_revision: Option<u64>,
  ) -> impl Future<Output = Result<Legislation, Self::Error>> + Send + '_;

  // ── Branches ──────────────────────────────────────────────────────────

  /// Create a branch. A repeated `idempotency_key` returns the branch created
  /// by the first request instead of failing on the duplicate name.
  fn create_branch(
    &self,
    legislation_id: Uuid,
    input: NewBranch,
  ) -> impl Future<Output = Result<Revised<Branch>, Self::Error>> + Send + '_;

  fn get_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> impl Future<Output = Result<Option<Branch>, Self::Error>> + Send + '_;

  fn list_branches<'a>(
    &'a self,
    legislation_id: Uuid,
    query: &'a BranchQuery,
  ) -> impl Future<Output = Result<Page<Branch>, Self::Error>> + Send + 'a;

  /// Remove an active, non-main branch and its parameters. Returns the new
  /// revision.
  fn delete_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// Set a branch's applied flag. Idempotent.
  fn apply_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    apply: bool,
    expected_revision: Option<u64>,
  ) -> impl Future<Output = Result<Revised<Branch>, Self::Error>> + Send + '_;

  /// Report the conflicts a merge of `source` into `target` would hit.
  /// Writes nothing.
  fn preview_merge(
    &self,
    legislation_id: Uuid,
    source_branch_id: Uuid,
    target_branch_id: Uuid,
  ) -> impl Future<Output = Result<Vec<MergeConflict>, Self::Error>> + Send + '_;

  /// Merge one branch into another, atomically. Fails with
  /// [`Error::MergeConflicts`] until every conflict has a resolution.
  fn merge_branch(
    &self,
    legislation_id: Uuid,
    request: MergeRequest,
  ) -> impl Future<Output = Result<Revised<MergeOutcome>, Self::Error>> + Send + '_;

  // ── Parameters ────────────────────────────────────────────────────────

  fn add_parameter(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    input: NewParameter,
  ) -> impl Future<Output = Result<Revised<Parameter>, Self::Error>> + Send + '_;

  fn remove_parameter(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    parameter_id: Uuid,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  /// A branch's parameter snapshot, oldest first.
  fn list_parameters(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Parameter>, Self::Error>> + Send + '_;

  // ── Versions ──────────────────────────────────────────────────────────

  /// Append a version to the log. The date defaults to now. A published
  /// version recorded while no version is current becomes current.
  fn record_version(
    &self,
    legislation_id: Uuid,
    input: NewVersion,
  ) -> impl Future<Output = Result<Revised<Version>, Self::Error>> + Send + '_;

  fn get_version(
    &self,
    legislation_id: Uuid,
    version_id: Uuid,
  ) -> impl Future<Output = Result<Option<Version>, Self::Error>> + Send + '_;

  /// Every version of the legislation, oldest first, with status and
  /// approval resolved.
  fn list_versions(
    &self,
    legislation_id: Uuid,
  ) -> impl Future<Output = Result<Vec<Version>, Self::Error>> + Send + '_;

  /// Make a published version current. Restoring an older version is the
  /// same operation. The pointer is never cleared, so once a version has
  /// been published exactly one version is current.
  fn set_current_version(
    &self,
    legislation_id: Uuid,
    version_id: Uuid,
    expected_revision: Option<u64>,
  ) -> impl Future<Output = Result<Revised<Version>, Self::Error>> + Send + '_;

  /// Record an approval decision. Reviews are append-only.
  fn review_version(
    &self,
    legislation_id: Uuid,
    version_id: Uuid,
    review: NewReview,
  ) -> impl Future<Output = Result<Revised<VersionReview>, Self::Error>> + Send + '_;

  /// Fold several published versions into a new draft version.
  fn consolidate_versions(
    &self,
    legislation_id: Uuid,
    request: ConsolidateRequest,
  ) -> impl Future<Output = Result<Revised<Version>, Self::Error>> + Send + '_;

  // ── Schedules ─────────────────────────────────────────────────────────

  fn add_schedule(
    &self,
    legislation_id: Uuid,
    input: NewSchedule,
  ) -> impl Future<Output = Result<Revised<GisSchedule>, Self::Error>> + Send + '_;

  fn list_schedules(
    &self,
    legislation_id: Uuid,
  ) -> impl Future<Output = Result<Vec<GisSchedule>, Self::Error>> + Send + '_;
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn branch_query_defaults() {
    let q: BranchQuery = serde_json::from_str("{}").unwrap();
    assert_eq!(q, BranchQuery::default());
    assert_eq!(q.page, 1);
    assert_eq!(q.limit, 20);
    assert_eq!(q.sort_by, BranchSort::CreatedAt);
    assert_eq!(q.sort_order, SortOrder::Desc);
  }

  #[test]
  fn branch_query_wire_names() {
    let q: BranchQuery = serde_json::from_value(serde_json::json!({
      "status": "merged",
      "sortBy": "name",
      "sortOrder": "asc",
    }))
    .unwrap();
    assert_eq!(q.status, Some(BranchState::Merged));
    assert_eq!(q.sort_by, BranchSort::Name);
    assert_eq!(q.sort_order, SortOrder::Asc);
  }

  #[test]
  fn paging_bounds() {
    assert!(BranchQuery { page: 0, ..Default::default() }.validate().is_err());
    assert!(BranchQuery { limit: 101, ..Default::default() }.validate().is_err());
    assert_eq!(page_offset(3, 20), 40);
    assert_eq!(page_offset(1, 20), 0);
  }
}
