//! Client-side branch state: optimistic applied toggles and listings that
//! degrade to an explicit fallback when the server is unreachable.

use std::{collections::HashMap, future::Future};

use bylaw_core::{
  ErrorKind,
  branch::Branch,
  store::{BranchQuery, Page, Revised},
};
use chrono::Utc;
use uuid::Uuid;

use crate::client::{ApiClient, ClientError};

// ─── Gateway ──────────────────────────────────────────────────────────────────

/// The slice of the API the branch state needs.
pub trait BranchGateway: Send + Sync {
  fn list_branches<'a>(
    &'a self,
    legislation_id: Uuid,
    query: &'a BranchQuery,
  ) -> impl Future<Output = Result<Page<Branch>, ClientError>> + Send + 'a;

  /// The legislation's current revision.
  fn revision(
    &self,
    legislation_id: Uuid,
  ) -> impl Future<Output = Result<u64, ClientError>> + Send + '_;

  fn get_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> impl Future<Output = Result<Branch, ClientError>> + Send + '_;

  /// Set the applied flag, failing with a conflict when the legislation is
  /// no longer at `expected_revision`.
  fn apply_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    apply: bool,
    expected_revision: Option<u64>,
  ) -> impl Future<Output = Result<Revised<Branch>, ClientError>> + Send + '_;
}

impl BranchGateway for ApiClient {
  async fn list_branches(
    &self,
    legislation_id: Uuid,
    query: &BranchQuery,
  ) -> Result<Page<Branch>, ClientError> {
    ApiClient::list_branches(self, legislation_id, query).await
  }

  async fn revision(&self, legislation_id: Uuid) -> Result<u64, ClientError> {
    Ok(self.get_legislation(legislation_id).await?.revision)
  }

  async fn get_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> Result<Branch, ClientError> {
    ApiClient::get_branch(self, legislation_id, branch_id).await
  }

  async fn apply_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    apply: bool,
    expected_revision: Option<u64>,
  ) -> Result<Revised<Branch>, ClientError> {
    ApiClient::apply_branch(self, legislation_id, branch_id, apply, expected_revision).await
  }
}

// ─── Applied set ──────────────────────────────────────────────────────────────

/// Which branches of one legislation are applied, as last seen locally,
/// and the legislation revision that view was read at.
#[derive(Debug, Clone, Default)]
pub struct AppliedBranches {
  applied:  HashMap<Uuid, bool>,
  revision: Option<u64>,
}

impl AppliedBranches {
  /// A view of `branches` as read at `revision`. Without a revision, writes
  /// are sent without `If-Match`.
  pub fn from_branches<'a>(
    branches: impl IntoIterator<Item = &'a Branch>,
    revision: Option<u64>,
  ) -> Self {
    Self {
      applied: branches.into_iter().map(|b| (b.branch_id, b.is_applied())).collect(),
      revision,
    }
  }

  /// Seed a view from one branch fetched directly. The revision is read
  /// first, so a write landing before the branch read makes the next `set`
  /// fail with a conflict.
  pub async fn for_branch<G: BranchGateway>(
    gateway: &G,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> Result<Self, ClientError> {
    let revision = gateway.revision(legislation_id).await?;
    let branch = gateway.get_branch(legislation_id, branch_id).await?;
    Ok(Self::from_branches([&branch], Some(revision)))
  }

  pub fn is_applied(&self, branch_id: Uuid) -> bool {
    self.applied.get(&branch_id).copied().unwrap_or(false)
  }

  pub fn revision(&self) -> Option<u64> { self.revision }

  /// Set a branch's applied flag optimistically.
  ///
  /// The local value changes before the request is sent, which carries the
  /// view's revision as `If-Match`. On success the entry and revision are
  /// replaced with the server's answer; on any failure, a stale revision
  /// included, the previous value is restored and the error returned.
  pub async fn set<G: BranchGateway>(
    &mut self,
    gateway: &G,
    legislation_id: Uuid,
    branch_id: Uuid,
    apply: bool,
  ) -> Result<bool, ClientError> {
    let previous = self.applied.insert(branch_id, apply);
    match gateway
      .apply_branch(legislation_id, branch_id, apply, self.revision)
      .await
    {
      Ok(branch) => {
        let applied = branch.is_applied();
        self.applied.insert(branch_id, applied);
        self.revision = Some(branch.revision);
        Ok(applied)
      }
      Err(e) => {
        tracing::debug!(%branch_id, error = %e, "rolling back applied toggle");
        match previous {
          Some(value) => self.applied.insert(branch_id, value),
          None => self.applied.remove(&branch_id),
        };
        Err(e)
      }
    }
  }

  /// Flip a branch's applied flag. See [`AppliedBranches::set`].
  pub async fn toggle<G: BranchGateway>(
    &mut self,
    gateway: &G,
    legislation_id: Uuid,
    branch_id: Uuid,
  ) -> Result<bool, ClientError> {
    let next = !self.is_applied(branch_id);
    self.set(gateway, legislation_id, branch_id, next).await
  }
}

// ─── Listing ──────────────────────────────────────────────────────────────────

/// A branch listing, either fresh from the server or a stand-in shown while
/// the server cannot be reached.
#[derive(Debug, Clone)]
pub enum BranchListing {
  Live(Page<Branch>),
  Fallback { items: Vec<Branch>, reason: String },
}

impl BranchListing {
  pub fn items(&self) -> &[Branch] {
    match self {
      Self::Live(page) => &page.items,
      Self::Fallback { items, .. } => items,
    }
  }
}

/// Lists one legislation's branches, remembering the last successful result.
pub struct BranchBrowser<G> {
  gateway:        G,
  legislation_id: Uuid,
  last_known:     Option<Vec<Branch>>,
}

impl<G: BranchGateway> BranchBrowser<G> {
  pub fn new(gateway: G, legislation_id: Uuid) -> Self {
    Self { gateway, legislation_id, last_known: None }
  }

  /// Fetch a listing. A transport failure yields the last known items, or a
  /// main-only placeholder, marked as [`BranchListing::Fallback`]. Any other
  /// failure is returned as is.
  pub async fn refresh(&mut self, query: &BranchQuery) -> Result<BranchListing, ClientError> {
    match self.gateway.list_branches(self.legislation_id, query).await {
      Ok(page) => {
        self.last_known = Some(page.items.clone());
        Ok(BranchListing::Live(page))
      }
      Err(e) if e.kind() == ErrorKind::Transport => {
        tracing::warn!(error = %e, "branch listing unavailable; showing fallback");
        let items = self
          .last_known
          .clone()
          .unwrap_or_else(|| vec![Branch::main(self.legislation_id, Utc::now())]);
        Ok(BranchListing::Fallback { items, reason: e.to_string() })
      }
      Err(e) => Err(e),
    }
  }
}
