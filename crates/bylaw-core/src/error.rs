//! Error types for `bylaw-core`.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::{legislation::LegislationStatus, merge::MergeConflict};

/// The coarse classification every error maps onto. Callers decide whether to
/// retry, re-prompt, or give up based on the kind alone.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
  /// Malformed or missing input; fix the field and resubmit.
  Validation,
  /// The operation would break a structural invariant. Never retried.
  Invariant,
  /// Concurrent modification or unresolved merge conflicts.
  Conflict,
  NotFound,
  /// Network or backend failure. The outcome of the request is unknown.
  Transport,
  Internal,
}

#[derive(Debug, Error)]
pub enum Error {
  #[error("invalid {field}: {message}")]
  Validation {
    field:   &'static str,
    message: String,
  },

  // ── Invariants ──────────────────────────────────────────────────────────
  #[error("branch {0} is the main branch and cannot be deleted")]
  MainBranchNotDeletable(Uuid),

  #[error("branch {0} has been merged and cannot be deleted")]
  MergedBranchNotDeletable(Uuid),

  #[error("branch {0} is the main branch and is always applied")]
  MainBranchAlwaysApplied(Uuid),

  #[error("branch {0} has been merged; its state is frozen")]
  MergedBranchFrozen(Uuid),

  #[error("legislation cannot move from {from} to {to}")]
  IllegalStatusTransition {
    from: LegislationStatus,
    to:   LegislationStatus,
  },

  #[error("a polygon is already being drawn")]
  DrawingInProgress,

  // ── Conflicts ───────────────────────────────────────────────────────────
  #[error("merge blocked by {} unresolved conflict(s)", .0.len())]
  MergeConflicts(Vec<MergeConflict>),

  #[error("legislation changed since it was read (expected revision {expected}, found {actual})")]
  StaleRevision { expected: u64, actual: u64 },

  // ── Lookups ─────────────────────────────────────────────────────────────
  #[error("legislation not found: {0}")]
  LegislationNotFound(Uuid),

  #[error("branch not found: {0}")]
  BranchNotFound(Uuid),

  #[error("parameter not found: {0}")]
  ParameterNotFound(Uuid),

  #[error("version not found: {0}")]
  VersionNotFound(Uuid),

  #[error("schedule not found: {0}")]
  ScheduleNotFound(Uuid),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
    Self::Validation { field, message: message.into() }
  }

  pub fn kind(&self) -> ErrorKind {
    match self {
      Self::Validation { .. } => ErrorKind::Validation,
      Self::MainBranchNotDeletable(_)
      | Self::MergedBranchNotDeletable(_)
      | Self::MainBranchAlwaysApplied(_)
      | Self::MergedBranchFrozen(_)
      | Self::IllegalStatusTransition { .. }
      | Self::DrawingInProgress => ErrorKind::Invariant,
      Self::MergeConflicts(_) | Self::StaleRevision { .. } => {
        ErrorKind::Conflict
      }
      Self::LegislationNotFound(_)
      | Self::BranchNotFound(_)
      | Self::ParameterNotFound(_)
      | Self::VersionNotFound(_)
      | Self::ScheduleNotFound(_) => ErrorKind::NotFound,
      Self::Serialization(_) => ErrorKind::Internal,
    }
  }

  /// The unresolved conflicts carried by a blocked merge, if any.
  pub fn merge_conflicts(&self) -> Option<&[MergeConflict]> {
    match self {
      Self::MergeConflicts(c) => Some(c),
      _ => None,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Lets storage backends expose the domain error wrapped inside their own
/// error type, so higher layers can classify failures without knowing the
/// backend.
pub trait DomainError: std::error::Error + Send + Sync + 'static {
  fn domain(&self) -> Option<&Error>;

  fn kind(&self) -> ErrorKind {
    self.domain().map_or(ErrorKind::Internal, Error::kind)
  }
}

impl DomainError for Error {
  fn domain(&self) -> Option<&Error> { Some(self) }
}
