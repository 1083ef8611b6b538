//! Branches — alternative named lines of amendments to one legislation.
//!
//! Every legislation owns exactly one main branch. Other branches start
//! active, can be toggled applied/unapplied, and end either deleted or merged.
//! The rules that guard those transitions live here as pure functions so that
//! every backend enforces them identically.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

pub const MAIN_BRANCH_NAME: &str = "main";

const MAX_NAME_LEN: usize = 120;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a branch. A merged branch always records when, by
/// whom, and into which branch it was merged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum BranchStatus {
  Active,
  #[serde(rename_all = "camelCase")]
  Merged {
    merged_at:             DateTime<Utc>,
    merged_by:             String,
    merged_into_branch_id: Uuid,
  },
}

impl BranchStatus {
  pub fn state(&self) -> BranchState {
    match self {
      Self::Active => BranchState::Active,
      Self::Merged { .. } => BranchState::Merged,
    }
  }
}

/// The bare discriminant of [`BranchStatus`], used for filtering and storage.
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
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum BranchState {
  Active,
  Merged,
}

// ─── Metadata ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BranchMetadata {
  /// Free-form version label, e.g. `v1.2`.
  pub version:    Option<String>,
  pub is_applied: bool,
  /// Forward-compatible extension fields.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub extra:      BTreeMap<String, String>,
}

// ─── Branch ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Branch {
  pub branch_id:        Uuid,
  pub legislation_id:   Uuid,
  pub name:             String,
  pub description:      Option<String>,
  pub is_main:          bool,
  /// Origin of the branch; a weak reference into the same legislation.
  pub parent_branch_id: Option<Uuid>,
  pub base_version_id:  Option<Uuid>,
  pub created_at:       DateTime<Utc>,
  #[serde(flatten)]
  pub status:           BranchStatus,
  pub metadata:         BranchMetadata,
}

impl Branch {
  /// The main branch created alongside a new legislation.
  pub fn main(legislation_id: Uuid, now: DateTime<Utc>) -> Self {
    Self {
      branch_id: Uuid::new_v4(),
      legislation_id,
      name: MAIN_BRANCH_NAME.to_owned(),
      description: None,
      is_main: true,
      parent_branch_id: None,
      base_version_id: None,
      created_at: now,
      status: BranchStatus::Active,
      metadata: BranchMetadata { is_applied: true, ..Default::default() },
    }
  }

  pub fn is_active(&self) -> bool { matches!(self.status, BranchStatus::Active) }

  /// The main branch reads as applied whatever its stored flag says.
  pub fn is_applied(&self) -> bool { self.is_main || self.metadata.is_applied }

  pub fn merged_at(&self) -> Option<DateTime<Utc>> {
    match &self.status {
      BranchStatus::Merged { merged_at, .. } => Some(*merged_at),
      BranchStatus::Active => None,
    }
  }

  pub fn merged_into(&self) -> Option<Uuid> {
    match &self.status {
      BranchStatus::Merged { merged_into_branch_id, .. } => {
        Some(*merged_into_branch_id)
      }
      BranchStatus::Active => None,
    }
  }
}

// ─── NewBranch ───────────────────────────────────────────────────────────────

/// Input to [`crate::store::LegislationStore::create_branch`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBranch {
  pub name:             String,
  #[serde(default)]
  pub description:      Option<String>,
  #[serde(default)]
  pub parent_branch_id: Option<Uuid>,
  #[serde(default)]
  pub base_version_id:  Option<Uuid>,
  #[serde(default)]
  pub version_label:    Option<String>,
  /// Client-chosen key making retried creates return the original branch.
  #[serde(default, skip_serializing)]
  pub idempotency_key:  Option<String>,
}

impl NewBranch {
  pub fn new(name: impl Into<String>) -> Self {
    Self { name: name.into(), ..Default::default() }
  }

  /// Materialise into a fresh, active, unapplied branch.
  pub fn into_branch(self, legislation_id: Uuid, now: DateTime<Utc>) -> Branch {
    Branch {
      branch_id: Uuid::new_v4(),
      legislation_id,
      name: self.name.trim().to_owned(),
      description: self.description,
      is_main: false,
      parent_branch_id: self.parent_branch_id,
      base_version_id: self.base_version_id,
      created_at: now,
      status: BranchStatus::Active,
      metadata: BranchMetadata {
        version:    self.version_label,
        is_applied: false,
        extra:      BTreeMap::new(),
      },
    }
  }
}

// ─── Rules ───────────────────────────────────────────────────────────────────

/// Check a new branch's name against the names already used in its
/// legislation. Names compare case-insensitively after trimming.
pub fn validate_new_branch<'a>(
  input: &NewBranch,
  existing_names: impl IntoIterator<Item = &'a str>,
) -> Result<()> {
  let name = input.name.trim();
  if name.is_empty() {
    return Err(Error::validation("name", "must not be blank"));
  }
  if name.chars().count() > MAX_NAME_LEN {
    return Err(Error::validation(
      "name",
      format!("must be at most {MAX_NAME_LEN} characters"),
    ));
  }
  if existing_names
    .into_iter()
    .any(|existing| existing.trim().eq_ignore_ascii_case(name))
  {
    return Err(Error::validation(
      "name",
      format!("a branch named {name:?} already exists"),
    ));
  }
  Ok(())
}

pub fn ensure_deletable(branch: &Branch) -> Result<()> {
  if branch.is_main {
    return Err(Error::MainBranchNotDeletable(branch.branch_id));
  }
  if !branch.is_active() {
    return Err(Error::MergedBranchNotDeletable(branch.branch_id));
  }
  Ok(())
}

/// What an apply/unapply request does to a branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyChange {
  /// Already in the requested state.
  Unchanged,
  Set(bool),
}

pub fn resolve_apply(branch: &Branch, apply: bool) -> Result<ApplyChange> {
  if branch.is_main {
    return if apply {
      Ok(ApplyChange::Unchanged)
    } else {
      Err(Error::MainBranchAlwaysApplied(branch.branch_id))
    };
  }
  if !branch.is_active() {
    return if apply && branch.metadata.is_applied {
      Ok(ApplyChange::Unchanged)
    } else {
      Err(Error::MergedBranchFrozen(branch.branch_id))
    };
  }
  if branch.metadata.is_applied == apply {
    Ok(ApplyChange::Unchanged)
  } else {
    Ok(ApplyChange::Set(apply))
  }
}

/// Preconditions of a merge that depend only on the two branches.
pub fn validate_merge(source: &Branch, target: &Branch, merged_by: &str) -> Result<()> {
  if source.branch_id == target.branch_id {
    return Err(Error::validation(
      "targetBranchId",
      "a branch cannot be merged into itself",
    ));
  }
  if !source.is_active() {
    return Err(Error::validation(
      "sourceBranchId",
      format!("branch {} is not active", source.name),
    ));
  }
  if !target.is_active() {
    return Err(Error::validation(
      "targetBranchId",
      format!("branch {} is not active", target.name),
    ));
  }
  if merged_by.trim().is_empty() {
    return Err(Error::validation("mergedBy", "must not be blank"));
  }
  Ok(())
}
