//! Versions — immutable snapshots of a legislation's content.
//!
//! Versions form an append-only log. Two things about a version change over
//! time without the record itself changing:
//!
//! - whether it is the legislation's *current* version (a pointer on the
//!   legislation, resolved at read time), and
//! - its approval status (the latest of its append-only reviews).

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// Field → text pairs summarising a version's content or changes.
pub type Amendment = BTreeMap<String, String>;

// ─── Status ──────────────────────────────────────────────────────────────────

/// The stage a version was recorded at. Never changes.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VersionStage {
  #[default]
  Draft,
  Published,
}

impl VersionStage {
  pub fn resolve(self, is_current: bool) -> VersionStatus {
    match (self, is_current) {
      (_, true) => VersionStatus::Current,
      (Self::Draft, false) => VersionStatus::Draft,
      (Self::Published, false) => VersionStatus::Published,
    }
  }
}

/// The status of a version as seen by readers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum VersionStatus {
  Draft,
  Published,
  Current,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ApprovalStatus {
  Approved,
  #[default]
  Pending,
  Rejected,
}

// ─── Version ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
  pub version_id:        Uuid,
  pub legislation_id:    Uuid,
  /// Human label, e.g. `v1.2`.
  pub label:             String,
  pub date:              DateTime<Utc>,
  pub author:            String,
  pub stage:             VersionStage,
  pub status:            VersionStatus,
  pub original_value:    Amendment,
  pub amendment_value:   Amendment,
  pub approval_status:   ApprovalStatus,
  /// Source versions of a consolidation, oldest first. Empty otherwise.
  #[serde(default)]
  pub consolidated_from: Vec<Uuid>,
}

impl Version {
  /// Only published, non-current versions may be consolidated or restored.
  pub fn is_selectable(&self) -> bool { self.status == VersionStatus::Published }
}

/// Input to [`crate::store::LegislationStore::record_version`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVersion {
  pub label:             String,
  pub author:            String,
  /// Defaults to the time of recording.
  #[serde(default)]
  pub date:              Option<DateTime<Utc>>,
  #[serde(default)]
  pub stage:             VersionStage,
  #[serde(default)]
  pub original_value:    Amendment,
  #[serde(default)]
  pub amendment_value:   Amendment,
  #[serde(default)]
  pub approval_status:   ApprovalStatus,
  #[serde(default)]
  pub consolidated_from: Vec<Uuid>,
}

impl NewVersion {
  pub fn validate(&self) -> Result<()> {
    if self.label.trim().is_empty() {
      return Err(Error::validation("label", "must not be blank"));
    }
    if self.author.trim().is_empty() {
      return Err(Error::validation("author", "must not be blank"));
    }
    Ok(())
  }

  /// Materialise into a version that is not (yet) current.
  pub fn into_version(self, legislation_id: Uuid, now: DateTime<Utc>) -> Version {
    Version {
      version_id: Uuid::new_v4(),
      legislation_id,
      label: self.label.trim().to_owned(),
      date: self.date.unwrap_or(now),
      author: self.author.trim().to_owned(),
      stage: self.stage,
      status: self.stage.resolve(false),
      original_value: self.original_value,
      amendment_value: self.amendment_value,
      approval_status: self.approval_status,
      consolidated_from: self.consolidated_from,
    }
  }
}

// ─── Reviews ─────────────────────────────────────────────────────────────────

/// An approval decision on a version. Reviews are append-only; the latest
/// one determines the version's approval status.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionReview {
  pub review_id:   Uuid,
  pub version_id:  Uuid,
  pub decision:    ApprovalStatus,
  pub reviewer:    String,
  pub note:        Option<String>,
  pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReview {
  pub decision: ApprovalStatus,
  pub reviewer: String,
  #[serde(default)]
  pub note:     Option<String>,
}

impl NewReview {
  pub fn validate(&self) -> Result<()> {
    if self.reviewer.trim().is_empty() {
      return Err(Error::validation("reviewer", "must not be blank"));
    }
    Ok(())
  }
}

/// Check that `version` can become the legislation's current version.
pub fn ensure_promotable(version: &Version) -> Result<()> {
  match version.stage {
    VersionStage::Published => Ok(()),
    VersionStage::Draft => Err(Error::validation(
      "versionId",
      format!("version {} is a draft and cannot become current", version.label),
    )),
  }
}
