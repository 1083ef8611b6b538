//! Amendment consolidation: fold several published versions into one new
//! draft version.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  version::{Amendment, ApprovalStatus, NewVersion, Version, VersionStage},
};

/// Input to [`crate::store::LegislationStore::consolidate_versions`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidateRequest {
  pub version_ids: Vec<Uuid>,
  pub author:      String,
  #[serde(default)]
  pub label:       Option<String>,
}

/// Build the consolidated version from `available`, the legislation's
/// versions with their statuses resolved.
///
/// Sources are folded oldest first: for `amendment_value` a later version's
/// field overwrites an earlier one; for `original_value` the earliest text
/// of each field is kept. Ties on date keep the order of the request.
/// Sources are only read, never modified.
pub fn consolidate(available: &[Version], request: &ConsolidateRequest) -> Result<NewVersion> {
  if request.version_ids.len() < 2 {
    return Err(Error::validation(
      "versionIds",
      "select at least two versions to consolidate",
    ));
  }
  let mut seen = HashSet::new();
  if let Some(dup) = request.version_ids.iter().find(|id| !seen.insert(**id)) {
    return Err(Error::validation("versionIds", format!("version {dup} selected twice")));
  }
  if request.author.trim().is_empty() {
    return Err(Error::validation("author", "must not be blank"));
  }

  let mut sources: Vec<&Version> = request
    .version_ids
    .iter()
    .map(|id| {
      available
        .iter()
        .find(|v| v.version_id == *id)
        .ok_or(Error::VersionNotFound(*id))
    })
    .collect::<Result<_>>()?;

  if let Some(bad) = sources.iter().find(|v| !v.is_selectable()) {
    return Err(Error::validation(
      "versionIds",
      format!(
        "version {} is {} and cannot be consolidated; only published, non-current versions can",
        bad.label, bad.status
      ),
    ));
  }

  sources.sort_by_key(|v| v.date);

  let mut amendment_value = Amendment::new();
  let mut original_value = Amendment::new();
  for v in &sources {
    for (field, text) in &v.amendment_value {
      amendment_value.insert(field.clone(), text.clone());
    }
    for (field, text) in &v.original_value {
      original_value
        .entry(field.clone())
        .or_insert_with(|| text.clone());
    }
  }

  let label = request.label.clone().unwrap_or_else(|| {
    let first = sources.first().map(|v| v.label.as_str()).unwrap_or_default();
    let last = sources.last().map(|v| v.label.as_str()).unwrap_or_default();
    format!("consolidated {first}..{last}")
  });

  Ok(NewVersion {
    label,
    author: request.author.trim().to_owned(),
    date: None,
    stage: VersionStage::Draft,
    original_value,
    amendment_value,
    approval_status: ApprovalStatus::Pending,
    consolidated_from: sources.iter().map(|v| v.version_id).collect(),
  })
}

#[cfg(test)]
mod tests {
  use chrono::{TimeZone, Utc};

  use super::*;
  use crate::version::VersionStatus;

  fn version(label: &str, day: u32, status: VersionStatus, amendments: &[(&str, &str)]) -> Version {
    Version {
      version_id:        Uuid::new_v4(),
      legislation_id:    Uuid::nil(),
      label:             label.into(),
      date:              Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
      author:            "clerk".into(),
      stage:             match status {
        VersionStatus::Draft => VersionStage::Draft,
        _ => VersionStage::Published,
      },
      status,
      original_value:    amendments
        .iter()
        .map(|(k, _)| (k.to_string(), format!("original {k} ({label})")))
        .collect(),
      amendment_value:   amendments
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect(),
      approval_status:   ApprovalStatus::Approved,
      consolidated_from: vec![],
    }
  }

  fn request(ids: &[Uuid]) -> ConsolidateRequest {
    ConsolidateRequest {
      version_ids: ids.to_vec(),
      author:      "planner".into(),
      label:       None,
    }
  }

  #[test]
  fn draft_source_is_rejected() {
    let v1 = version("v1", 1, VersionStatus::Draft, &[]);
    let v2 = version("v2", 2, VersionStatus::Published, &[]);
    let err = consolidate(&[v1.clone(), v2.clone()], &request(&[v1.version_id, v2.version_id]))
      .unwrap_err();
    assert!(matches!(err, Error::Validation { field: "versionIds", .. }));
  }

  #[test]
  fn current_source_is_rejected() {
    let v1 = version("v1", 1, VersionStatus::Current, &[]);
    let v2 = version("v2", 2, VersionStatus::Published, &[]);
    assert!(
      consolidate(&[v1.clone(), v2.clone()], &request(&[v1.version_id, v2.version_id])).is_err()
    );
  }

  #[test]
  fn needs_two_distinct_versions() {
    let v1 = version("v1", 1, VersionStatus::Published, &[]);
    assert!(consolidate(&[v1.clone()], &request(&[v1.version_id])).is_err());
    assert!(consolidate(&[v1.clone()], &request(&[v1.version_id, v1.version_id])).is_err());
  }

  #[test]
  fn unknown_source_is_not_found() {
    let v1 = version("v1", 1, VersionStatus::Published, &[]);
    let missing = Uuid::new_v4();
    assert!(matches!(
      consolidate(&[v1.clone()], &request(&[v1.version_id, missing])),
      Err(Error::VersionNotFound(id)) if id == missing
    ));
  }

  #[test]
  fn later_amendments_win_and_audit_trail_is_chronological() {
    let older = version("v1", 1, VersionStatus::Published, &[("s4.2", "12 m"), ("s5", "6 m")]);
    let newer = version("v2", 9, VersionStatus::Published, &[("s4.2", "15 m")]);

    // Request order deliberately reversed.
    let out = consolidate(
      &[older.clone(), newer.clone()],
      &request(&[newer.version_id, older.version_id]),
    )
    .unwrap();

    assert_eq!(out.stage, VersionStage::Draft);
    assert_eq!(out.approval_status, ApprovalStatus::Pending);
    assert_eq!(out.consolidated_from, vec![older.version_id, newer.version_id]);
    assert_eq!(out.amendment_value["s4.2"], "15 m");
    assert_eq!(out.amendment_value["s5"], "6 m");
    assert_eq!(out.original_value["s4.2"], "original s4.2 (v1)");
    assert_eq!(out.label, "consolidated v1..v2");
  }
}
