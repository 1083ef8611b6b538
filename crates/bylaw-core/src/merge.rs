//! Merge conflict detection and merge planning between two branch parameter
//! snapshots.
//!
//! Merging is two-phase: [`detect_conflicts`] reports every key on which the
//! branches disagree, and [`plan_merge`] refuses to proceed until each of those
//! keys has an explicit [`Resolution`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  branch::Branch,
  parameter::{LandUse, Parameter, RuleType},
};

// ─── Keys and conflicts ──────────────────────────────────────────────────────

/// Parameters are compared across branches on `(rule type, land use)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParameterKey {
  pub rule_type: RuleType,
  pub land_use:  Option<LandUse>,
}

impl ParameterKey {
  pub fn of(p: &Parameter) -> Self {
    Self { rule_type: p.rule_type, land_use: p.land_use }
  }
}

/// A key both branches define with different values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflict {
  pub rule_type:     RuleType,
  pub land_use:      Option<LandUse>,
  pub source_values: Vec<String>,
  pub target_values: Vec<String>,
}

impl MergeConflict {
  pub fn key(&self) -> ParameterKey {
    ParameterKey { rule_type: self.rule_type, land_use: self.land_use }
  }
}

/// Which side wins a conflicting key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
  Source,
  Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
  pub rule_type: RuleType,
  #[serde(default)]
  pub land_use:  Option<LandUse>,
  pub take:      Side,
}

impl Resolution {
  pub fn key(&self) -> ParameterKey {
    ParameterKey { rule_type: self.rule_type, land_use: self.land_use }
  }
}

// ─── Requests ────────────────────────────────────────────────────────────────

/// Input to [`crate::store::LegislationStore::merge_branch`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
  pub source_branch_id:  Uuid,
  pub target_branch_id:  Uuid,
  pub merged_by:         String,
  /// Absent on the first attempt; required once conflicts are known.
  #[serde(default)]
  pub resolutions:       Vec<Resolution>,
  #[serde(default, skip_serializing)]
  pub expected_revision: Option<u64>,
}

/// The state of both branches after a committed merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeOutcome {
  pub source:   Branch,
  pub target:   Branch,
  /// Parameters newly written to the target.
  pub absorbed: Vec<Parameter>,
}

// ─── Detection ───────────────────────────────────────────────────────────────

/// Canonical comparison form of a parameter value: numbers compare
/// numerically, units case-insensitively.
fn normalised(p: &Parameter) -> String {
  let value = match p.numeric_value() {
    Some(n) => n.to_string(),
    None => p.value.trim().to_owned(),
  };
  match p.unit.as_deref().map(str::trim) {
    Some(unit) if !unit.is_empty() => format!("{value} {}", unit.to_lowercase()),
    _ => value,
  }
}

fn group(params: &[Parameter]) -> BTreeMap<ParameterKey, Vec<&Parameter>> {
  let mut groups: BTreeMap<ParameterKey, Vec<&Parameter>> = BTreeMap::new();
  for p in params {
    groups.entry(ParameterKey::of(p)).or_default().push(p);
  }
  groups
}

fn value_set(params: &[&Parameter]) -> Vec<String> {
  let mut values: Vec<String> = params.iter().map(|p| normalised(p)).collect();
  values.sort();
  values.dedup();
  values
}

/// Every shared key whose values differ between `source` and `target`.
/// Neither input is modified.
pub fn detect_conflicts(source: &[Parameter], target: &[Parameter]) -> Vec<MergeConflict> {
  let target_groups = group(target);
  group(source)
    .into_iter()
    .filter_map(|(key, source_params)| {
      let target_params = target_groups.get(&key)?;
      let source_values = value_set(&source_params);
      let target_values = value_set(target_params);
      (source_values != target_values).then_some(MergeConflict {
        rule_type: key.rule_type,
        land_use: key.land_use,
        source_values,
        target_values,
      })
    })
    .collect()
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// The parameter writes a merge performs on the target branch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergePlan {
  /// Source parameters to copy onto the target.
  pub insert: Vec<Parameter>,
  /// Target parameters replaced by a `Source` resolution.
  pub remove: Vec<Uuid>,
}

/// Work out how the target absorbs the source.
///
/// Source-only keys are copied. Identical keys are left alone. Conflicting
/// keys need a resolution; without one the merge fails with
/// [`Error::MergeConflicts`] listing what is still open. Resolutions for keys
/// that are not in conflict are rejected as stale.
pub fn plan_merge(
  source: &[Parameter],
  target: &[Parameter],
  resolutions: &[Resolution],
) -> Result<MergePlan> {
  let conflicts = detect_conflicts(source, target);

  let chosen: BTreeMap<ParameterKey, Side> =
    resolutions.iter().map(|r| (r.key(), r.take)).collect();

  if let Some(stale) = chosen
    .keys()
    .find(|key| !conflicts.iter().any(|c| c.key() == **key))
  {
    return Err(Error::validation(
      "resolutions",
      format!(
        "no conflict on {}{}",
        stale.rule_type,
        stale.land_use.map(|l| format!("/{l}")).unwrap_or_default()
      ),
    ));
  }

  let unresolved: Vec<MergeConflict> = conflicts
    .iter()
    .filter(|c| !chosen.contains_key(&c.key()))
    .cloned()
    .collect();
  if !unresolved.is_empty() {
    return Err(Error::MergeConflicts(unresolved));
  }

  let target_groups = group(target);
  let mut plan = MergePlan::default();

  for (key, source_params) in group(source) {
    match target_groups.get(&key) {
      None => plan.insert.extend(source_params.into_iter().cloned()),
      Some(target_params) => {
        if chosen.get(&key) == Some(&Side::Source) {
          plan.remove.extend(target_params.iter().map(|p| p.parameter_id));
          plan.insert.extend(source_params.into_iter().cloned());
        }
      }
    }
  }

  Ok(plan)
}
