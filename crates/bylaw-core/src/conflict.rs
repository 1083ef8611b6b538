//! Logical conflict detection within one parameter set.
//!
//! Parameters are grouped by `(land use, variable)`. A group conflicts when
//! its most restrictive minimum exceeds its least restrictive maximum.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::parameter::{Bound, LandUse, Parameter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
  MinExceedsMax,
}

/// A contradiction between two parameters of the same group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conflict {
  #[serde(rename = "type")]
  pub kind:             ConflictKind,
  pub message:          String,
  pub variable:         String,
  pub land_use:         Option<LandUse>,
  pub min_value:        f64,
  pub max_value:        f64,
  pub min_parameter_id: Uuid,
  pub max_parameter_id: Uuid,
}

/// Parse a bound value. Anything non-numeric falls back to the permissive
/// end of its range: `0` for a minimum, `+∞` for a maximum.
fn bound_value(p: &Parameter, bound: Bound) -> f64 {
  p.numeric_value().unwrap_or(match bound {
    Bound::Min => 0.0,
    Bound::Max => f64::INFINITY,
  })
}

#[derive(Default)]
struct Extremes {
  /// Largest minimum seen so far.
  min: Option<(f64, Uuid)>,
  /// Smallest maximum seen so far.
  max: Option<(f64, Uuid)>,
}

/// Find every group whose minimum exceeds its maximum.
///
/// Groups with only one bound class are never in conflict. Results are
/// ordered by land use (unscoped first), then variable name.
pub fn check_conflicts(parameters: &[Parameter]) -> Vec<Conflict> {
  let mut groups: BTreeMap<(Option<LandUse>, &'static str), Extremes> =
    BTreeMap::new();

  for p in parameters {
    let Some(bound) = p.bound() else { continue };
    let value = bound_value(p, bound);
    let entry = groups
      .entry((p.land_use, p.rule_type.variable()))
      .or_default();
    match bound {
      Bound::Min => {
        if entry.min.is_none_or(|(current, _)| value > current) {
          entry.min = Some((value, p.parameter_id));
        }
      }
      Bound::Max => {
        if entry.max.is_none_or(|(current, _)| value < current) {
          entry.max = Some((value, p.parameter_id));
        }
      }
    }
  }

  groups
    .into_iter()
    .filter_map(|((land_use, variable), extremes)| {
      let (min_value, min_parameter_id) = extremes.min?;
      let (max_value, max_parameter_id) = extremes.max?;
      (min_value > max_value).then(|| Conflict {
        kind: ConflictKind::MinExceedsMax,
        message: conflict_message(land_use, variable, min_value, max_value),
        variable: variable.to_owned(),
        land_use,
        min_value,
        max_value,
        min_parameter_id,
        max_parameter_id,
      })
    })
    .collect()
}

fn conflict_message(
  land_use: Option<LandUse>,
  variable: &str,
  min: f64,
  max: f64,
) -> String {
  let scope = land_use.map(|l| format!("{l} ")).unwrap_or_default();
  format!("{scope}minimum {variable} ({min}) exceeds maximum {variable} ({max})")
}
