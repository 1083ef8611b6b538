//! Zoning parameters — single rule entries attached to a branch snapshot and,
//! optionally, to a GIS schedule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Enumerations ────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RuleType {
  MaxHeight,
  MinHeight,
  Setback,
  Coverage,
  Far,
  LotArea,
  Density,
  Frontage,
  Parking,
}

impl RuleType {
  /// The measured quantity this rule constrains. Paired min/max rule types
  /// share one variable.
  pub fn variable(self) -> &'static str {
    match self {
      Self::MaxHeight | Self::MinHeight => "height",
      other => other.into(),
    }
  }
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Operator {
  Equals,
  Greater,
  Less,
  GreaterEqual,
  LessEqual,
  MostRestrictive,
  LessRestrictive,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum LandUse {
  Residential,
  Commercial,
  Industrial,
  Mixed,
  OpenSpace,
  Institutional,
  Agricultural,
}

/// Which side of a range a parameter constrains.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bound {
  Min,
  Max,
}

// ─── Parameter ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Parameter {
  pub parameter_id: Uuid,
  pub branch_id:    Uuid,
  pub schedule_id:  Option<Uuid>,
  pub rule_type:    RuleType,
  pub operator:     Operator,
  /// `None` applies the rule regardless of land use.
  pub land_use:     Option<LandUse>,
  /// The value as entered; usually numeric but kept verbatim.
  pub value:        String,
  pub unit:         Option<String>,
  pub note:         Option<String>,
  pub created_at:   DateTime<Utc>,
}

impl Parameter {
  /// The bound class of this parameter, if it bounds anything.
  ///
  /// Height rules carry their bound in the rule type; every other rule type
  /// takes it from the comparison operator.
  pub fn bound(&self) -> Option<Bound> {
    match self.rule_type {
      RuleType::MinHeight => Some(Bound::Min),
      RuleType::MaxHeight => Some(Bound::Max),
      _ => match self.operator {
        Operator::Greater | Operator::GreaterEqual => Some(Bound::Min),
        Operator::Less | Operator::LessEqual => Some(Bound::Max),
        _ => None,
      },
    }
  }

  pub fn numeric_value(&self) -> Option<f64> {
    self.value.trim().parse::<f64>().ok().filter(|v| v.is_finite())
  }

  /// The value together with its unit, e.g. `30 m`.
  pub fn display_value(&self) -> String {
    match self.unit.as_deref().map(str::trim) {
      Some(unit) if !unit.is_empty() => format!("{} {unit}", self.value.trim()),
      _ => self.value.trim().to_owned(),
    }
  }
}

/// Input to [`crate::store::LegislationStore::add_parameter`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewParameter {
  pub rule_type:   RuleType,
  pub operator:    Operator,
  #[serde(default)]
  pub land_use:    Option<LandUse>,
  pub value:       String,
  #[serde(default)]
  pub unit:        Option<String>,
  #[serde(default)]
  pub note:        Option<String>,
  #[serde(default)]
  pub schedule_id: Option<Uuid>,
}

impl NewParameter {
  pub fn new(rule_type: RuleType, operator: Operator, value: impl Into<String>) -> Self {
    Self {
      rule_type,
      operator,
      land_use: None,
      value: value.into(),
      unit: None,
      note: None,
      schedule_id: None,
    }
  }

  pub fn land_use(mut self, land_use: LandUse) -> Self {
    self.land_use = Some(land_use);
    self
  }

  pub fn unit(mut self, unit: impl Into<String>) -> Self {
    self.unit = Some(unit.into());
    self
  }

  pub fn validate(&self) -> crate::Result<()> {
    if self.value.trim().is_empty() {
      return Err(crate::Error::validation("value", "must not be blank"));
    }
    Ok(())
  }

  /// Materialise into a stored parameter on `branch_id`.
  pub fn into_parameter(self, branch_id: Uuid, now: DateTime<Utc>) -> Parameter {
    Parameter {
      parameter_id: Uuid::new_v4(),
      branch_id,
      schedule_id: self.schedule_id,
      rule_type: self.rule_type,
      operator: self.operator,
      land_use: self.land_use,
      value: self.value,
      unit: self.unit,
      note: self.note,
      created_at: now,
    }
  }
}
