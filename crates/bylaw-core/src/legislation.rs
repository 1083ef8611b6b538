//! Legislation — the root legal document and owner of every other aggregate
//! member (branches, versions, schedules).

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

/// The kind of instrument a legislation record represents.
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
pub enum LegislationType {
  ZoningBylaw,
  OfficialPlan,
  SecondaryPlan,
  SiteSpecific,
  InterimControl,
  Other,
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
pub enum LegislationStatus {
  #[default]
  Draft,
  Active,
  Pending,
  Rejected,
  Cancelled,
}

impl LegislationStatus {
  /// Rejected and cancelled records are kept for the audit trail but never
  /// revived.
  pub fn is_terminal(self) -> bool {
    matches!(self, Self::Rejected | Self::Cancelled)
  }

  pub fn can_transition_to(self, next: Self) -> bool {
    use LegislationStatus::*;
    match (self, next) {
      (a, b) if a == b => true,
      (Draft, Pending | Active | Cancelled) => true,
      (Pending, Active | Rejected | Cancelled) => true,
      (Active, Cancelled) => true,
      _ => false,
    }
  }
}

/// A zoning by-law, official plan, or similar instrument.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Legislation {
  pub legislation_id:     Uuid,
  pub title:              String,
  pub jurisdiction:       String,
  pub legislation_type:   LegislationType,
  pub effective_from:     NaiveDate,
  pub effective_to:       Option<NaiveDate>,
  pub status:             LegislationStatus,
  /// Optimistic-concurrency token; bumped by every write to the aggregate.
  pub revision:           u64,
  pub current_version_id: Option<Uuid>,
  pub created_at:         DateTime<Utc>,
}

impl Legislation {
  /// Fail with [`Error::StaleRevision`] when the caller's view of the
  /// aggregate is out of date. `None` skips the check.
  pub fn check_revision(&self, expected: Option<u64>) -> Result<()> {
    match expected {
      Some(expected) if expected != self.revision => Err(Error::StaleRevision {
        expected,
        actual: self.revision,
      }),
      _ => Ok(()),
    }
  }

  /// Validate a soft status transition.
  pub fn transition_to(&self, next: LegislationStatus) -> Result<()> {
    if self.status.can_transition_to(next) {
      Ok(())
    } else {
      Err(Error::IllegalStatusTransition { from: self.status, to: next })
    }
  }
}

/// Input to [`crate::store::LegislationStore::create_legislation`]. New
/// legislation always starts as a draft.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLegislation {
  pub title:            String,
  pub jurisdiction:     String,
  pub legislation_type: LegislationType,
  pub effective_from:   NaiveDate,
  #[serde(default)]
  pub effective_to:     Option<NaiveDate>,
}

impl NewLegislation {
  pub fn validate(&self) -> Result<()> {
    if self.title.trim().is_empty() {
      return Err(Error::validation("title", "must not be blank"));
    }
    if self.jurisdiction.trim().is_empty() {
      return Err(Error::validation("jurisdiction", "must not be blank"));
    }
    if let Some(to) = self.effective_to
      && to < self.effective_from
    {
      return Err(Error::validation(
        "effectiveTo",
        format!("{to} precedes effectiveFrom {}", self.effective_from),
      ));
    }
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn draft() -> NewLegislation {
    NewLegislation {
      title:            "Comprehensive Zoning By-law 2024-100".into(),
      jurisdiction:     "City of Kingsford".into(),
      legislation_type: LegislationType::ZoningBylaw,
      effective_from:   NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      effective_to:     None,
    }
  }

  #[test]
  fn blank_title_is_rejected() {
    let mut input = draft();
    input.title = "   ".into();
    assert!(matches!(
      input.validate(),
      Err(Error::Validation { field: "title", .. })
    ));
  }

  #[test]
  fn effective_window_must_be_ordered() {
    let mut input = draft();
    input.effective_to = NaiveDate::from_ymd_opt(2023, 12, 31);
    assert!(input.validate().is_err());
    input.effective_to = NaiveDate::from_ymd_opt(2024, 1, 1);
    assert!(input.validate().is_ok());
  }

  #[test]
  fn terminal_statuses_do_not_reopen() {
    use LegislationStatus::*;
    assert!(Draft.can_transition_to(Pending));
    assert!(Pending.can_transition_to(Rejected));
    assert!(Active.can_transition_to(Cancelled));
    assert!(!Cancelled.can_transition_to(Active));
    assert!(!Rejected.can_transition_to(Draft));
    assert!(!Active.can_transition_to(Draft));
    assert!(Cancelled.can_transition_to(Cancelled));
  }

  #[test]
  fn stale_revision_is_a_conflict() {
    let leg = Legislation {
      legislation_id:     Uuid::nil(),
      title:              "t".into(),
      jurisdiction:       "j".into(),
      legislation_type:   LegislationType::OfficialPlan,
      effective_from:     NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
      effective_to:       None,
      status:             LegislationStatus::Draft,
      revision:           4,
      current_version_id: None,
      created_at:         Utc::now(),
    };
    assert!(leg.check_revision(None).is_ok());
    assert!(leg.check_revision(Some(4)).is_ok());
    assert!(matches!(
      leg.check_revision(Some(3)),
      Err(Error::StaleRevision { expected: 3, actual: 4 })
    ));
  }
}
