//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings, calendar dates `YYYY-MM-DD`. Closed enums
//! use their snake_case string form. Maps and lists are compact JSON. UUIDs
//! are hyphenated lowercase strings.

use std::{collections::BTreeMap, str::FromStr};

use bylaw_core::{
  branch::{Branch, BranchMetadata, BranchStatus, BranchState},
  legislation::Legislation,
  parameter::Parameter,
  schedule::GisSchedule,
  version::{Version, VersionStage},
};
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use serde::{Serialize, de::DeserializeOwned};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

fn decode_opt_uuid(s: Option<String>) -> Result<Option<Uuid>> {
  s.as_deref().map(decode_uuid).transpose()
}

/// Fixed-width so that string order in SQL matches time order.
pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(format!("timestamp {s:?}: {e}")))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d")
    .map_err(|e| Error::Decode(format!("date {s:?}: {e}")))
}

// ─── Enums & JSON ────────────────────────────────────────────────────────────

pub fn encode_enum<T: Into<&'static str>>(v: T) -> &'static str { v.into() }

pub fn decode_enum<T: FromStr>(column: &str, s: &str) -> Result<T> {
  s.parse()
    .map_err(|_| Error::Decode(format!("unknown {column}: {s:?}")))
}

pub fn encode_json<T: Serialize + ?Sized>(v: &T) -> Result<String> {
  Ok(serde_json::to_string(v)?)
}

pub fn decode_json<T: DeserializeOwned>(s: &str) -> Result<T> {
  Ok(serde_json::from_str(s)?)
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Column list matching [`RawLegislation::from_row`].
pub const LEGISLATION_COLUMNS: &str = "legislation_id, title, jurisdiction, legislation_type,
  effective_from, effective_to, status, revision, current_version_id, created_at";

/// Raw strings read directly from a `legislations` row.
pub struct RawLegislation {
  pub legislation_id:     String,
  pub title:              String,
  pub jurisdiction:       String,
  pub legislation_type:   String,
  pub effective_from:     String,
  pub effective_to:       Option<String>,
  pub status:             String,
  pub revision:           i64,
  pub current_version_id: Option<String>,
  pub created_at:         String,
}

impl RawLegislation {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      legislation_id:     row.get(0)?,
      title:              row.get(1)?,
      jurisdiction:       row.get(2)?,
      legislation_type:   row.get(3)?,
      effective_from:     row.get(4)?,
      effective_to:       row.get(5)?,
      status:             row.get(6)?,
      revision:           row.get(7)?,
      current_version_id: row.get(8)?,
      created_at:         row.get(9)?,
    })
  }

  pub fn into_legislation(self) -> Result<Legislation> {
    Ok(Legislation {
      legislation_id:     decode_uuid(&self.legislation_id)?,
      title:              self.title,
      jurisdiction:       self.jurisdiction,
      legislation_type:   decode_enum("legislation_type", &self.legislation_type)?,
      effective_from:     decode_date(&self.effective_from)?,
      effective_to:       self.effective_to.as_deref().map(decode_date).transpose()?,
      status:             decode_enum("status", &self.status)?,
      revision:           u64::try_from(self.revision)
        .map_err(|_| Error::Decode(format!("negative revision {}", self.revision)))?,
      current_version_id: decode_opt_uuid(self.current_version_id)?,
      created_at:         decode_dt(&self.created_at)?,
    })
  }
}

/// Column list matching [`RawBranch::from_row`].
pub const BRANCH_COLUMNS: &str = "branch_id, legislation_id, name, description, is_main,
  parent_branch_id, base_version_id, created_at, state, merged_at, merged_by,
  merged_into_branch_id, version_label, is_applied, extra";

/// Raw strings read directly from a `branches` row.
pub struct RawBranch {
  pub branch_id:             String,
  pub legislation_id:        String,
  pub name:                  String,
  pub description:           Option<String>,
  pub is_main:               bool,
  pub parent_branch_id:      Option<String>,
  pub base_version_id:       Option<String>,
  pub created_at:            String,
  pub state:                 String,
  pub merged_at:             Option<String>,
  pub merged_by:             Option<String>,
  pub merged_into_branch_id: Option<String>,
  pub version_label:         Option<String>,
  pub is_applied:            bool,
  pub extra:                 String,
}

impl RawBranch {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      branch_id:             row.get(0)?,
      legislation_id:        row.get(1)?,
      name:                  row.get(2)?,
      description:           row.get(3)?,
      is_main:               row.get(4)?,
      parent_branch_id:      row.get(5)?,
      base_version_id:       row.get(6)?,
      created_at:            row.get(7)?,
      state:                 row.get(8)?,
      merged_at:             row.get(9)?,
      merged_by:             row.get(10)?,
      merged_into_branch_id: row.get(11)?,
      version_label:         row.get(12)?,
      is_applied:            row.get(13)?,
      extra:                 row.get(14)?,
    })
  }

  pub fn into_branch(self) -> Result<Branch> {
    let status = match decode_enum::<BranchState>("state", &self.state)? {
      BranchState::Active => BranchStatus::Active,
      BranchState::Merged => {
        let (Some(at), Some(by), Some(into)) =
          (self.merged_at, self.merged_by, self.merged_into_branch_id)
        else {
          return Err(Error::Decode(format!(
            "merged branch {} lacks merge details",
            self.branch_id
          )));
        };
        BranchStatus::Merged {
          merged_at:             decode_dt(&at)?,
          merged_by:             by,
          merged_into_branch_id: decode_uuid(&into)?,
        }
      }
    };

    let extra: BTreeMap<String, String> = decode_json(&self.extra)?;

    Ok(Branch {
      branch_id: decode_uuid(&self.branch_id)?,
      legislation_id: decode_uuid(&self.legislation_id)?,
      name: self.name,
      description: self.description,
      is_main: self.is_main,
      parent_branch_id: decode_opt_uuid(self.parent_branch_id)?,
      base_version_id: decode_opt_uuid(self.base_version_id)?,
      created_at: decode_dt(&self.created_at)?,
      status,
      metadata: BranchMetadata {
        version: self.version_label,
        is_applied: self.is_applied,
        extra,
      },
    })
  }
}

/// Column list matching [`RawParameter::from_row`].
pub const PARAMETER_COLUMNS: &str = "parameter_id, branch_id, schedule_id, rule_type,
  operator, land_use, value, unit, note, created_at";

/// Raw strings read directly from a `parameters` row.
pub struct RawParameter {
  pub parameter_id: String,
  pub branch_id:    String,
  pub schedule_id:  Option<String>,
  pub rule_type:    String,
  pub operator:     String,
  pub land_use:     Option<String>,
  pub value:        String,
  pub unit:         Option<String>,
  pub note:         Option<String>,
  pub created_at:   String,
}

impl RawParameter {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      parameter_id: row.get(0)?,
      branch_id:    row.get(1)?,
      schedule_id:  row.get(2)?,
      rule_type:    row.get(3)?,
      operator:     row.get(4)?,
      land_use:     row.get(5)?,
      value:        row.get(6)?,
      unit:         row.get(7)?,
      note:         row.get(8)?,
      created_at:   row.get(9)?,
    })
  }

  pub fn into_parameter(self) -> Result<Parameter> {
    Ok(Parameter {
      parameter_id: decode_uuid(&self.parameter_id)?,
      branch_id:    decode_uuid(&self.branch_id)?,
      schedule_id:  decode_opt_uuid(self.schedule_id)?,
      rule_type:    decode_enum("rule_type", &self.rule_type)?,
      operator:     decode_enum("operator", &self.operator)?,
      land_use:     self
        .land_use
        .as_deref()
        .map(|l| decode_enum("land_use", l))
        .transpose()?,
      value:        self.value,
      unit:         self.unit,
      note:         self.note,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Version columns with status and approval resolved. Expects `versions v`
/// joined with `legislations l`.
pub const VERSION_COLUMNS: &str = "v.version_id, v.legislation_id, v.label, v.date,
  v.author, v.stage,
  COALESCE(v.version_id = l.current_version_id, 0) AS is_current,
  v.original_value, v.amendment_value,
  COALESCE(
    (SELECT r.decision FROM version_reviews r
      WHERE r.version_id = v.version_id
      ORDER BY r.recorded_at DESC, r.rowid DESC LIMIT 1),
    v.approval_status
  ) AS approval_status,
  v.consolidated_from";

/// Raw strings read from a `versions` row joined with its legislation and
/// latest review.
pub struct RawVersion {
  pub version_id:        String,
  pub legislation_id:    String,
  pub label:             String,
  pub date:              String,
  pub author:            String,
  pub stage:             String,
  pub is_current:        bool,
  pub original_value:    String,
  pub amendment_value:   String,
  pub approval_status:   String,
  pub consolidated_from: String,
}

impl RawVersion {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      version_id:        row.get(0)?,
      legislation_id:    row.get(1)?,
      label:             row.get(2)?,
      date:              row.get(3)?,
      author:            row.get(4)?,
      stage:             row.get(5)?,
      is_current:        row.get(6)?,
      original_value:    row.get(7)?,
      amendment_value:   row.get(8)?,
      approval_status:   row.get(9)?,
      consolidated_from: row.get(10)?,
    })
  }

  pub fn into_version(self) -> Result<Version> {
    let stage: VersionStage = decode_enum("stage", &self.stage)?;
    Ok(Version {
      version_id: decode_uuid(&self.version_id)?,
      legislation_id: decode_uuid(&self.legislation_id)?,
      label: self.label,
      date: decode_dt(&self.date)?,
      author: self.author,
      stage,
      status: stage.resolve(self.is_current),
      original_value: decode_json(&self.original_value)?,
      amendment_value: decode_json(&self.amendment_value)?,
      approval_status: decode_enum("approval_status", &self.approval_status)?,
      consolidated_from: decode_json(&self.consolidated_from)?,
    })
  }
}

/// Column list matching [`RawSchedule::from_row`].
pub const SCHEDULE_COLUMNS: &str = "schedule_id, legislation_id, name, schedule_type,
  description, linked_schedule_id, selected_layers, selected_boundaries, polygons,
  created_at";

/// Raw strings read directly from a `schedules` row.
pub struct RawSchedule {
  pub schedule_id:         String,
  pub legislation_id:      String,
  pub name:                String,
  pub schedule_type:       String,
  pub description:         Option<String>,
  pub linked_schedule_id:  Option<String>,
  pub selected_layers:     String,
  pub selected_boundaries: String,
  pub polygons:            String,
  pub created_at:          String,
}

impl RawSchedule {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      schedule_id:         row.get(0)?,
      legislation_id:      row.get(1)?,
      name:                row.get(2)?,
      schedule_type:       row.get(3)?,
      description:         row.get(4)?,
      linked_schedule_id:  row.get(5)?,
      selected_layers:     row.get(6)?,
      selected_boundaries: row.get(7)?,
      polygons:            row.get(8)?,
      created_at:          row.get(9)?,
    })
  }

  pub fn into_schedule(self) -> Result<GisSchedule> {
    Ok(GisSchedule {
      schedule_id:         decode_uuid(&self.schedule_id)?,
      legislation_id:      decode_uuid(&self.legislation_id)?,
      name:                self.name,
      schedule_type:       decode_enum("schedule_type", &self.schedule_type)?,
      description:         self.description,
      linked_schedule_id:  decode_opt_uuid(self.linked_schedule_id)?,
      selected_layers:     decode_json(&self.selected_layers)?,
      selected_boundaries: decode_json(&self.selected_boundaries)?,
      polygons:            decode_json(&self.polygons)?,
      created_at:          decode_dt(&self.created_at)?,
    })
  }
}
