//! Synchronous SQL building blocks. Each function runs on the connection
//! thread, usually inside the transaction opened by
//! [`SqliteStore::write`](crate::store::SqliteStore).

use bylaw_core::{
  branch::{Branch, BranchStatus},
  legislation::Legislation,
  parameter::Parameter,
  schedule::GisSchedule,
  store::{BranchQuery, BranchSort, LegislationQuery, Page, SortOrder, page_offset},
  version::{Version, VersionReview},
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    BRANCH_COLUMNS, LEGISLATION_COLUMNS, PARAMETER_COLUMNS, RawBranch, RawLegislation,
    RawParameter, RawSchedule, RawVersion, SCHEDULE_COLUMNS, VERSION_COLUMNS, encode_date,
    encode_dt, encode_enum, encode_json, encode_uuid,
  },
};

// ─── Legislation ─────────────────────────────────────────────────────────────

pub fn insert_legislation(conn: &Connection, l: &Legislation) -> Result<()> {
  conn.execute(
    "INSERT INTO legislations (
       legislation_id, title, jurisdiction, legislation_type, effective_from,
       effective_to, status, revision, current_version_id, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    params![
      encode_uuid(l.legislation_id),
      l.title,
      l.jurisdiction,
      encode_enum(l.legislation_type),
      encode_date(l.effective_from),
      l.effective_to.map(encode_date),
      encode_enum(l.status),
      l.revision as i64,
      l.current_version_id.map(encode_uuid),
      encode_dt(l.created_at),
    ],
  )?;
  Ok(())
}

pub fn load_legislation(conn: &Connection, id: Uuid) -> Result<Option<Legislation>> {
  let raw = conn
    .query_row(
      &format!("SELECT {LEGISLATION_COLUMNS} FROM legislations WHERE legislation_id = ?1"),
      params![encode_uuid(id)],
      RawLegislation::from_row,
    )
    .optional()?;
  raw.map(RawLegislation::into_legislation).transpose()
}

pub fn require_legislation(conn: &Connection, id: Uuid) -> Result<Legislation> {
  load_legislation(conn, id)?.ok_or(Error::Core(bylaw_core::Error::LegislationNotFound(id)))
}

/// Record a write to the aggregate and return the new revision.
pub fn bump_revision(conn: &Connection, id: Uuid) -> Result<u64> {
  let revision: Option<i64> = conn
    .query_row(
      "UPDATE legislations SET revision = revision + 1
       WHERE legislation_id = ?1
       RETURNING revision",
      params![encode_uuid(id)],
      |row| row.get(0),
    )
    .optional()?;
  let revision =
    revision.ok_or(Error::Core(bylaw_core::Error::LegislationNotFound(id)))?;
  u64::try_from(revision).map_err(|_| Error::Decode(format!("negative revision {revision}")))
}

pub fn update_legislation_status(conn: &Connection, l: &Legislation) -> Result<()> {
  conn.execute(
    "UPDATE legislations SET status = ?2 WHERE legislation_id = ?1",
    params![encode_uuid(l.legislation_id), encode_enum(l.status)],
  )?;
  Ok(())
}

pub fn set_current_version(conn: &Connection, legislation_id: Uuid, version_id: Uuid) -> Result<()> {
  conn.execute(
    "UPDATE legislations SET current_version_id = ?2 WHERE legislation_id = ?1",
    params![encode_uuid(legislation_id), encode_uuid(version_id)],
  )?;
  Ok(())
}

/// Escape `LIKE` wildcards so `s` matches literally under `ESCAPE '\'`.
fn escape_like(s: &str) -> String {
  let mut out = String::with_capacity(s.len());
  for c in s.chars() {
    if matches!(c, '%' | '_' | '\\') {
      out.push('\\');
    }
    out.push(c);
  }
  out
}

pub fn list_legislations(conn: &Connection, q: &LegislationQuery) -> Result<Page<Legislation>> {
  let pattern = q
    .search
    .as_deref()
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .map(|s| format!("%{}%", escape_like(&s.to_lowercase())));
  let status = q.status.map(encode_enum);

  let filter = r"(?1 IS NULL
                 OR lower(title) LIKE ?1 ESCAPE '\'
                 OR lower(jurisdiction) LIKE ?1 ESCAPE '\')
                AND (?2 IS NULL OR status = ?2)";

  let total: i64 = conn.query_row(
    &format!("SELECT COUNT(*) FROM legislations WHERE {filter}"),
    params![pattern, status],
    |row| row.get(0),
  )?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {LEGISLATION_COLUMNS} FROM legislations
     WHERE {filter}
     ORDER BY created_at DESC, rowid DESC
     LIMIT ?3 OFFSET ?4"
  ))?;
  let raws = stmt
    .query_map(
      params![pattern, status, q.limit, page_offset(q.page, q.limit) as i64],
      RawLegislation::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Page {
    items: raws
      .into_iter()
      .map(RawLegislation::into_legislation)
      .collect::<Result<_>>()?,
    total: total as u64,
    page:  q.page,
    limit: q.limit,
  })
}

// ─── Branches ────────────────────────────────────────────────────────────────

pub fn insert_branch(conn: &Connection, b: &Branch, idempotency_key: Option<&str>) -> Result<()> {
  conn.execute(
    "INSERT INTO branches (
       branch_id, legislation_id, name, description, is_main, parent_branch_id,
       base_version_id, created_at, state, version_label, is_applied, extra,
       idempotency_key
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)",
    params![
      encode_uuid(b.branch_id),
      encode_uuid(b.legislation_id),
      b.name,
      b.description,
      b.is_main,
      b.parent_branch_id.map(encode_uuid),
      b.base_version_id.map(encode_uuid),
      encode_dt(b.created_at),
      encode_enum(b.status.state()),
      b.metadata.version,
      b.metadata.is_applied,
      encode_json(&b.metadata.extra)?,
      idempotency_key,
    ],
  )?;
  Ok(())
}

pub fn load_branch(conn: &Connection, legislation_id: Uuid, branch_id: Uuid) -> Result<Option<Branch>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {BRANCH_COLUMNS} FROM branches
         WHERE legislation_id = ?1 AND branch_id = ?2"
      ),
      params![encode_uuid(legislation_id), encode_uuid(branch_id)],
      RawBranch::from_row,
    )
    .optional()?;
  raw.map(RawBranch::into_branch).transpose()
}

pub fn require_branch(conn: &Connection, legislation_id: Uuid, branch_id: Uuid) -> Result<Branch> {
  load_branch(conn, legislation_id, branch_id)?
    .ok_or(Error::Core(bylaw_core::Error::BranchNotFound(branch_id)))
}

pub fn branch_by_idempotency_key(
  conn: &Connection,
  legislation_id: Uuid,
  key: &str,
) -> Result<Option<Branch>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {BRANCH_COLUMNS} FROM branches
         WHERE legislation_id = ?1 AND idempotency_key = ?2"
      ),
      params![encode_uuid(legislation_id), key],
      RawBranch::from_row,
    )
    .optional()?;
  raw.map(RawBranch::into_branch).transpose()
}

pub fn branch_names(conn: &Connection, legislation_id: Uuid) -> Result<Vec<String>> {
  let mut stmt = conn.prepare("SELECT name FROM branches WHERE legislation_id = ?1")?;
  let names = stmt
    .query_map(params![encode_uuid(legislation_id)], |row| row.get(0))?
    .collect::<rusqlite::Result<Vec<String>>>()?;
  Ok(names)
}

pub fn set_branch_applied(conn: &Connection, branch_id: Uuid, applied: bool) -> Result<()> {
  conn.execute(
    "UPDATE branches SET is_applied = ?2 WHERE branch_id = ?1",
    params![encode_uuid(branch_id), applied],
  )?;
  Ok(())
}

/// Persist a branch's status and applied flag.
pub fn update_branch_status(conn: &Connection, b: &Branch) -> Result<()> {
  let (merged_at, merged_by, merged_into) = match &b.status {
    BranchStatus::Active => (None, None, None),
    BranchStatus::Merged { merged_at, merged_by, merged_into_branch_id } => (
      Some(encode_dt(*merged_at)),
      Some(merged_by.clone()),
      Some(encode_uuid(*merged_into_branch_id)),
    ),
  };
  conn.execute(
    "UPDATE branches
     SET state = ?2, merged_at = ?3, merged_by = ?4, merged_into_branch_id = ?5,
         is_applied = ?6
     WHERE branch_id = ?1",
    params![
      encode_uuid(b.branch_id),
      encode_enum(b.status.state()),
      merged_at,
      merged_by,
      merged_into,
      b.metadata.is_applied,
    ],
  )?;
  Ok(())
}

pub fn delete_branch(conn: &Connection, branch_id: Uuid) -> Result<()> {
  conn.execute("DELETE FROM branches WHERE branch_id = ?1", params![encode_uuid(branch_id)])?;
  Ok(())
}

pub fn list_branches(conn: &Connection, legislation_id: Uuid, q: &BranchQuery) -> Result<Page<Branch>> {
  let status = q.status.map(encode_enum);
  let column = match q.sort_by {
    BranchSort::CreatedAt => "created_at",
    BranchSort::Name => "name COLLATE NOCASE",
    BranchSort::Status => "state",
  };
  let direction = match q.sort_order {
    SortOrder::Asc => "ASC",
    SortOrder::Desc => "DESC",
  };

  let total: i64 = conn.query_row(
    "SELECT COUNT(*) FROM branches
     WHERE legislation_id = ?1 AND (?2 IS NULL OR state = ?2)",
    params![encode_uuid(legislation_id), status],
    |row| row.get(0),
  )?;

  let mut stmt = conn.prepare(&format!(
    "SELECT {BRANCH_COLUMNS} FROM branches
     WHERE legislation_id = ?1 AND (?2 IS NULL OR state = ?2)
     ORDER BY {column} {direction}, rowid {direction}
     LIMIT ?3 OFFSET ?4"
  ))?;
  let raws = stmt
    .query_map(
      params![
        encode_uuid(legislation_id),
        status,
        q.limit,
        page_offset(q.page, q.limit) as i64
      ],
      RawBranch::from_row,
    )?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  Ok(Page {
    items: raws.into_iter().map(RawBranch::into_branch).collect::<Result<_>>()?,
    total: total as u64,
    page:  q.page,
    limit: q.limit,
  })
}

// ─── Parameters ──────────────────────────────────────────────────────────────

pub fn insert_parameter(conn: &Connection, p: &Parameter) -> Result<()> {
  conn.execute(
    "INSERT INTO parameters (
       parameter_id, branch_id, schedule_id, rule_type, operator, land_use,
       value, unit, note, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    params![
      encode_uuid(p.parameter_id),
      encode_uuid(p.branch_id),
      p.schedule_id.map(encode_uuid),
      encode_enum(p.rule_type),
      encode_enum(p.operator),
      p.land_use.map(encode_enum),
      p.value,
      p.unit,
      p.note,
      encode_dt(p.created_at),
    ],
  )?;
  Ok(())
}

/// Returns whether a row was removed.
pub fn delete_parameter(conn: &Connection, branch_id: Uuid, parameter_id: Uuid) -> Result<bool> {
  let n = conn.execute(
    "DELETE FROM parameters WHERE branch_id = ?1 AND parameter_id = ?2",
    params![encode_uuid(branch_id), encode_uuid(parameter_id)],
  )?;
  Ok(n > 0)
}

pub fn load_parameters(conn: &Connection, branch_id: Uuid) -> Result<Vec<Parameter>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {PARAMETER_COLUMNS} FROM parameters
     WHERE branch_id = ?1
     ORDER BY created_at, rowid"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(branch_id)], RawParameter::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawParameter::into_parameter).collect()
}

// ─── Versions ────────────────────────────────────────────────────────────────

pub fn insert_version(conn: &Connection, v: &Version) -> Result<()> {
  conn.execute(
    "INSERT INTO versions (
       version_id, legislation_id, label, date, author, stage, original_value,
       amendment_value, approval_status, consolidated_from
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    params![
      encode_uuid(v.version_id),
      encode_uuid(v.legislation_id),
      v.label,
      encode_dt(v.date),
      v.author,
      encode_enum(v.stage),
      encode_json(&v.original_value)?,
      encode_json(&v.amendment_value)?,
      encode_enum(v.approval_status),
      encode_json(&v.consolidated_from)?,
    ],
  )?;
  Ok(())
}

pub fn load_version(conn: &Connection, legislation_id: Uuid, version_id: Uuid) -> Result<Option<Version>> {
  let raw = conn
    .query_row(
      &format!(
        "SELECT {VERSION_COLUMNS}
         FROM versions v JOIN legislations l ON l.legislation_id = v.legislation_id
         WHERE v.legislation_id = ?1 AND v.version_id = ?2"
      ),
      params![encode_uuid(legislation_id), encode_uuid(version_id)],
      RawVersion::from_row,
    )
    .optional()?;
  raw.map(RawVersion::into_version).transpose()
}

pub fn require_version(conn: &Connection, legislation_id: Uuid, version_id: Uuid) -> Result<Version> {
  load_version(conn, legislation_id, version_id)?
    .ok_or(Error::Core(bylaw_core::Error::VersionNotFound(version_id)))
}

/// Every version of a legislation, oldest first.
pub fn load_versions(conn: &Connection, legislation_id: Uuid) -> Result<Vec<Version>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {VERSION_COLUMNS}
     FROM versions v JOIN legislations l ON l.legislation_id = v.legislation_id
     WHERE v.legislation_id = ?1
     ORDER BY v.date, v.rowid"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(legislation_id)], RawVersion::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawVersion::into_version).collect()
}

pub fn insert_review(conn: &Connection, r: &VersionReview) -> Result<()> {
  conn.execute(
    "INSERT INTO version_reviews (review_id, version_id, decision, reviewer, note, recorded_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      encode_uuid(r.review_id),
      encode_uuid(r.version_id),
      encode_enum(r.decision),
      r.reviewer,
      r.note,
      encode_dt(r.recorded_at),
    ],
  )?;
  Ok(())
}

// ─── Schedules ───────────────────────────────────────────────────────────────

pub fn insert_schedule(conn: &Connection, s: &GisSchedule) -> Result<()> {
  conn.execute(
    "INSERT INTO schedules (
       schedule_id, legislation_id, name, schedule_type, description,
       linked_schedule_id, selected_layers, selected_boundaries, polygons, created_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
    params![
      encode_uuid(s.schedule_id),
      encode_uuid(s.legislation_id),
      s.name,
      encode_enum(s.schedule_type),
      s.description,
      s.linked_schedule_id.map(encode_uuid),
      encode_json(&s.selected_layers)?,
      encode_json(&s.selected_boundaries)?,
      encode_json(&s.polygons)?,
      encode_dt(s.created_at),
    ],
  )?;
  Ok(())
}

pub fn schedule_exists(conn: &Connection, legislation_id: Uuid, schedule_id: Uuid) -> Result<bool> {
  Ok(
    conn
      .query_row(
        "SELECT 1 FROM schedules WHERE legislation_id = ?1 AND schedule_id = ?2",
        params![encode_uuid(legislation_id), encode_uuid(schedule_id)],
        |_| Ok(()),
      )
      .optional()?
      .is_some(),
  )
}

pub fn load_schedules(conn: &Connection, legislation_id: Uuid) -> Result<Vec<GisSchedule>> {
  let mut stmt = conn.prepare(&format!(
    "SELECT {SCHEDULE_COLUMNS} FROM schedules
     WHERE legislation_id = ?1
     ORDER BY created_at, rowid"
  ))?;
  let raws = stmt
    .query_map(params![encode_uuid(legislation_id)], RawSchedule::from_row)?
    .collect::<rusqlite::Result<Vec<_>>>()?;
  raws.into_iter().map(RawSchedule::into_schedule).collect()
}
