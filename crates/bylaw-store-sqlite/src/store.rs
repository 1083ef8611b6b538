//! [`SqliteStore`] — the SQLite implementation of [`LegislationStore`].

use std::path::Path;

use bylaw_core::{
  Error as CoreError,
  branch::{self, ApplyChange, Branch, BranchStatus, NewBranch},
  consolidate::{ConsolidateRequest, consolidate},
  legislation::{Legislation, LegislationStatus, NewLegislation},
  merge::{MergeConflict, MergeOutcome, MergeRequest, detect_conflicts, plan_merge},
  parameter::{NewParameter, Parameter},
  schedule::{GisSchedule, NewSchedule},
  store::{BranchQuery, LegislationQuery, LegislationStore, Page, Revised},
  version::{
    NewReview, NewVersion, Version, VersionReview, VersionStage, VersionStatus, ensure_promotable,
  },
};
use chrono::Utc;
use rusqlite::Connection;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{Error, Result, queries, schema::SCHEMA};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A legislation store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, as used by tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread outside any transaction.
  async fn read<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }

  /// Run `f` inside one transaction, committed only if `f` succeeds.
  async fn write<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T> + Send + 'static,
  {
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let out = f(&*tx);
        if out.is_ok() {
          tx.commit()?;
        }
        Ok(out)
      })
      .await?
  }
}

/// Load both sides of a merge. A branch outside the legislation is a
/// malformed request, not a missing resource.
fn merge_pair(conn: &Connection, legislation_id: Uuid, source: Uuid, target: Uuid) -> Result<(Branch, Branch)> {
  let load = |id: Uuid, field: &'static str| -> Result<Branch> {
    queries::load_branch(conn, legislation_id, id)?.ok_or_else(|| {
      CoreError::validation(field, format!("branch {id} does not belong to this legislation"))
        .into()
    })
  };
  Ok((load(source, "sourceBranchId")?, load(target, "targetBranchId")?))
}

fn ensure_active(branch: &Branch) -> Result<()> {
  if branch.is_active() {
    Ok(())
  } else {
    Err(CoreError::MergedBranchFrozen(branch.branch_id).into())
  }
}

// ─── LegislationStore impl ───────────────────────────────────────────────────

impl LegislationStore for SqliteStore {
  type Error = Error;

  // ── Legislation ───────────────────────────────────────────────────────────

  async fn create_legislation(&self, input: NewLegislation) -> Result<Legislation> {
    input.validate()?;
    let now = Utc::now();
    let legislation = Legislation {
      legislation_id:     Uuid::new_v4(),
      title:              input.title.trim().to_owned(),
      jurisdiction:       input.jurisdiction.trim().to_owned(),
      legislation_type:   input.legislation_type,
      effective_from:     input.effective_from,
      effective_to:       input.effective_to,
      status:             LegislationStatus::Draft,
      revision:           0,
      current_version_id: None,
      created_at:         now,
    };
    let main = Branch::main(legislation.legislation_id, now);

    let row = legislation.clone();
    self
      .write(move |tx| {
        queries::insert_legislation(tx, &row)?;
        queries::insert_branch(tx, &main, None)
      })
      .await?;

    info!(legislation_id = %legislation.legislation_id, title = %legislation.title, "created legislation");
    Ok(legislation)
  }

  async fn get_legislation(&self, legislation_id: Uuid) -> Result<Option<Legislation>> {
    debug!(%legislation_id, "get legislation");
    self
      .read(move |conn| queries::load_legislation(conn, legislation_id))
      .await
  }

  async fn list_legislations(&self, query: &LegislationQuery) -> Result<Page<Legislation>> {
    query.validate()?;
    let query = query.clone();
    self
      .read(move |conn| queries::list_legislations(conn, &query))
      .await
  }

  async fn set_legislation_status(
    &self,
    legislation_id: Uuid,
    status: LegislationStatus,
    expected_revision: Option<u64>,
  ) -> Result<Legislation> {
    let legislation = self
      .write(move |tx| {
        let mut l = queries::require_legislation(tx, legislation_id)?;
        l.check_revision(expected_revision)?;
        l.transition_to(status)?;
        if l.status == status {
          return Ok(l);
        }
        l.status = status;
        queries::update_legislation_status(tx, &l)?;
        l.revision = queries::bump_revision(tx, legislation_id)?;
        Ok(l)
      })
      .await?;

    info!(%legislation_id, %status, revision = legislation.revision, "legislation status set");
    Ok(legislation)
  }

  // ── Branches ──────────────────────────────────────────────────────────────

  async fn create_branch(
    &self,
    legislation_id: Uuid,
    input: NewBranch,
  ) -> Result<Revised<Branch>> {
    let branch = self
      .write(move |tx| {
        let l = queries::require_legislation(tx, legislation_id)?;

        if let Some(key) = input.idempotency_key.as_deref()
          && let Some(existing) = queries::branch_by_idempotency_key(tx, legislation_id, key)?
        {
          debug!(%legislation_id, key, "replayed branch create");
          return Ok(Revised::new(existing, l.revision));
        }

        let names = queries::branch_names(tx, legislation_id)?;
        branch::validate_new_branch(&input, names.iter().map(String::as_str))?;

        if let Some(parent) = input.parent_branch_id {
          queries::require_branch(tx, legislation_id, parent)?;
        }
        if let Some(base) = input.base_version_id {
          queries::require_version(tx, legislation_id, base)?;
        }

        let key = input.idempotency_key.clone();
        let branch = input.into_branch(legislation_id, Utc::now());
        queries::insert_branch(tx, &branch, key.as_deref())?;
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(branch, revision))
      })
      .await?;

    info!(%legislation_id, branch_id = %branch.branch_id, name = %branch.name, "created branch");
    Ok(branch)
  }

  async fn get_branch(&self, legislation_id: Uuid, branch_id: Uuid) -> Result<Option<Branch>> {
    debug!(%legislation_id, %branch_id, "get branch");
    self
      .read(move |conn| queries::load_branch(conn, legislation_id, branch_id))
      .await
  }

  async fn list_branches(&self, legislation_id: Uuid, query: &BranchQuery) -> Result<Page<Branch>> {
    query.validate()?;
    let query = query.clone();
    self
      .read(move |conn| {
        queries::require_legislation(conn, legislation_id)?;
        queries::list_branches(conn, legislation_id, &query)
      })
      .await
  }

  async fn delete_branch(&self, legislation_id: Uuid, branch_id: Uuid) -> Result<u64> {
    let revision = self
      .write(move |tx| {
        queries::require_legislation(tx, legislation_id)?;
        let b = queries::require_branch(tx, legislation_id, branch_id)?;
        branch::ensure_deletable(&b)?;
        queries::delete_branch(tx, branch_id)?;
        queries::bump_revision(tx, legislation_id)
      })
      .await?;

    info!(%legislation_id, %branch_id, revision, "deleted branch");
    Ok(revision)
  }

  async fn apply_branch(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    apply: bool,
    expected_revision: Option<u64>,
  ) -> Result<Revised<Branch>> {
    self
      .write(move |tx| {
        let l = queries::require_legislation(tx, legislation_id)?;
        l.check_revision(expected_revision)?;
        let mut b = queries::require_branch(tx, legislation_id, branch_id)?;
        match branch::resolve_apply(&b, apply)? {
          ApplyChange::Unchanged => Ok(Revised::new(b, l.revision)),
          ApplyChange::Set(applied) => {
            queries::set_branch_applied(tx, branch_id, applied)?;
            b.metadata.is_applied = applied;
            let revision = queries::bump_revision(tx, legislation_id)?;
            info!(%legislation_id, %branch_id, applied, revision, "branch applied state changed");
            Ok(Revised::new(b, revision))
          }
        }
      })
      .await
  }

  async fn preview_merge(
    &self,
    legislation_id: Uuid,
    source_branch_id: Uuid,
    target_branch_id: Uuid,
  ) -> Result<Vec<MergeConflict>> {
    self
      .read(move |conn| {
        queries::require_legislation(conn, legislation_id)?;
        let (source, target) =
          merge_pair(conn, legislation_id, source_branch_id, target_branch_id)?;
        let source_params = queries::load_parameters(conn, source.branch_id)?;
        let target_params = queries::load_parameters(conn, target.branch_id)?;
        Ok(detect_conflicts(&source_params, &target_params))
      })
      .await
  }

  async fn merge_branch(
    &self,
    legislation_id: Uuid,
    request: MergeRequest,
  ) -> Result<Revised<MergeOutcome>> {
    let outcome = self
      .write(move |tx| {
        let l = queries::require_legislation(tx, legislation_id)?;
        l.check_revision(request.expected_revision)?;

        let (mut source, target) = merge_pair(
          tx,
          legislation_id,
          request.source_branch_id,
          request.target_branch_id,
        )?;
        branch::validate_merge(&source, &target, &request.merged_by)?;

        let source_params = queries::load_parameters(tx, source.branch_id)?;
        let target_params = queries::load_parameters(tx, target.branch_id)?;
        let plan = plan_merge(&source_params, &target_params, &request.resolutions)?;

        let now = Utc::now();
        for parameter_id in &plan.remove {
          queries::delete_parameter(tx, target.branch_id, *parameter_id)?;
        }
        let absorbed: Vec<Parameter> = plan
          .insert
          .into_iter()
          .map(|p| Parameter {
            parameter_id: Uuid::new_v4(),
            branch_id: target.branch_id,
            created_at: now,
            ..p
          })
          .collect();
        for p in &absorbed {
          queries::insert_parameter(tx, p)?;
        }

        source.status = BranchStatus::Merged {
          merged_at:             now,
          merged_by:             request.merged_by.trim().to_owned(),
          merged_into_branch_id: target.branch_id,
        };
        source.metadata.is_applied = true;
        queries::update_branch_status(tx, &source)?;
        let revision = queries::bump_revision(tx, legislation_id)?;

        Ok(Revised::new(MergeOutcome { source, target, absorbed }, revision))
      })
      .await?;

    info!(
      %legislation_id,
      source = %outcome.source.branch_id,
      target = %outcome.target.branch_id,
      absorbed = outcome.absorbed.len(),
      revision = outcome.revision,
      "merged branch"
    );
    Ok(outcome)
  }

  // ── Parameters ────────────────────────────────────────────────────────────

  async fn add_parameter(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    input: NewParameter,
  ) -> Result<Revised<Parameter>> {
    input.validate()?;
    let parameter = self
      .write(move |tx| {
        queries::require_legislation(tx, legislation_id)?;
        let b = queries::require_branch(tx, legislation_id, branch_id)?;
        ensure_active(&b)?;
        if let Some(schedule_id) = input.schedule_id
          && !queries::schedule_exists(tx, legislation_id, schedule_id)?
        {
          return Err(CoreError::ScheduleNotFound(schedule_id).into());
        }
        let p = input.into_parameter(branch_id, Utc::now());
        queries::insert_parameter(tx, &p)?;
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(p, revision))
      })
      .await?;

    info!(
      %legislation_id,
      %branch_id,
      parameter_id = %parameter.parameter_id,
      rule_type = %parameter.rule_type,
      "added parameter"
    );
    Ok(parameter)
  }

  async fn remove_parameter(
    &self,
    legislation_id: Uuid,
    branch_id: Uuid,
    parameter_id: Uuid,
  ) -> Result<u64> {
    let revision = self
      .write(move |tx| {
        queries::require_legislation(tx, legislation_id)?;
        let b = queries::require_branch(tx, legislation_id, branch_id)?;
        ensure_active(&b)?;
        if !queries::delete_parameter(tx, branch_id, parameter_id)? {
          return Err(CoreError::ParameterNotFound(parameter_id).into());
        }
        queries::bump_revision(tx, legislation_id)
      })
      .await?;

    info!(%legislation_id, %branch_id, %parameter_id, revision, "removed parameter");
    Ok(revision)
  }

  async fn list_parameters(&self, legislation_id: Uuid, branch_id: Uuid) -> Result<Vec<Parameter>> {
    self
      .read(move |conn| {
        queries::require_branch(conn, legislation_id, branch_id)?;
        queries::load_parameters(conn, branch_id)
      })
      .await
  }

  // ── Versions ──────────────────────────────────────────────────────────────

  /// The first published version of a legislation becomes its current
  /// version.
  async fn record_version(
    &self,
    legislation_id: Uuid,
    input: NewVersion,
  ) -> Result<Revised<Version>> {
    input.validate()?;
    let version = self
      .write(move |tx| {
        let l = queries::require_legislation(tx, legislation_id)?;
        let mut v = input.into_version(legislation_id, Utc::now());
        queries::insert_version(tx, &v)?;
        if v.stage == VersionStage::Published && l.current_version_id.is_none() {
          queries::set_current_version(tx, legislation_id, v.version_id)?;
          v.status = VersionStatus::Current;
        }
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(v, revision))
      })
      .await?;

    info!(
      %legislation_id,
      version_id = %version.version_id,
      label = %version.label,
      status = %version.status,
      "recorded version"
    );
    Ok(version)
  }

  async fn get_version(&self, legislation_id: Uuid, version_id: Uuid) -> Result<Option<Version>> {
    self
      .read(move |conn| queries::load_version(conn, legislation_id, version_id))
      .await
  }

  async fn list_versions(&self, legislation_id: Uuid) -> Result<Vec<Version>> {
    self
      .read(move |conn| {
        queries::require_legislation(conn, legislation_id)?;
        queries::load_versions(conn, legislation_id)
      })
      .await
  }

  async fn set_current_version(
    &self,
    legislation_id: Uuid,
    version_id: Uuid,
    expected_revision: Option<u64>,
  ) -> Result<Revised<Version>> {
    let version = self
      .write(move |tx| {
        let l = queries::require_legislation(tx, legislation_id)?;
        l.check_revision(expected_revision)?;
        let v = queries::require_version(tx, legislation_id, version_id)?;
        if l.current_version_id == Some(version_id) {
          return Ok(Revised::new(v, l.revision));
        }
        ensure_promotable(&v)?;
        queries::set_current_version(tx, legislation_id, version_id)?;
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(Version { status: VersionStatus::Current, ..v }, revision))
      })
      .await?;

    info!(%legislation_id, %version_id, "current version set");
    Ok(version)
  }

  async fn review_version(
    &self,
    legislation_id: Uuid,
    version_id: Uuid,
    review: NewReview,
  ) -> Result<Revised<VersionReview>> {
    review.validate()?;
    let review = self
      .write(move |tx| {
        queries::require_legislation(tx, legislation_id)?;
        queries::require_version(tx, legislation_id, version_id)?;
        let r = VersionReview {
          review_id: Uuid::new_v4(),
          version_id,
          decision: review.decision,
          reviewer: review.reviewer.trim().to_owned(),
          note: review.note,
          recorded_at: Utc::now(),
        };
        queries::insert_review(tx, &r)?;
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(r, revision))
      })
      .await?;

    info!(%legislation_id, %version_id, decision = %review.decision, "recorded review");
    Ok(review)
  }

  async fn consolidate_versions(
    &self,
    legislation_id: Uuid,
    request: ConsolidateRequest,
  ) -> Result<Revised<Version>> {
    let version = self
      .write(move |tx| {
        queries::require_legislation(tx, legislation_id)?;
        let available = queries::load_versions(tx, legislation_id)?;
        let v = consolidate(&available, &request)?.into_version(legislation_id, Utc::now());
        queries::insert_version(tx, &v)?;
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(v, revision))
      })
      .await?;

    info!(
      %legislation_id,
      version_id = %version.version_id,
      sources = version.consolidated_from.len(),
      "consolidated versions"
    );
    Ok(version)
  }

  // ── Schedules ─────────────────────────────────────────────────────────────

  async fn add_schedule(
    &self,
    legislation_id: Uuid,
    input: NewSchedule,
  ) -> Result<Revised<GisSchedule>> {
    input.validate()?;
    let schedule = self
      .write(move |tx| {
        queries::require_legislation(tx, legislation_id)?;
        if let Some(linked) = input.linked_schedule_id
          && !queries::schedule_exists(tx, legislation_id, linked)?
        {
          return Err(CoreError::ScheduleNotFound(linked).into());
        }
        let s = input.into_schedule(legislation_id, Utc::now());
        queries::insert_schedule(tx, &s)?;
        let revision = queries::bump_revision(tx, legislation_id)?;
        Ok(Revised::new(s, revision))
      })
      .await?;

    info!(%legislation_id, schedule_id = %schedule.schedule_id, name = %schedule.name, "added schedule");
    Ok(schedule)
  }

  async fn list_schedules(&self, legislation_id: Uuid) -> Result<Vec<GisSchedule>> {
    self
      .read(move |conn| {
        queries::require_legislation(conn, legislation_id)?;
        queries::load_schedules(conn, legislation_id)
      })
      .await
  }
}
