//! Projection of a branch's lifetime onto a fixed-width month grid.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::branch::Branch;

/// End month used for an active branch when the caller supplies no horizon.
pub const DEFAULT_HORIZON_MONTH: i64 = 7;

/// Width of one month column when the caller does not choose one.
pub const DEFAULT_MONTH_WIDTH: u32 = 40;

const DAYS_PER_MONTH: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineSpan {
  pub start_month:  i64,
  pub end_month:    i64,
  pub offset_units: i64,
  pub width_units:  i64,
}

/// Whole 30-day months from `base` to `at`, rounded towards negative infinity.
fn month_index(base: DateTime<Utc>, at: DateTime<Utc>) -> i64 {
  (at - base).num_days().div_euclid(DAYS_PER_MONTH)
}

/// Place `branch` on a month grid starting at `base_date`.
///
/// The start is clamped to the first column. A merged branch ends at its
/// merge month; an active one ends at `horizon` if given, else at
/// [`DEFAULT_HORIZON_MONTH`]. The end never precedes the start.
pub fn project_timeline(
  branch: &Branch,
  base_date: DateTime<Utc>,
  month_width_units: u32,
  horizon: Option<DateTime<Utc>>,
) -> TimelineSpan {
  let start_month = month_index(base_date, branch.created_at).max(0);

  let end_month = match (branch.merged_at(), horizon) {
    (Some(merged_at), _) => month_index(base_date, merged_at),
    (None, Some(now)) => month_index(base_date, now),
    (None, None) => DEFAULT_HORIZON_MONTH,
  }
  .max(start_month);

  let width = i64::from(month_width_units);
  TimelineSpan {
    start_month,
    end_month,
    offset_units: start_month * width,
    width_units: (end_month - start_month + 1) * width,
  }
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};
  use uuid::Uuid;

  use super::*;
  use crate::branch::{BranchStatus, NewBranch};

  fn base() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() }

  fn branch_created(days_after_base: i64) -> Branch {
    NewBranch::new("heights").into_branch(Uuid::nil(), base() + Duration::days(days_after_base))
  }

  #[test]
  fn active_branch_without_horizon_runs_to_default() {
    let span = project_timeline(&branch_created(45), base(), 10, None);
    assert_eq!(span.start_month, 1);
    assert_eq!(span.end_month, DEFAULT_HORIZON_MONTH);
    assert_eq!(span.offset_units, 10);
    assert_eq!(span.width_units, 70);
  }

  #[test]
  fn merged_branch_ends_at_merge_month() {
    let mut b = branch_created(10);
    b.status = BranchStatus::Merged {
      merged_at:             base() + Duration::days(95),
      merged_by:             "planner".into(),
      merged_into_branch_id: Uuid::new_v4(),
    };
    let span = project_timeline(&b, base(), 10, Some(base() + Duration::days(400)));
    assert_eq!((span.start_month, span.end_month), (0, 3));
  }

  #[test]
  fn horizon_bounds_active_branch() {
    let span =
      project_timeline(&branch_created(0), base(), 1, Some(base() + Duration::days(61)));
    assert_eq!(span.end_month, 2);
  }

  #[test]
  fn branches_before_base_date_clamp_to_zero() {
    let span = project_timeline(&branch_created(-90), base(), 5, None);
    assert_eq!(span.start_month, 0);
    assert_eq!(span.offset_units, 0);
  }

  #[test]
  fn end_never_precedes_start() {
    let span =
      project_timeline(&branch_created(300), base(), 1, Some(base() + Duration::days(30)));
    assert_eq!(span.start_month, 10);
    assert_eq!(span.end_month, 10);
    assert_eq!(span.width_units, 1);
  }

  #[test]
  fn projection_is_deterministic() {
    let b = branch_created(17);
    let first = project_timeline(&b, base(), DEFAULT_MONTH_WIDTH, None);
    for _ in 0..10 {
      assert_eq!(project_timeline(&b, base(), DEFAULT_MONTH_WIDTH, None), first);
    }
  }
}
