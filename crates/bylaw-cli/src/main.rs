//! `bylaw` — command-line client for the Bylaw legislation API.
//!
//! # Usage
//!
//! ```text
//! bylaw --url http://localhost:3000 legislation list
//! bylaw branch create <LEGISLATION> height-review --description "raise limits"
//! bylaw branch merge <LEGISLATION> <SOURCE> <TARGET> --by planner --take max_height:residential=source
//! bylaw --config ~/.config/bylaw/config.toml version list <LEGISLATION>
//! ```

mod client;
mod state;

use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Context, Result, anyhow};
use bylaw_core::{
  branch::{BranchState, NewBranch},
  consolidate::ConsolidateRequest,
  legislation::{LegislationStatus, LegislationType, NewLegislation},
  merge::{MergeRequest, Resolution, Side},
  parameter::{LandUse, NewParameter, Operator, RuleType},
  schedule::NewSchedule,
  store::{BranchQuery, BranchSort, LegislationQuery, SortOrder},
  version::{ApprovalStatus, NewReview, NewVersion, VersionStage},
  wms::{BoundingBox, FeatureInfoRequest},
};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig, ClientError};
use serde::{Deserialize, Serialize};
use state::{AppliedBranches, BranchBrowser, BranchListing};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "bylaw", about = "Command-line client for the Bylaw legislation API")]
struct Args {
  /// Path to a TOML config file (url, token).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the bylaw server (default: http://localhost:3000).
  #[arg(long, env = "BYLAW_URL")]
  url: Option<String>,

  /// Bearer token sent with every API request.
  #[arg(long, env = "BYLAW_TOKEN", hide_env_values = true)]
  token: Option<String>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Legislation records.
  #[command(subcommand)]
  Legislation(LegislationCmd),
  /// Branches of one legislation.
  #[command(subcommand)]
  Branch(BranchCmd),
  /// Parameters of one branch.
  #[command(subcommand)]
  Param(ParamCmd),
  /// The version log of one legislation.
  #[command(subcommand)]
  Version(VersionCmd),
  /// GIS schedules attached to a legislation.
  #[command(subcommand)]
  Schedule(ScheduleCmd),
  /// Query a WMS server for the features under one map pixel.
  Identify(IdentifyArgs),
}

#[derive(Subcommand, Debug)]
enum LegislationCmd {
  List {
    #[arg(long)]
    search: Option<String>,
    #[arg(long)]
    status: Option<LegislationStatus>,
    #[arg(long, default_value_t = 1)]
    page:   u32,
    #[arg(long, default_value_t = 20)]
    limit:  u32,
  },
  Show {
    id: Uuid,
  },
  Create {
    #[arg(long)]
    title:          String,
    #[arg(long)]
    jurisdiction:   String,
    #[arg(long = "type", default_value = "zoning_bylaw")]
    kind:           LegislationType,
    #[arg(long)]
    effective_from: NaiveDate,
    #[arg(long)]
    effective_to:   Option<NaiveDate>,
  },
  /// Move a legislation to a new status.
  Status {
    id:       Uuid,
    status:   LegislationStatus,
    /// Fail unless the legislation is still at this revision.
    #[arg(long)]
    revision: Option<u64>,
  },
}

#[derive(Subcommand, Debug)]
enum BranchCmd {
  List {
    legislation: Uuid,
    #[arg(long)]
    status:      Option<BranchState>,
    #[arg(long, value_parser = parse_sort)]
    sort_by:     Option<BranchSort>,
    #[arg(long)]
    asc:         bool,
    #[arg(long, default_value_t = 1)]
    page:        u32,
    #[arg(long, default_value_t = 20)]
    limit:       u32,
  },
  Create {
    legislation: Uuid,
    name:        String,
    #[arg(long)]
    description: Option<String>,
    #[arg(long)]
    parent:      Option<Uuid>,
    #[arg(long)]
    base:        Option<Uuid>,
    #[arg(long)]
    version:     Option<String>,
  },
  Delete {
    legislation: Uuid,
    branch:      Uuid,
  },
  /// Flip whether a branch is applied.
  Toggle {
    legislation: Uuid,
    branch:      Uuid,
  },
  /// Show the conflicts a merge would hit.
  Preview {
    legislation: Uuid,
    source:      Uuid,
    target:      Uuid,
  },
  Merge {
    legislation: Uuid,
    source:      Uuid,
    target:      Uuid,
    #[arg(long = "by")]
    merged_by:   String,
    /// `rule[:land_use]=source|target`, once per conflict.
    #[arg(long = "take", value_parser = parse_resolution)]
    resolutions: Vec<Resolution>,
    #[arg(long)]
    revision:    Option<u64>,
  },
  /// Logical conflicts within a branch's parameters.
  Conflicts {
    legislation: Uuid,
    branch:      Uuid,
  },
  Timeline {
    legislation: Uuid,
    branch:      Uuid,
    #[arg(long)]
    base_date:   Option<DateTime<Utc>>,
    #[arg(long)]
    month_width: Option<u32>,
    #[arg(long)]
    horizon:     Option<DateTime<Utc>>,
  },
}

#[derive(Subcommand, Debug)]
enum ParamCmd {
  List {
    legislation: Uuid,
    branch:      Uuid,
  },
  Add {
    legislation: Uuid,
    branch:      Uuid,
    rule:        RuleType,
    operator:    Operator,
    value:       String,
    #[arg(long)]
    land_use:    Option<LandUse>,
    #[arg(long)]
    unit:        Option<String>,
    #[arg(long)]
    note:        Option<String>,
    #[arg(long)]
    schedule:    Option<Uuid>,
  },
  Remove {
    legislation: Uuid,
    branch:      Uuid,
    parameter:   Uuid,
  },
}

#[derive(Subcommand, Debug)]
enum VersionCmd {
  List {
    legislation: Uuid,
  },
  Record {
    legislation: Uuid,
    label:       String,
    #[arg(long)]
    author:      String,
    #[arg(long)]
    published:   bool,
    /// `field=text`, repeatable.
    #[arg(long = "amend", value_parser = parse_pair)]
    amendments:  Vec<(String, String)>,
    /// `field=text`, repeatable.
    #[arg(long = "original", value_parser = parse_pair)]
    originals:   Vec<(String, String)>,
  },
  /// Make a published version current, or restore an older one.
  Current {
    legislation: Uuid,
    version:     Uuid,
    #[arg(long)]
    revision:    Option<u64>,
  },
  Review {
    legislation: Uuid,
    version:     Uuid,
    decision:    ApprovalStatus,
    #[arg(long)]
    reviewer:    String,
    #[arg(long)]
    note:        Option<String>,
  },
  Consolidate {
    legislation: Uuid,
    #[arg(required = true, num_args = 2..)]
    versions:    Vec<Uuid>,
    #[arg(long)]
    author:      String,
    #[arg(long)]
    label:       Option<String>,
  },
}

#[derive(Subcommand, Debug)]
enum ScheduleCmd {
  List {
    legislation: Uuid,
  },
  /// Attach a schedule described by a JSON file.
  Add {
    legislation: Uuid,
    #[arg(value_name = "FILE")]
    file:        PathBuf,
  },
}

#[derive(clap::Args, Debug)]
struct IdentifyArgs {
  /// WMS endpoint, e.g. https://maps.example.org/wms
  #[arg(long)]
  wms_url: String,
  #[arg(long = "layer", required = true)]
  layers:  Vec<String>,
  /// `west,south,east,north` in degrees.
  #[arg(long, value_parser = parse_bbox)]
  bbox:    BoundingBox,
  /// Map size in pixels, `WIDTHxHEIGHT`.
  #[arg(long, value_parser = parse_size, default_value = "800x600")]
  size:    (u32, u32),
  /// Pixel to query, `I,J`.
  #[arg(long, value_parser = parse_pixel)]
  pixel:   (u32, u32),
}

// ─── Argument parsers ─────────────────────────────────────────────────────────

fn parse_sort(s: &str) -> Result<BranchSort, String> {
  match s {
    "created" | "createdAt" | "created_at" => Ok(BranchSort::CreatedAt),
    "name" => Ok(BranchSort::Name),
    "status" => Ok(BranchSort::Status),
    other => Err(format!("unknown sort key {other:?}")),
  }
}

fn parse_pair(s: &str) -> Result<(String, String), String> {
  s.split_once('=')
    .map(|(k, v)| (k.trim().to_string(), v.to_string()))
    .ok_or_else(|| format!("expected field=text, got {s:?}"))
}

fn parse_resolution(s: &str) -> Result<Resolution, String> {
  let (key, side) = s
    .split_once('=')
    .ok_or_else(|| format!("expected rule[:land_use]=source|target, got {s:?}"))?;
  let (rule, land_use) = match key.split_once(':') {
    Some((rule, land_use)) => (rule, Some(land_use)),
    None => (key, None),
  };
  let take = match side {
    "source" => Side::Source,
    "target" => Side::Target,
    other => return Err(format!("side must be source or target, got {other:?}")),
  };
  Ok(Resolution {
    rule_type: rule.parse().map_err(|_| format!("unknown rule type {rule:?}"))?,
    land_use: land_use
      .map(|l| l.parse().map_err(|_| format!("unknown land use {l:?}")))
      .transpose()?,
    take,
  })
}

fn parse_numbers<const N: usize>(s: &str, sep: char) -> Result<[f64; N], String> {
  let values: Vec<f64> = s
    .split(sep)
    .map(|p| p.trim().parse::<f64>().map_err(|e| format!("{p:?}: {e}")))
    .collect::<Result<_, _>>()?;
  values
    .try_into()
    .map_err(|_| format!("expected {N} values separated by {sep:?}"))
}

fn parse_bbox(s: &str) -> Result<BoundingBox, String> {
  let [west, south, east, north] = parse_numbers::<4>(s, ',')?;
  Ok(BoundingBox { west, south, east, north })
}

fn parse_size(s: &str) -> Result<(u32, u32), String> {
  let (w, h) = s.split_once('x').ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
  Ok((
    w.parse().map_err(|e| format!("width: {e}"))?,
    h.parse().map_err(|e| format!("height: {e}"))?,
  ))
}

fn parse_pixel(s: &str) -> Result<(u32, u32), String> {
  let (i, j) = s.split_once(',').ok_or_else(|| format!("expected I,J, got {s:?}"))?;
  Ok((
    i.trim().parse().map_err(|e| format!("i: {e}"))?,
    j.trim().parse().map_err(|e| format!("j: {e}"))?,
  ))
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default)]
struct ConfigFile {
  #[serde(default)]
  url:   String,
  #[serde(default)]
  token: String,
}

fn api_config(args: &Args) -> Result<ApiConfig> {
  let file_cfg: ConfigFile = if let Some(path) = &args.config {
    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("reading config file {}", path.display()))?;
    toml::from_str(&raw).context("parsing config file")?
  } else {
    ConfigFile::default()
  };

  // CLI flags and env override the config file, which overrides defaults.
  Ok(ApiConfig {
    base_url: args
      .url
      .clone()
      .or_else(|| (!file_cfg.url.is_empty()).then(|| file_cfg.url.clone()))
      .unwrap_or_else(|| "http://localhost:3000".to_string()),
    token:    args
      .token
      .clone()
      .or_else(|| (!file_cfg.token.is_empty()).then(|| file_cfg.token.clone()))
      .unwrap_or_default(),
  })
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy(),
    )
    .init();

  let args = Args::parse();
  let client = ApiClient::new(api_config(&args)?)?;

  match args.command {
    Command::Legislation(cmd) => legislation(&client, cmd).await,
    Command::Branch(cmd) => branch(client, cmd).await,
    Command::Param(cmd) => param(&client, cmd).await,
    Command::Version(cmd) => version(&client, cmd).await,
    Command::Schedule(cmd) => schedule(&client, cmd).await,
    Command::Identify(cmd) => identify(&client, cmd).await,
  }
}

fn print_json(value: &impl Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

/// Turn a client error into a user-facing message, listing merge conflicts.
fn report(e: ClientError) -> anyhow::Error {
  if let ClientError::Conflict { conflicts, .. } = &e {
    for c in conflicts {
      let land_use = c.land_use.map(|l| l.to_string()).unwrap_or_else(|| "any".into());
      eprintln!(
        "  {} ({land_use}): source {:?} vs target {:?}",
        c.rule_type, c.source_values, c.target_values
      );
    }
  }
  anyhow!("[{}] {e}", e.kind())
}

// ─── Commands ─────────────────────────────────────────────────────────────────

async fn legislation(client: &ApiClient, cmd: LegislationCmd) -> Result<()> {
  match cmd {
    LegislationCmd::List { search, status, page, limit } => {
      let query = LegislationQuery { search, status, page, limit };
      let listing = client.list_legislations(&query).await.map_err(report)?;
      for l in &listing.items {
        println!(
          "{}  r{:<4} {:<10} {} ({})",
          l.legislation_id, l.revision, l.status, l.title, l.jurisdiction
        );
      }
      println!("page {} · {} of {}", listing.page, listing.items.len(), listing.total);
      Ok(())
    }
    LegislationCmd::Show { id } => print_json(&client.get_legislation(id).await.map_err(report)?),
    LegislationCmd::Create { title, jurisdiction, kind, effective_from, effective_to } => {
      let input = NewLegislation {
        title,
        jurisdiction,
        legislation_type: kind,
        effective_from,
        effective_to,
      };
      print_json(&client.create_legislation(&input).await.map_err(report)?)
    }
    LegislationCmd::Status { id, status, revision } => print_json(
      &client
        .set_legislation_status(id, status, revision)
        .await
        .map_err(report)?,
    ),
  }
}

async fn branch(client: ApiClient, cmd: BranchCmd) -> Result<()> {
  match cmd {
    BranchCmd::List { legislation, status, sort_by, asc, page, limit } => {
      let query = BranchQuery {
        status,
        page,
        limit,
        sort_by: sort_by.unwrap_or_default(),
        sort_order: if asc { SortOrder::Asc } else { SortOrder::Desc },
      };
      let mut browser = BranchBrowser::new(client, legislation);
      let listing = browser.refresh(&query).await.map_err(report)?;
      if let BranchListing::Fallback { reason, .. } = &listing {
        eprintln!("server unavailable ({reason}); showing last known branches");
      }
      for b in listing.items() {
        let marker = if b.is_main { "*" } else { " " };
        let applied = if b.is_applied() { "applied" } else { "" };
        println!("{marker} {}  {:<7} {:<7} {}", b.branch_id, b.status.state(), applied, b.name);
      }
      if let BranchListing::Live(page) = &listing {
        println!("page {} · {} of {}", page.page, page.items.len(), page.total);
      }
      Ok(())
    }
    BranchCmd::Create { legislation, name, description, parent, base, version } => {
      let input = NewBranch {
        name,
        description,
        parent_branch_id: parent,
        base_version_id: base,
        version_label: version,
        idempotency_key: None,
      };
      print_json(&client.create_branch(legislation, input).await.map_err(report)?)
    }
    BranchCmd::Delete { legislation, branch } => {
      client.delete_branch(legislation, branch).await.map_err(report)?;
      println!("deleted {branch}");
      Ok(())
    }
    BranchCmd::Toggle { legislation, branch } => {
      let mut applied = AppliedBranches::for_branch(&client, legislation, branch)
        .await
        .map_err(report)?;
      let now = applied.toggle(&client, legislation, branch).await.map_err(report)?;
      tracing::debug!(revision = ?applied.revision(), "toggle committed");
      println!("{branch} {}", if now { "applied" } else { "not applied" });
      Ok(())
    }
    BranchCmd::Preview { legislation, source, target } => {
      let conflicts = client.preview_merge(legislation, source, target).await.map_err(report)?;
      if conflicts.is_empty() {
        println!("no conflicts");
        return Ok(());
      }
      print_json(&conflicts)
    }
    BranchCmd::Merge { legislation, source, target, merged_by, resolutions, revision } => {
      let request = MergeRequest {
        source_branch_id: source,
        target_branch_id: target,
        merged_by,
        resolutions,
        expected_revision: revision,
      };
      print_json(&client.merge_branch(legislation, &request).await.map_err(report)?)
    }
    BranchCmd::Conflicts { legislation, branch } => {
      let conflicts = client.conflicts(legislation, branch).await.map_err(report)?;
      for c in &conflicts {
        println!("{}", c.message);
      }
      if conflicts.is_empty() {
        println!("no conflicts");
      }
      Ok(())
    }
    BranchCmd::Timeline { legislation, branch, base_date, month_width, horizon } => print_json(
      &client
        .timeline(legislation, branch, base_date, month_width, horizon)
        .await
        .map_err(report)?,
    ),
  }
}

async fn param(client: &ApiClient, cmd: ParamCmd) -> Result<()> {
  match cmd {
    ParamCmd::List { legislation, branch } => {
      for p in client.list_parameters(legislation, branch).await.map_err(report)? {
        let land_use = p.land_use.map(|l| l.to_string()).unwrap_or_default();
        println!(
          "{}  {:<10} {:<14} {:<12} {}",
          p.parameter_id,
          p.rule_type,
          p.operator,
          land_use,
          p.display_value()
        );
      }
      Ok(())
    }
    ParamCmd::Add {
      legislation,
      branch,
      rule,
      operator,
      value,
      land_use,
      unit,
      note,
      schedule,
    } => {
      let input = NewParameter {
        rule_type: rule,
        operator,
        land_use,
        value,
        unit,
        note,
        schedule_id: schedule,
      };
      print_json(&client.add_parameter(legislation, branch, &input).await.map_err(report)?)
    }
    ParamCmd::Remove { legislation, branch, parameter } => {
      client
        .remove_parameter(legislation, branch, parameter)
        .await
        .map_err(report)?;
      println!("removed {parameter}");
      Ok(())
    }
  }
}

async fn version(client: &ApiClient, cmd: VersionCmd) -> Result<()> {
  match cmd {
    VersionCmd::List { legislation } => {
      for v in client.list_versions(legislation).await.map_err(report)? {
        println!(
          "{}  {:<10} {:<9} {:<8} {} by {}",
          v.version_id,
          v.label,
          v.status,
          v.approval_status,
          v.date.format("%Y-%m-%d"),
          v.author
        );
      }
      Ok(())
    }
    VersionCmd::Record {
      legislation,
      label,
      author,
      published,
      amendments,
      originals,
    } => {
      let input = NewVersion {
        label,
        author,
        stage: if published { VersionStage::Published } else { VersionStage::Draft },
        amendment_value: amendments.into_iter().collect::<BTreeMap<_, _>>(),
        original_value: originals.into_iter().collect::<BTreeMap<_, _>>(),
        ..Default::default()
      };
      print_json(&client.record_version(legislation, &input).await.map_err(report)?)
    }
    VersionCmd::Current { legislation, version, revision } => print_json(
      &client
        .set_current_version(legislation, version, revision)
        .await
        .map_err(report)?,
    ),
    VersionCmd::Review { legislation, version, decision, reviewer, note } => {
      let review = NewReview { decision, reviewer, note };
      print_json(&client.review_version(legislation, version, &review).await.map_err(report)?)
    }
    VersionCmd::Consolidate { legislation, versions, author, label } => {
      let request = ConsolidateRequest { version_ids: versions, author, label };
      print_json(
        &client
          .consolidate_versions(legislation, &request)
          .await
          .map_err(report)?,
      )
    }
  }
}

async fn schedule(client: &ApiClient, cmd: ScheduleCmd) -> Result<()> {
  match cmd {
    ScheduleCmd::List { legislation } => {
      print_json(&client.list_schedules(legislation).await.map_err(report)?)
    }
    ScheduleCmd::Add { legislation, file } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading schedule file {}", file.display()))?;
      let input: NewSchedule = serde_json::from_str(&raw).context("parsing schedule file")?;
      input.validate().map_err(|e| report(e.into()))?;
      print_json(&client.add_schedule(legislation, &input).await.map_err(report)?)
    }
  }
}

async fn identify(client: &ApiClient, args: IdentifyArgs) -> Result<()> {
  let request = FeatureInfoRequest::new(args.layers, args.bbox, args.size, args.pixel);
  let features = client.identify(&args.wms_url, &request).await.map_err(report)?;
  print_json(&features)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolutions_parse_with_and_without_land_use() {
    let r = parse_resolution("max_height:residential=source").unwrap();
    assert_eq!(r.rule_type, RuleType::MaxHeight);
    assert_eq!(r.land_use, Some(LandUse::Residential));
    assert_eq!(r.take, Side::Source);

    let r = parse_resolution("setback=target").unwrap();
    assert_eq!(r.land_use, None);
    assert_eq!(r.take, Side::Target);

    assert!(parse_resolution("setback=both").is_err());
    assert!(parse_resolution("height=source").is_err());
  }

  #[test]
  fn bbox_and_pixel_parse() {
    let b = parse_bbox("-79.5,43.6,-79.3,43.8").unwrap();
    assert_eq!(b.west, -79.5);
    assert_eq!(b.north, 43.8);
    assert!(parse_bbox("1,2,3").is_err());
    assert_eq!(parse_size("1024x768").unwrap(), (1024, 768));
    assert_eq!(parse_pixel("10, 20").unwrap(), (10, 20));
  }

  #[test]
  fn args_parse_nested_commands() {
    let args = Args::try_parse_from([
      "bylaw",
      "--url",
      "http://example.test",
      "branch",
      "merge",
      "00000000-0000-0000-0000-000000000001",
      "00000000-0000-0000-0000-000000000002",
      "00000000-0000-0000-0000-000000000003",
      "--by",
      "planner",
      "--take",
      "far=source",
    ])
    .unwrap();
    let cfg = api_config(&args).unwrap();
    assert_eq!(cfg.base_url, "http://example.test");
    match args.command {
      Command::Branch(BranchCmd::Merge { resolutions, .. }) => assert_eq!(resolutions.len(), 1),
      other => panic!("unexpected command {other:?}"),
    }
  }
}
