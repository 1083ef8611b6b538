//! GIS schedules: named bundles of map layers, boundaries and drawn polygons
//! attached to a legislation.
//!
//! Layers and boundaries belong to an external GIS catalogue; a schedule only
//! holds references to them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, Result};

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
pub enum ScheduleType {
  ZoningMap,
  LandUse,
  HeightOverlay,
  Heritage,
  Floodplain,
  SiteSpecific,
}

/// A map layer in the external catalogue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LayerRef {
  pub layer_id: String,
  pub name:     String,
}

/// A boundary in the external catalogue, with a representative point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryRef {
  pub boundary_id: String,
  pub name:        String,
  pub lat:         f64,
  pub lng:         f64,
}

// ─── Geometry ────────────────────────────────────────────────────────────────

/// A GeoJSON `Polygon` geometry. Positions are `[lng, lat]`; the first ring is
/// the exterior, any further rings are holes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "Polygon")]
pub struct Polygon {
  pub coordinates: Vec<Vec<[f64; 2]>>,
}

impl Polygon {
  /// Build a single-ring polygon from the vertices a user clicked, closing
  /// the ring if needed.
  pub fn from_open_ring(mut vertices: Vec<[f64; 2]>) -> Result<Self> {
    if let (Some(first), Some(last)) = (vertices.first().copied(), vertices.last())
      && first != *last
    {
      vertices.push(first);
    }
    let polygon = Self { coordinates: vec![vertices] };
    polygon.validate()?;
    Ok(polygon)
  }

  pub fn validate(&self) -> Result<()> {
    if self.coordinates.is_empty() {
      return Err(Error::validation("polygons", "polygon has no rings"));
    }
    for ring in &self.coordinates {
      if ring.len() < 4 {
        return Err(Error::validation(
          "polygons",
          format!("ring has {} positions; at least 4 are required", ring.len()),
        ));
      }
      if ring.first() != ring.last() {
        return Err(Error::validation("polygons", "ring is not closed"));
      }
      if let Some([lng, lat]) = ring
        .iter()
        .find(|[lng, lat]| !(-180.0..=180.0).contains(lng) || !(-90.0..=90.0).contains(lat))
      {
        return Err(Error::validation(
          "polygons",
          format!("position [{lng}, {lat}] is outside the valid range"),
        ));
      }
    }
    Ok(())
  }
}

// ─── Schedule ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GisSchedule {
  pub schedule_id:         Uuid,
  pub legislation_id:      Uuid,
  pub name:                String,
  pub schedule_type:       ScheduleType,
  pub description:         Option<String>,
  pub linked_schedule_id:  Option<Uuid>,
  pub selected_layers:     Vec<LayerRef>,
  pub selected_boundaries: Vec<BoundaryRef>,
  pub polygons:            Vec<Polygon>,
  pub created_at:          DateTime<Utc>,
}

/// Input to [`crate::store::LegislationStore::add_schedule`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewSchedule {
  pub name:                String,
  pub schedule_type:       ScheduleType,
  #[serde(default)]
  pub description:         Option<String>,
  #[serde(default)]
  pub linked_schedule_id:  Option<Uuid>,
  #[serde(default)]
  pub selected_layers:     Vec<LayerRef>,
  #[serde(default)]
  pub selected_boundaries: Vec<BoundaryRef>,
  #[serde(default)]
  pub polygons:            Vec<Polygon>,
}

impl NewSchedule {
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::validation("name", "must not be blank"));
    }
    for p in &self.polygons {
      p.validate()?;
    }
    Ok(())
  }

  pub fn into_schedule(self, legislation_id: Uuid, now: DateTime<Utc>) -> GisSchedule {
    GisSchedule {
      schedule_id: Uuid::new_v4(),
      legislation_id,
      name: self.name.trim().to_owned(),
      schedule_type: self.schedule_type,
      description: self.description,
      linked_schedule_id: self.linked_schedule_id,
      selected_layers: self.selected_layers,
      selected_boundaries: self.selected_boundaries,
      polygons: self.polygons,
      created_at: now,
    }
  }
}
