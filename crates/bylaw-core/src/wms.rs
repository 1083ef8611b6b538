//! WMS 1.3.0 `GetFeatureInfo` requests for map click-to-identify.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const WMS_VERSION: &str = "1.3.0";

/// Geographic extent of the rendered map, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
  pub west:  f64,
  pub south: f64,
  pub east:  f64,
  pub north: f64,
}

impl BoundingBox {
  /// The `BBOX` value for `EPSG:4326`, whose axis order in WMS 1.3.0 is
  /// latitude first.
  fn as_param(&self) -> String {
    format!("{},{},{},{}", self.south, self.west, self.north, self.east)
  }
}

/// Identify the features under pixel `(i, j)` of a `width` x `height` map
/// covering `bbox`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfoRequest {
  pub layers:        Vec<String>,
  pub bbox:          BoundingBox,
  pub width:         u32,
  pub height:        u32,
  pub i:             u32,
  pub j:             u32,
  #[serde(default = "default_feature_count")]
  pub feature_count: u32,
}

fn default_feature_count() -> u32 { 1 }

impl FeatureInfoRequest {
  pub fn new(
    layers: impl IntoIterator<Item = impl Into<String>>,
    bbox: BoundingBox,
    (width, height): (u32, u32),
    (i, j): (u32, u32),
  ) -> Self {
    Self {
      layers: layers.into_iter().map(Into::into).collect(),
      bbox,
      width,
      height,
      i,
      j,
      feature_count: default_feature_count(),
    }
  }

  pub fn validate(&self) -> Result<()> {
    if self.layers.is_empty() || self.layers.iter().any(|l| l.trim().is_empty()) {
      return Err(Error::validation("layers", "at least one named layer is required"));
    }
    if self.width == 0 || self.height == 0 {
      return Err(Error::validation("width", "map size must be non-zero"));
    }
    if self.i >= self.width || self.j >= self.height {
      return Err(Error::validation(
        "i",
        format!("pixel ({}, {}) is outside a {}x{} map", self.i, self.j, self.width, self.height),
      ));
    }
    let b = &self.bbox;
    if !(b.west < b.east && b.south < b.north) {
      return Err(Error::validation("bbox", "bounding box is empty or inverted"));
    }
    Ok(())
  }

  /// Query string pairs for the request, in a stable order.
  pub fn query_pairs(&self) -> Result<Vec<(&'static str, String)>> {
    self.validate()?;
    let layers = self.layers.join(",");
    Ok(vec![
      ("SERVICE", "WMS".to_owned()),
      ("VERSION", WMS_VERSION.to_owned()),
      ("REQUEST", "GetFeatureInfo".to_owned()),
      ("LAYERS", layers.clone()),
      ("QUERY_LAYERS", layers),
      ("STYLES", String::new()),
      ("CRS", "EPSG:4326".to_owned()),
      ("BBOX", self.bbox.as_param()),
      ("WIDTH", self.width.to_string()),
      ("HEIGHT", self.height.to_string()),
      ("I", self.i.to_string()),
      ("J", self.j.to_string()),
      ("INFO_FORMAT", "application/json".to_owned()),
      ("FEATURE_COUNT", self.feature_count.to_string()),
    ])
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn toronto() -> BoundingBox {
    BoundingBox { west: -79.6, south: 43.6, east: -79.2, north: 43.8 }
  }

  #[test]
  fn builds_get_feature_info_query() {
    let req = FeatureInfoRequest::new(["zoning:parcels"], toronto(), (800, 600), (400, 300));
    let pairs = req.query_pairs().unwrap();
    let get = |k: &str| pairs.iter().find(|(key, _)| *key == k).map(|(_, v)| v.as_str());

    assert_eq!(get("REQUEST"), Some("GetFeatureInfo"));
    assert_eq!(get("VERSION"), Some("1.3.0"));
    assert_eq!(get("QUERY_LAYERS"), Some("zoning:parcels"));
    assert_eq!(get("BBOX"), Some("43.6,-79.6,43.8,-79.2"));
    assert_eq!(get("I"), Some("400"));
    assert_eq!(get("INFO_FORMAT"), Some("application/json"));
  }

  #[test]
  fn pixel_must_fall_inside_the_map() {
    let req = FeatureInfoRequest::new(["a"], toronto(), (100, 100), (100, 5));
    assert!(req.query_pairs().is_err());
  }

  #[test]
  fn inverted_bbox_is_rejected() {
    let mut bbox = toronto();
    std::mem::swap(&mut bbox.west, &mut bbox.east);
    let req = FeatureInfoRequest::new(["a"], bbox, (10, 10), (1, 1));
    assert!(matches!(req.validate(), Err(Error::Validation { field: "bbox", .. })));
  }
}
