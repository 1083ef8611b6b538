//! The map viewer seam and the schedule-drawing workflow built on it.
//!
//! Rendering belongs to whatever implements [`MapViewer`]. This module only
//! drives it: layers are toggled as the user picks them, and a drawn polygon
//! comes back through the completion callback handed to the viewer.

use std::sync::mpsc::{self, Receiver, TryRecvError};

use crate::{
  Error, Result,
  schedule::{BoundaryRef, LayerRef, NewSchedule, Polygon, ScheduleType},
};

/// Called by the viewer with the finished polygon.
pub type PolygonCallback = Box<dyn FnOnce(Polygon) + Send>;

/// A map or globe renderer able to show catalogue layers and let the user
/// draw polygons.
pub trait MapViewer {
  fn start_drawing_polygon(&mut self, on_complete: PolygonCallback);

  /// Finish the current drawing. The viewer calls the pending callback.
  fn complete_polygon_drawing(&mut self);

  /// Abandon the current drawing. The pending callback is dropped uncalled.
  fn cancel_polygon_drawing(&mut self);

  fn toggle_layer(&mut self, layer_id: &str, enabled: bool);
}

/// An in-progress schedule being assembled against a live viewer.
pub struct ScheduleDraft<V: MapViewer> {
  viewer:        V,
  name:          String,
  schedule_type: ScheduleType,
  description:   Option<String>,
  layers:        Vec<LayerRef>,
  boundaries:    Vec<BoundaryRef>,
  polygons:      Vec<Polygon>,
  drawing:       Option<Receiver<Polygon>>,
}

impl<V: MapViewer> ScheduleDraft<V> {
  pub fn new(viewer: V, name: impl Into<String>, schedule_type: ScheduleType) -> Self {
    Self {
      viewer,
      name: name.into(),
      schedule_type,
      description: None,
      layers: Vec::new(),
      boundaries: Vec::new(),
      polygons: Vec::new(),
      drawing: None,
    }
  }

  pub fn describe(&mut self, description: impl Into<String>) {
    self.description = Some(description.into());
  }

  pub fn viewer(&self) -> &V { &self.viewer }

  pub fn layers(&self) -> &[LayerRef] { &self.layers }

  pub fn polygons(&self) -> &[Polygon] { &self.polygons }

  pub fn is_drawing(&self) -> bool { self.drawing.is_some() }

  /// Add a layer to the schedule and show it. Selecting twice is a no-op.
  pub fn select_layer(&mut self, layer: LayerRef) {
    if self.layers.iter().any(|l| l.layer_id == layer.layer_id) {
      return;
    }
    self.viewer.toggle_layer(&layer.layer_id, true);
    self.layers.push(layer);
  }

  pub fn deselect_layer(&mut self, layer_id: &str) {
    let before = self.layers.len();
    self.layers.retain(|l| l.layer_id != layer_id);
    if self.layers.len() != before {
      self.viewer.toggle_layer(layer_id, false);
    }
  }

  pub fn select_boundary(&mut self, boundary: BoundaryRef) {
    if !self
      .boundaries
      .iter()
      .any(|b| b.boundary_id == boundary.boundary_id)
    {
      self.boundaries.push(boundary);
    }
  }

  /// Put the viewer into drawing mode. Only one drawing at a time.
  pub fn begin_polygon(&mut self) -> Result<()> {
    if self.drawing.is_some() {
      return Err(Error::DrawingInProgress);
    }
    let (tx, rx) = mpsc::channel();
    self.viewer.start_drawing_polygon(Box::new(move |polygon| {
      // Receiver may be gone.
      let _ = tx.send(polygon);
    }));
    self.drawing = Some(rx);
    Ok(())
  }

  /// Ask the viewer to finish the drawing and keep the polygon it reports.
  ///
  /// Returns `Ok(None)` when the viewer produced nothing, e.g. because the
  /// user had not placed enough vertices.
  pub fn finish_polygon(&mut self) -> Result<Option<&Polygon>> {
    let Some(rx) = self.drawing.take() else {
      return Ok(None);
    };
    self.viewer.complete_polygon_drawing();
    match rx.try_recv() {
      Ok(polygon) => {
        polygon.validate()?;
        self.polygons.push(polygon);
        Ok(self.polygons.last())
      }
      Err(TryRecvError::Empty | TryRecvError::Disconnected) => Ok(None),
    }
  }

  pub fn cancel_polygon(&mut self) {
    if self.drawing.take().is_some() {
      self.viewer.cancel_polygon_drawing();
    }
  }

  /// Finish the draft. A drawing still in progress is cancelled.
  pub fn into_new_schedule(mut self) -> Result<NewSchedule> {
    self.cancel_polygon();
    let schedule = NewSchedule {
      name:                self.name,
      schedule_type:       self.schedule_type,
      description:         self.description,
      linked_schedule_id:  None,
      selected_layers:     self.layers,
      selected_boundaries: self.boundaries,
      polygons:            self.polygons,
    };
    schedule.validate()?;
    Ok(schedule)
  }
}
