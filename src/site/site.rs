//! Site - Container for every survey entity.
//!
//! The Site owns all points, lines, rangefinders, tripods and cameras and
//! hands out their ids. It provides methods for:
//! - Adding/removing entities and their children
//! - Flattening unlocked parameters and residual contributors into lists
//! - Reading and writing parameters through [`ParameterRef`]
//! - Evaluating residuals through [`ResidualRef`]
//!
//! Removing a point does not touch the entities referencing it; they keep
//! the dangling id and contribute nothing until relinked.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::params::{ParameterSet, Position};

use super::camera::{Camera, camera_slot_unlocked};
use super::line::Line;
use super::photo::{CameraPhoto, Mapping, SuggestionStats};
use super::point::Point;
use super::rangefinder::{Rangefinder, RangefinderMeasurement};
use super::residual::{Points, ResidualContributor, sum_of_squares};
use super::tripod::{Tripod, TripodMeasurement};
use super::types::{
    CameraId, IdGenerator, LineId, MappingId, ParameterRef, PhotoId, PhotoParameter, PointId,
    RangefinderId, RangefinderMeasurementId, ResidualRef, SiteError, TripodId, TripodMeasurementId,
    TripodParameter,
};

/// A survey site.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Site {
    pub name: String,
    points: Points,
    lines: BTreeMap<LineId, Line>,
    rangefinders: BTreeMap<RangefinderId, Rangefinder>,
    tripods: BTreeMap<TripodId, Tripod>,
    cameras: BTreeMap<CameraId, Camera>,
    ids: IdGenerator,
}

impl Site {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Points
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_point(&mut self, name: impl Into<String>, position: Position) -> PointId {
        let id = self.ids.next_id();
        self.points.insert(id, Point::at(name, position));
        id
    }

    pub fn get_point(&self, id: PointId) -> Option<&Point> {
        self.points.get(&id)
    }

    pub fn get_point_mut(&mut self, id: PointId) -> Option<&mut Point> {
        self.points.get_mut(&id)
    }

    /// Remove a point. References to it are left dangling.
    pub fn remove_point(&mut self, id: PointId) -> Option<Point> {
        self.points.remove(&id)
    }

    pub fn points(&self) -> &Points {
        &self.points
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lines
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_line(&mut self, line: Line) -> LineId {
        let id = self.ids.next_id();
        self.lines.insert(id, line);
        id
    }

    pub fn get_line(&self, id: LineId) -> Option<&Line> {
        self.lines.get(&id)
    }

    pub fn get_line_mut(&mut self, id: LineId) -> Option<&mut Line> {
        self.lines.get_mut(&id)
    }

    pub fn remove_line(&mut self, id: LineId) -> Option<Line> {
        self.lines.remove(&id)
    }

    pub fn lines(&self) -> &BTreeMap<LineId, Line> {
        &self.lines
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Rangefinders
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_rangefinder(&mut self, rangefinder: Rangefinder) -> RangefinderId {
        let id = self.ids.next_id();
        self.rangefinders.insert(id, rangefinder);
        id
    }

    pub fn add_rangefinder_measurement(
        &mut self,
        rangefinder: RangefinderId,
        measurement: RangefinderMeasurement,
    ) -> Result<RangefinderMeasurementId, SiteError> {
        let parent = self
            .rangefinders
            .get_mut(&rangefinder)
            .ok_or(SiteError::UnknownRangefinder(rangefinder))?;
        let id = self.ids.next_id();
        parent.measurements.insert(id, measurement);
        Ok(id)
    }

    pub fn get_rangefinder(&self, id: RangefinderId) -> Option<&Rangefinder> {
        self.rangefinders.get(&id)
    }

    pub fn get_rangefinder_mut(&mut self, id: RangefinderId) -> Option<&mut Rangefinder> {
        self.rangefinders.get_mut(&id)
    }

    pub fn remove_rangefinder(&mut self, id: RangefinderId) -> Option<Rangefinder> {
        self.rangefinders.remove(&id)
    }

    pub fn remove_rangefinder_measurement(
        &mut self,
        rangefinder: RangefinderId,
        measurement: RangefinderMeasurementId,
    ) -> Option<RangefinderMeasurement> {
        self.rangefinders
            .get_mut(&rangefinder)?
            .measurements
            .remove(&measurement)
    }

    pub fn rangefinders(&self) -> &BTreeMap<RangefinderId, Rangefinder> {
        &self.rangefinders
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Tripods
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_tripod(&mut self, tripod: Tripod) -> TripodId {
        let id = self.ids.next_id();
        self.tripods.insert(id, tripod);
        id
    }

    pub fn add_tripod_measurement(
        &mut self,
        tripod: TripodId,
        measurement: TripodMeasurement,
    ) -> Result<TripodMeasurementId, SiteError> {
        let parent = self
            .tripods
            .get_mut(&tripod)
            .ok_or(SiteError::UnknownTripod(tripod))?;
        let id = self.ids.next_id();
        parent.measurements.insert(id, measurement);
        Ok(id)
    }

    pub fn get_tripod(&self, id: TripodId) -> Option<&Tripod> {
        self.tripods.get(&id)
    }

    pub fn get_tripod_mut(&mut self, id: TripodId) -> Option<&mut Tripod> {
        self.tripods.get_mut(&id)
    }

    pub fn remove_tripod(&mut self, id: TripodId) -> Option<Tripod> {
        self.tripods.remove(&id)
    }

    pub fn remove_tripod_measurement(
        &mut self,
        tripod: TripodId,
        measurement: TripodMeasurementId,
    ) -> Option<TripodMeasurement> {
        self.tripods.get_mut(&tripod)?.measurements.remove(&measurement)
    }

    pub fn tripods(&self) -> &BTreeMap<TripodId, Tripod> {
        &self.tripods
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Cameras, photos and mappings
    // ─────────────────────────────────────────────────────────────────────────

    pub fn add_camera(&mut self, camera: Camera) -> CameraId {
        let id = self.ids.next_id();
        self.cameras.insert(id, camera);
        id
    }

    pub fn add_photo(&mut self, camera: CameraId, photo: CameraPhoto) -> Result<PhotoId, SiteError> {
        let parent = self
            .cameras
            .get_mut(&camera)
            .ok_or(SiteError::UnknownCamera(camera))?;
        let id = self.ids.next_id();
        parent.photos.insert(id, photo);
        Ok(id)
    }

    pub fn add_mapping(
        &mut self,
        camera: CameraId,
        photo: PhotoId,
        mapping: Mapping,
    ) -> Result<MappingId, SiteError> {
        let parent = self
            .cameras
            .get_mut(&camera)
            .ok_or(SiteError::UnknownCamera(camera))?
            .photos
            .get_mut(&photo)
            .ok_or(SiteError::UnknownPhoto { camera, photo })?;
        let id = self.ids.next_id();
        parent.mappings.insert(id, mapping);
        Ok(id)
    }

    /// Mark a suggested mapping as placed by the user.
    pub fn confirm_mapping(
        &mut self,
        camera: CameraId,
        photo: PhotoId,
        mapping: MappingId,
    ) -> Result<(), SiteError> {
        if self.photo_mut_or_err(camera, photo)?.confirm_mapping(mapping) {
            Ok(())
        } else {
            Err(SiteError::UnknownMapping { photo, mapping })
        }
    }

    pub fn get_camera(&self, id: CameraId) -> Option<&Camera> {
        self.cameras.get(&id)
    }

    pub fn get_camera_mut(&mut self, id: CameraId) -> Option<&mut Camera> {
        self.cameras.get_mut(&id)
    }

    pub fn get_photo(&self, camera: CameraId, photo: PhotoId) -> Option<&CameraPhoto> {
        self.cameras.get(&camera)?.photos.get(&photo)
    }

    pub fn get_photo_mut(&mut self, camera: CameraId, photo: PhotoId) -> Option<&mut CameraPhoto> {
        self.cameras.get_mut(&camera)?.photos.get_mut(&photo)
    }

    pub fn remove_camera(&mut self, id: CameraId) -> Option<Camera> {
        self.cameras.remove(&id)
    }

    pub fn remove_photo(&mut self, camera: CameraId, photo: PhotoId) -> Option<CameraPhoto> {
        self.cameras.get_mut(&camera)?.photos.remove(&photo)
    }

    pub fn remove_mapping(&mut self, camera: CameraId, photo: PhotoId, mapping: MappingId) -> Option<Mapping> {
        self.get_photo_mut(camera, photo)?.mappings.remove(&mapping)
    }

    pub fn cameras(&self) -> &BTreeMap<CameraId, Camera> {
        &self.cameras
    }

    fn photo_mut_or_err(&mut self, camera: CameraId, photo: PhotoId) -> Result<&mut CameraPhoto, SiteError> {
        self.cameras
            .get_mut(&camera)
            .ok_or(SiteError::UnknownCamera(camera))?
            .photos
            .get_mut(&photo)
            .ok_or(SiteError::UnknownPhoto { camera, photo })
    }

    /// Recompute the suggested mappings of one photo.
    pub fn refresh_suggestions(&mut self, camera: CameraId, photo: PhotoId) -> Result<SuggestionStats, SiteError> {
        let parent = self
            .cameras
            .get_mut(&camera)
            .ok_or(SiteError::UnknownCamera(camera))?;
        let target = parent
            .photos
            .get_mut(&photo)
            .ok_or(SiteError::UnknownPhoto { camera, photo })?;
        Ok(target.refresh_suggestions(&parent.model, &self.points, &mut self.ids))
    }

    /// Recompute the suggested mappings of every photo.
    pub fn refresh_all_suggestions(&mut self) -> SuggestionStats {
        let mut total = SuggestionStats::default();
        for camera in self.cameras.values_mut() {
            for photo in camera.photos.values_mut() {
                let stats = photo.refresh_suggestions(&camera.model, &self.points, &mut self.ids);
                total.added += stats.added;
                total.updated += stats.updated;
                total.removed += stats.removed;
            }
        }
        total
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Flattening
    // ─────────────────────────────────────────────────────────────────────────

    /// Every unlocked parameter and every residual contributor, in a stable
    /// order: points, lines, cameras (model, then each photo), rangefinders,
    /// tripods.
    pub fn flatten_parameters(&self) -> (Vec<ParameterRef>, Vec<ResidualRef>) {
        let mut params = Vec::new();
        let mut residuals = Vec::new();

        for (&point, p) in &self.points {
            params.extend(
                p.position
                    .unlocked_parameters()
                    .into_iter()
                    .map(|axis| ParameterRef::Point { point, axis }),
            );
        }

        residuals.extend(self.lines.keys().map(|&id| ResidualRef::Line(id)));

        for (&camera, c) in &self.cameras {
            params.extend(
                c.model
                    .unlocked_parameters()
                    .into_iter()
                    .map(|slot| ParameterRef::Camera { camera, slot }),
            );
            for (&photo, p) in &c.photos {
                params.extend(
                    p.unlocked_parameters()
                        .into_iter()
                        .map(|slot| ParameterRef::Photo { camera, photo, slot }),
                );
                residuals.push(ResidualRef::CameraPhoto { camera, photo });
            }
        }

        for (&rangefinder, r) in &self.rangefinders {
            residuals.extend(r.measurements.keys().map(|&measurement| {
                ResidualRef::RangefinderMeasurement { rangefinder, measurement }
            }));
        }

        for (&tripod, t) in &self.tripods {
            let slots = t.unlocked_parameters();
            let (offsets, position): (Vec<_>, Vec<_>) = slots
                .into_iter()
                .partition(|s| !matches!(s, TripodParameter::Position(_)));
            params.extend(offsets.into_iter().map(|slot| ParameterRef::Tripod { tripod, slot }));
            residuals.extend(
                t.measurements
                    .keys()
                    .map(|&measurement| ResidualRef::TripodMeasurement { tripod, measurement }),
            );
            params.extend(position.into_iter().map(|slot| ParameterRef::Tripod { tripod, slot }));
        }

        (params, residuals)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Parameter access
    // ─────────────────────────────────────────────────────────────────────────

    /// Current value in optimizer space, or `None` if the entity is gone or
    /// the slot does not exist.
    pub fn parameter(&self, param: ParameterRef) -> Option<f64> {
        if !param.slot_in_range() {
            return None;
        }
        match param {
            ParameterRef::Point { point, axis } => Some(self.points.get(&point)?.position.parameter(axis)),
            ParameterRef::Tripod { tripod, slot } => Some(self.tripods.get(&tripod)?.parameter(slot)),
            ParameterRef::Camera { camera, slot } => Some(self.cameras.get(&camera)?.model.parameter(slot)),
            ParameterRef::Photo { camera, photo, slot } => {
                Some(self.get_photo(camera, photo)?.parameter(slot))
            }
        }
    }

    /// Write a value in optimizer space. Returns false if the entity is gone
    /// or the slot does not exist.
    pub fn set_parameter(&mut self, param: ParameterRef, value: f64) -> bool {
        if !param.slot_in_range() {
            return false;
        }
        match param {
            ParameterRef::Point { point, axis } => match self.points.get_mut(&point) {
                Some(p) => p.position.set_parameter(axis, value),
                None => return false,
            },
            ParameterRef::Tripod { tripod, slot } => match self.tripods.get_mut(&tripod) {
                Some(t) => t.set_parameter(slot, value),
                None => return false,
            },
            ParameterRef::Camera { camera, slot } => match self.cameras.get_mut(&camera) {
                Some(c) => c.model.set_parameter(slot, value),
                None => return false,
            },
            ParameterRef::Photo { camera, photo, slot } => match self.get_photo_mut(camera, photo) {
                Some(p) => p.set_parameter(slot, value),
                None => return false,
            },
        }
        true
    }

    /// Whether the parameter exists and is currently unlocked. Out of range
    /// slots count as locked.
    pub fn is_parameter_unlocked(&self, param: ParameterRef) -> bool {
        match param {
            ParameterRef::Point { point, axis } => {
                self.points.get(&point).is_some_and(|p| unlocked(&p.position.locked, axis))
            }
            ParameterRef::Tripod { tripod, slot } => self.tripods.get(&tripod).is_some_and(|t| match slot {
                TripodParameter::Offset => !t.offset_locked,
                TripodParameter::OffsetSide => !t.offset_side_locked,
                TripodParameter::Position(axis) => unlocked(&t.position.locked, axis),
            }),
            ParameterRef::Camera { camera, slot } => self
                .cameras
                .get(&camera)
                .is_some_and(|c| camera_slot_unlocked(&c.model, slot)),
            ParameterRef::Photo { camera, photo, slot } => {
                self.get_photo(camera, photo).is_some_and(|p| match slot {
                    PhotoParameter::Position(axis) => unlocked(&p.position.locked, axis),
                    PhotoParameter::Orientation(axis) => unlocked(&p.orientation.locked, axis),
                })
            }
        }
    }

    /// Current values of `params`. Missing entities read as NaN.
    pub fn parameter_values(&self, params: &[ParameterRef]) -> Vec<f64> {
        params
            .iter()
            .map(|&p| self.parameter(p).unwrap_or(f64::NAN))
            .collect()
    }

    /// Write `values` into the parameters they belong to, skipping entities
    /// that no longer exist and parameters that were locked meanwhile.
    /// Returns the number of values written.
    pub fn apply_parameter_values(&mut self, params: &[ParameterRef], values: &[f64]) -> usize {
        let mut applied = 0;
        for (&param, &value) in params.iter().zip(values) {
            if self.is_parameter_unlocked(param) && self.set_parameter(param, value) {
                applied += 1;
            }
        }
        applied
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Residuals
    // ─────────────────────────────────────────────────────────────────────────

    /// Append the weighted components of one contributor. Contributors whose
    /// entity is gone append nothing.
    pub fn residual_components(&self, residual: ResidualRef, out: &mut Vec<f64>) {
        match residual {
            ResidualRef::Line(id) => {
                if let Some(line) = self.lines.get(&id) {
                    line.residual_components(&(), &self.points, out);
                }
            }
            ResidualRef::RangefinderMeasurement { rangefinder, measurement } => {
                if let Some(r) = self.rangefinders.get(&rangefinder)
                    && let Some(m) = r.measurements.get(&measurement)
                {
                    m.residual_components(r, &self.points, out);
                }
            }
            ResidualRef::TripodMeasurement { tripod, measurement } => {
                if let Some(t) = self.tripods.get(&tripod)
                    && let Some(m) = t.measurements.get(&measurement)
                {
                    m.residual_components(t, &self.points, out);
                }
            }
            ResidualRef::CameraPhoto { camera, photo } => {
                if let Some(c) = self.cameras.get(&camera)
                    && let Some(p) = c.photos.get(&photo)
                {
                    p.residual_components(&c.model, &self.points, out);
                }
            }
        }
    }

    pub fn residual_sqr(&self, residual: ResidualRef) -> f64 {
        let mut components = Vec::new();
        self.residual_components(residual, &mut components);
        sum_of_squares(&components)
    }

    /// Like [`Site::residual_components`], but also stores the squared
    /// residual in the entity's display cache. Returns the squared residual.
    pub fn evaluate_residual(&mut self, residual: ResidualRef, out: &mut Vec<f64>) -> f64 {
        let start = out.len();
        let points = &self.points;
        match residual {
            ResidualRef::Line(id) => {
                if let Some(line) = self.lines.get_mut(&id) {
                    line.residual_components(&(), points, out);
                    line.last_residual_sqr = sum_of_squares(&out[start..]);
                }
            }
            ResidualRef::RangefinderMeasurement { rangefinder, measurement } => {
                if let Some(r) = self.rangefinders.get_mut(&rangefinder) {
                    let mut components = Vec::with_capacity(1);
                    if let Some(m) = r.measurements.get(&measurement) {
                        m.residual_components(r, points, &mut components);
                    }
                    if let Some(m) = r.measurements.get_mut(&measurement) {
                        m.last_residual_sqr = sum_of_squares(&components);
                    }
                    out.extend(components);
                }
            }
            ResidualRef::TripodMeasurement { tripod, measurement } => {
                if let Some(t) = self.tripods.get_mut(&tripod) {
                    let mut components = Vec::with_capacity(1);
                    if let Some(m) = t.measurements.get(&measurement) {
                        m.residual_components(t, points, &mut components);
                    }
                    if let Some(m) = t.measurements.get_mut(&measurement) {
                        m.last_residual_sqr = sum_of_squares(&components);
                    }
                    out.extend(components);
                }
            }
            ResidualRef::CameraPhoto { camera, photo } => {
                if let Some(c) = self.cameras.get_mut(&camera)
                    && let Some(p) = c.photos.get_mut(&photo)
                {
                    p.evaluate(&c.model, points, out);
                }
            }
        }
        sum_of_squares(&out[start..])
    }

    /// Sum of the squared residuals of every contributor.
    pub fn objective(&self) -> f64 {
        let (_, residuals) = self.flatten_parameters();
        residuals.into_iter().map(|r| self.residual_sqr(r)).sum()
    }

    /// Same as [`Site::objective`], refreshing every display cache.
    pub fn evaluate_objective(&mut self) -> f64 {
        let (_, residuals) = self.flatten_parameters();
        let mut scratch = Vec::new();
        residuals
            .into_iter()
            .map(|r| {
                scratch.clear();
                self.evaluate_residual(r, &mut scratch)
            })
            .sum()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Serialization
    // ─────────────────────────────────────────────────────────────────────────

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Parse a site. The id generator is moved past every id in use, so
    /// hand-edited files cannot cause id collisions.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        let mut site: Site = serde_json::from_str(json)?;
        if let Some(max) = site.max_used_id() {
            site.ids.reserve_past(max);
        }
        site.evaluate_objective();
        Ok(site)
    }

    fn max_used_id(&self) -> Option<u64> {
        let mut ids: Vec<u64> = Vec::new();
        ids.extend(self.points.keys().map(|id| id.0));
        ids.extend(self.lines.keys().map(|id| id.0));
        for (id, r) in &self.rangefinders {
            ids.push(id.0);
            ids.extend(r.measurements.keys().map(|id| id.0));
        }
        for (id, t) in &self.tripods {
            ids.push(id.0);
            ids.extend(t.measurements.keys().map(|id| id.0));
        }
        for (id, c) in &self.cameras {
            ids.push(id.0);
            for (id, p) in &c.photos {
                ids.push(id.0);
                ids.extend(p.mappings.keys().map(|id| id.0));
            }
        }
        ids.into_iter().max()
    }
}

fn unlocked(locks: &[bool], index: usize) -> bool {
    locks.get(index).is_some_and(|locked| !locked)
}
