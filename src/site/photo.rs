//! Photos, their point mappings and mapping suggestions.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use nalgebra::{Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::params::{Orientation, ParameterSet, PixelCoordinate, Position};
use crate::projection::{PhotoView, Projection, ProjectionError, Ray};

use super::camera::CameraModel;
use super::residual::{PENALTY_COMPONENT, Points, ResidualContributor, sum_of_squares};
use super::types::{IdGenerator, MappingId, PhotoParameter, PointId};

/// Maximum pixel distance between distorted and undistorted projections for
/// a point to be suggested. Beyond it the distortion polynomial is no longer
/// trusted.
pub const SUGGESTION_DISTORTION_LIMIT: f64 = 100.0;

/// One photo: a camera pose plus the image it captured.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraPhoto {
    pub position: Position,
    pub orientation: Orientation,
    pub width: u32,
    pub height: u32,
    /// Encoded image, shared between site snapshots.
    pub image: Arc<[u8]>,
    pub mappings: BTreeMap<MappingId, Mapping>,

    #[serde(skip)]
    pub last_residual_sqr: f64,
}

/// A point located on a photo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mapping {
    pub point: PointId,
    pub position: PixelCoordinate,
    /// Proposed by [`CameraPhoto::refresh_suggestions`] rather than placed
    /// by the user. Suggested mappings never feed the optimizer.
    #[serde(default)]
    pub suggested: bool,

    /// Where the point projected on the last evaluation.
    #[serde(skip)]
    pub projected: Option<Vector2<f64>>,
    #[serde(skip)]
    pub last_residual_sqr: f64,
}

impl Mapping {
    pub fn new(point: PointId, position: PixelCoordinate) -> Self {
        Self {
            point,
            position,
            suggested: false,
            projected: None,
            last_residual_sqr: 0.0,
        }
    }

    fn suggestion(point: PointId, pixel: Vector2<f64>) -> Self {
        Self {
            suggested: true,
            projected: Some(pixel),
            ..Self::new(point, PixelCoordinate::from_vector(&pixel))
        }
    }
}

/// What a suggestion refresh changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuggestionStats {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Mappings of one point on a photo, split by origin.
#[derive(Default)]
struct PointMappings {
    confirmed: Vec<MappingId>,
    suggested: Vec<MappingId>,
}

struct MappingResidual {
    projected: Option<Vector2<f64>>,
    components: [f64; 2],
}

/// Residual of one mapping, or `None` if it does not take part.
fn mapping_residual(
    view: &PhotoView,
    pixel_accuracy: f64,
    mapping: &Mapping,
    points: &Points,
) -> Option<MappingResidual> {
    if mapping.suggested {
        return None;
    }
    let point = points.get(&mapping.point)?;
    let projection = view.project(&point.position.vector());
    if !projection.is_valid() {
        return Some(MappingResidual {
            projected: None,
            components: [PENALTY_COMPONENT, 0.0],
        });
    }

    let r = (projection.pixel - mapping.position.vector()) / pixel_accuracy;
    let norm = r.norm();
    let r = if !norm.is_finite() {
        Vector2::new(PENALTY_COMPONENT, 0.0)
    } else if norm > PENALTY_COMPONENT {
        r * (PENALTY_COMPONENT / norm)
    } else {
        r
    };

    Some(MappingResidual {
        projected: Some(projection.pixel),
        components: [r.x, r.y],
    })
}

impl CameraPhoto {
    pub fn new(width: u32, height: u32, image: impl Into<Arc<[u8]>>) -> Self {
        Self {
            position: Position::default(),
            orientation: Orientation::default(),
            width,
            height,
            image: image.into(),
            mappings: BTreeMap::new(),
            last_residual_sqr: 0.0,
        }
    }

    pub fn confirmed_mappings(&self) -> impl Iterator<Item = (&MappingId, &Mapping)> {
        self.mappings.iter().filter(|(_, m)| !m.suggested)
    }

    /// Turn a suggested mapping into a user mapping. Returns false if the
    /// mapping does not exist.
    pub fn confirm_mapping(&mut self, id: MappingId) -> bool {
        match self.mappings.get_mut(&id) {
            Some(mapping) => {
                mapping.suggested = false;
                true
            }
            None => false,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Projection
    // ─────────────────────────────────────────────────────────────────────────

    pub fn project(&self, model: &CameraModel, world_points: &[Vector3<f64>]) -> Vec<Projection> {
        let view = model.view(self);
        world_points.iter().map(|p| view.project(p)).collect()
    }

    pub fn project_undistorted(
        &self,
        model: &CameraModel,
        world_points: &[Vector3<f64>],
    ) -> Vec<Projection> {
        let view = model.view(self);
        world_points.iter().map(|p| view.project_undistorted(p)).collect()
    }

    /// World points at `depth` in front of the camera for each pixel.
    /// Lens distortion is ignored.
    pub fn unproject(
        &self,
        model: &CameraModel,
        pixels: &[Vector2<f64>],
        depth: f64,
    ) -> Result<Vec<Vector3<f64>>, ProjectionError> {
        model.view(self).unproject(pixels, depth)
    }

    pub fn unproject_ray(&self, model: &CameraModel, pixel: &Vector2<f64>) -> Result<Ray, ProjectionError> {
        model.view(self).unproject_ray(pixel)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Residuals
    // ─────────────────────────────────────────────────────────────────────────

    /// Like [`ResidualContributor::residual_components`], but also refreshes
    /// the per-mapping display caches.
    pub fn evaluate(&mut self, model: &CameraModel, points: &Points, out: &mut Vec<f64>) -> f64 {
        let view = model.view(self);
        let accuracy = model.pixel_accuracy.pixels();
        let mut total = 0.0;

        for mapping in self.mappings.values_mut() {
            match mapping_residual(&view, accuracy, mapping, points) {
                Some(residual) => {
                    let sr = sum_of_squares(&residual.components);
                    mapping.projected = residual.projected;
                    mapping.last_residual_sqr = sr;
                    out.extend(residual.components);
                    total += sr;
                }
                None => {
                    mapping.last_residual_sqr = 0.0;
                    if !mapping.suggested {
                        mapping.projected = None;
                    }
                }
            }
        }

        self.last_residual_sqr = total;
        total
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Suggestions
    // ─────────────────────────────────────────────────────────────────────────

    /// Recompute the suggested mappings from the current site geometry.
    ///
    /// A point is suggested when it projects in front of the camera, inside
    /// the image, and distortion moves it by at most
    /// [`SUGGESTION_DISTORTION_LIMIT`] pixels. User mappings keep their
    /// position; only their cached projection is refreshed. A point with a
    /// user mapping never keeps a suggestion.
    pub fn refresh_suggestions(
        &mut self,
        model: &CameraModel,
        points: &Points,
        ids: &mut IdGenerator,
    ) -> SuggestionStats {
        let view = model.view(self);
        let (width, height) = (f64::from(self.width), f64::from(self.height));
        let mut stats = SuggestionStats::default();

        let mut by_point: HashMap<PointId, PointMappings> = HashMap::new();
        for (&id, mapping) in &self.mappings {
            let entry = by_point.entry(mapping.point).or_default();
            if mapping.suggested {
                entry.suggested.push(id);
            } else {
                entry.confirmed.push(id);
            }
        }

        for (&point_id, point) in points {
            let world = point.position.vector();
            let projection = view.project(&world);
            let undistorted = view.project_undistorted(&world);
            let qualifies = projection.is_valid()
                && undistorted.is_valid()
                && projection.inside(width, height)
                && (projection.pixel - undistorted.pixel).norm() <= SUGGESTION_DISTORTION_LIMIT;

            let existing = by_point.remove(&point_id).unwrap_or_default();
            for id in &existing.confirmed {
                if let Some(mapping) = self.mappings.get_mut(id) {
                    mapping.projected = projection.is_valid().then_some(projection.pixel);
                }
            }

            // A user mapping replaces any suggestion for the same point.
            let mut stale = existing.suggested.as_slice();
            if existing.confirmed.is_empty() && qualifies {
                match existing.suggested.split_first() {
                    Some((&keep, rest)) => {
                        if let Some(mapping) = self.mappings.get_mut(&keep) {
                            mapping.position = PixelCoordinate::from_vector(&projection.pixel);
                            mapping.projected = Some(projection.pixel);
                            stats.updated += 1;
                        }
                        stale = rest;
                    }
                    None => {
                        let id: MappingId = ids.next_id();
                        self.mappings.insert(id, Mapping::suggestion(point_id, projection.pixel));
                        stats.added += 1;
                    }
                }
            }
            for id in stale {
                if self.mappings.remove(id).is_some() {
                    stats.removed += 1;
                }
            }
        }

        let before = self.mappings.len();
        self.mappings
            .retain(|_, m| !m.suggested || points.contains_key(&m.point));
        stats.removed += before - self.mappings.len();

        stats
    }
}

impl ResidualContributor for CameraPhoto {
    type Owner = CameraModel;

    fn residual_components(&self, model: &CameraModel, points: &Points, out: &mut Vec<f64>) {
        let view = model.view(self);
        let accuracy = model.pixel_accuracy.pixels();
        for mapping in self.mappings.values() {
            if let Some(residual) = mapping_residual(&view, accuracy, mapping, points) {
                out.extend(residual.components);
            }
        }
    }
}

impl ParameterSet for CameraPhoto {
    type Slot = PhotoParameter;

    fn unlocked_parameters(&self) -> Vec<PhotoParameter> {
        let position = self
            .position
            .unlocked_parameters()
            .into_iter()
            .map(PhotoParameter::Position);
        let orientation = self
            .orientation
            .unlocked_parameters()
            .into_iter()
            .map(PhotoParameter::Orientation);
        position.chain(orientation).collect()
    }

    fn parameter(&self, slot: PhotoParameter) -> f64 {
        match slot {
            PhotoParameter::Position(axis) => self.position.parameter(axis),
            PhotoParameter::Orientation(axis) => self.orientation.parameter(axis),
        }
    }

    fn set_parameter(&mut self, slot: PhotoParameter, value: f64) {
        match slot {
            PhotoParameter::Position(axis) => self.position.set_parameter(axis, value),
            PhotoParameter::Orientation(axis) => self.orientation.set_parameter(axis, value),
        }
    }
}
