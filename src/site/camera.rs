//! Cameras and their shared lens model.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::params::{Coefficient, ParameterSet, PixelCoordinate, PixelDistance, PositiveAngle, Tweakable};
use crate::projection::{Distortion, PhotoView};

use super::photo::CameraPhoto;
use super::types::{CameraParameter, PhotoId};

/// One physical camera and the photos taken with it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Camera {
    pub name: String,
    pub model: CameraModel,
    pub photos: BTreeMap<PhotoId, CameraPhoto>,
}

impl Camera {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            model: CameraModel::default(),
            photos: BTreeMap::new(),
        }
    }
}

/// Intrinsics and lens distortion, shared by every photo of a camera.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CameraModel {
    /// Angle of view across the image width.
    pub horizontal_fov: PositiveAngle,
    #[serde(default)]
    pub horizontal_fov_locked: bool,

    /// Offset of the principal point from the image center.
    pub principal_offset: PixelCoordinate,
    pub principal_offset_locked: bool,

    /// `k1..k4`
    pub radial: [Coefficient; 4],
    pub radial_locked: [bool; 4],
    /// `p1..p4`
    pub tangential: [Coefficient; 4],
    pub tangential_locked: [bool; 4],
    /// `b1, b2`
    pub affine: [Coefficient; 2],
    pub affine_locked: [bool; 2],

    /// Expected mapping error of a user placed point.
    pub pixel_accuracy: PixelDistance,
}

impl Default for CameraModel {
    fn default() -> Self {
        Self {
            horizontal_fov: PositiveAngle(1.2),
            horizontal_fov_locked: false,
            principal_offset: PixelCoordinate::default(),
            principal_offset_locked: true,
            radial: [Coefficient(0.0); 4],
            radial_locked: [true; 4],
            tangential: [Coefficient(0.0); 4],
            tangential_locked: [true; 4],
            affine: [Coefficient(0.0); 2],
            affine_locked: [true; 2],
            pixel_accuracy: PixelDistance(5.0),
        }
    }
}

impl CameraModel {
    pub fn distortion(&self) -> Distortion {
        Distortion {
            radial: self.radial.map(|c| c.0),
            tangential: self.tangential.map(|c| c.0),
            affine: self.affine.map(|c| c.0),
        }
    }

    /// Unlock or lock every distortion coefficient at once.
    pub fn lock_distortion(&mut self, locked: bool) {
        self.radial_locked = [locked; 4];
        self.tangential_locked = [locked; 4];
        self.affine_locked = [locked; 2];
    }

    /// Projection through `photo` taken with this camera.
    pub fn view(&self, photo: &CameraPhoto) -> PhotoView {
        PhotoView::new(
            photo.position.vector(),
            photo.orientation.rotation(),
            self.horizontal_fov.radians(),
            self.principal_offset.vector(),
            f64::from(photo.width),
            f64::from(photo.height),
            self.distortion(),
        )
    }
}

impl ParameterSet for CameraModel {
    type Slot = CameraParameter;

    fn unlocked_parameters(&self) -> Vec<CameraParameter> {
        let mut slots = Vec::new();
        if !self.horizontal_fov_locked {
            slots.push(CameraParameter::HorizontalFov);
        }
        if !self.principal_offset_locked {
            slots.extend([CameraParameter::PrincipalPoint(0), CameraParameter::PrincipalPoint(1)]);
        }
        let unlocked = |locks: &[bool]| -> Vec<usize> {
            locks.iter().enumerate().filter(|(_, l)| !**l).map(|(i, _)| i).collect()
        };
        slots.extend(unlocked(&self.radial_locked).into_iter().map(CameraParameter::Radial));
        slots.extend(unlocked(&self.tangential_locked).into_iter().map(CameraParameter::Tangential));
        slots.extend(unlocked(&self.affine_locked).into_iter().map(CameraParameter::Affine));
        slots
    }

    fn parameter(&self, slot: CameraParameter) -> f64 {
        match slot {
            CameraParameter::HorizontalFov => self.horizontal_fov.tweakable_value(),
            CameraParameter::PrincipalPoint(axis) => self.principal_offset.component(axis).tweakable_value(),
            CameraParameter::Radial(i) => self.radial[i].tweakable_value(),
            CameraParameter::Tangential(i) => self.tangential[i].tweakable_value(),
            CameraParameter::Affine(i) => self.affine[i].tweakable_value(),
        }
    }

    fn set_parameter(&mut self, slot: CameraParameter, value: f64) {
        match slot {
            CameraParameter::HorizontalFov => self.horizontal_fov.set_tweakable_value(value),
            CameraParameter::PrincipalPoint(axis) => {
                self.principal_offset.component_mut(axis).set_tweakable_value(value)
            }
            CameraParameter::Radial(i) => self.radial[i].set_tweakable_value(value),
            CameraParameter::Tangential(i) => self.tangential[i].set_tweakable_value(value),
            CameraParameter::Affine(i) => self.affine[i].set_tweakable_value(value),
        }
    }
}

/// Whether the optimizer may touch `slot` of `model`.
pub(crate) fn camera_slot_unlocked(model: &CameraModel, slot: CameraParameter) -> bool {
    let unlocked = |locks: &[bool], i: usize| locks.get(i).is_some_and(|locked| !locked);
    match slot {
        CameraParameter::HorizontalFov => !model.horizontal_fov_locked,
        CameraParameter::PrincipalPoint(axis) => axis < 2 && !model.principal_offset_locked,
        CameraParameter::Radial(i) => unlocked(&model.radial_locked, i),
        CameraParameter::Tangential(i) => unlocked(&model.tangential_locked, i),
        CameraParameter::Affine(i) => unlocked(&model.affine_locked, i),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_default_only_fov_unlocked() {
        let model = CameraModel::default();
        assert_eq!(model.unlocked_parameters(), vec![CameraParameter::HorizontalFov]);
        assert!(model.distortion().is_identity());
        assert_eq!(model.pixel_accuracy, PixelDistance(5.0));
    }

    #[test]
    fn test_unlock_distortion_order() {
        let mut model = CameraModel::default();
        model.horizontal_fov_locked = true;
        model.lock_distortion(false);
        model.tangential_locked[2] = true;

        let slots = model.unlocked_parameters();
        assert_eq!(slots.len(), 9);
        assert_eq!(slots[0], CameraParameter::Radial(0));
        assert_eq!(slots[4], CameraParameter::Tangential(0));
        assert!(!slots.contains(&CameraParameter::Tangential(2)));
        assert_eq!(slots[8], CameraParameter::Affine(1));
    }

    #[test]
    fn test_fov_in_log_space() {
        let mut model = CameraModel::default();
        model.set_parameter(CameraParameter::HorizontalFov, 0.0);
        assert_relative_eq!(model.horizontal_fov.radians(), 1.0, epsilon = 1e-15);
        assert_relative_eq!(model.parameter(CameraParameter::HorizontalFov), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_principal_point_slots() {
        let mut model = CameraModel::default();
        model.principal_offset_locked = false;
        model.set_parameter(CameraParameter::PrincipalPoint(1), -7.5);
        assert_eq!(model.principal_offset, PixelCoordinate::new(0.0, -7.5));
        assert!(camera_slot_unlocked(&model, CameraParameter::PrincipalPoint(0)));
        assert!(!camera_slot_unlocked(&model, CameraParameter::Radial(0)));
    }
}
