//! Composite parameter types built from lockable scalars.

use nalgebra::{Rotation3, Vector2, Vector3};
use serde::{Deserialize, Serialize};

use crate::geometry::euler_xyz_rotation;

use super::scalar::{Angle, Distance, PixelDistance, Tweakable};
use super::ParameterSet;

/// A 3D position whose three coordinates can be locked individually.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub coordinates: [Distance; 3],
    #[serde(default)]
    pub locked: [bool; 3],
}

impl Position {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            coordinates: [Distance(x), Distance(y), Distance(z)],
            locked: [false; 3],
        }
    }

    pub fn from_vector(v: &Vector3<f64>) -> Self {
        Self::new(v.x, v.y, v.z)
    }

    /// A position with every axis locked.
    pub fn fixed(x: f64, y: f64, z: f64) -> Self {
        Self {
            locked: [true; 3],
            ..Self::new(x, y, z)
        }
    }

    pub fn vector(&self) -> Vector3<f64> {
        Vector3::new(
            self.coordinates[0].0,
            self.coordinates[1].0,
            self.coordinates[2].0,
        )
    }

    /// Overwrite the coordinates, ignoring locks.
    pub fn set_vector(&mut self, v: &Vector3<f64>) {
        for axis in 0..3 {
            self.coordinates[axis] = Distance(v[axis]);
        }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        (self.vector() - other.vector()).norm()
    }

    pub fn lock_all(&mut self, locked: bool) {
        self.locked = [locked; 3];
    }
}

impl ParameterSet for Position {
    type Slot = usize;

    fn unlocked_parameters(&self) -> Vec<usize> {
        (0..3).filter(|&axis| !self.locked[axis]).collect()
    }

    fn parameter(&self, axis: usize) -> f64 {
        self.coordinates[axis].tweakable_value()
    }

    fn set_parameter(&mut self, axis: usize, value: f64) {
        self.coordinates[axis].set_tweakable_value(value);
    }
}

/// Orientation as Euler angles around X, Y and Z, each lockable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Orientation {
    pub angles: [Angle; 3],
    #[serde(default)]
    pub locked: [bool; 3],
}

impl Orientation {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self {
            angles: [Angle(x), Angle(y), Angle(z)],
            locked: [false; 3],
        }
    }

    /// Rotation from camera-local into world coordinates.
    pub fn rotation(&self) -> Rotation3<f64> {
        euler_xyz_rotation(self.angles[0].0, self.angles[1].0, self.angles[2].0)
    }

    pub fn lock_all(&mut self, locked: bool) {
        self.locked = [locked; 3];
    }
}

impl ParameterSet for Orientation {
    type Slot = usize;

    fn unlocked_parameters(&self) -> Vec<usize> {
        (0..3).filter(|&axis| !self.locked[axis]).collect()
    }

    fn parameter(&self, axis: usize) -> f64 {
        self.angles[axis].tweakable_value()
    }

    fn set_parameter(&mut self, axis: usize, value: f64) {
        self.angles[axis].set_tweakable_value(value);
    }
}

/// A position on a photo in pixels. Origin is the top left corner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PixelCoordinate {
    pub x: PixelDistance,
    pub y: PixelDistance,
}

impl PixelCoordinate {
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x: PixelDistance(x),
            y: PixelDistance(y),
        }
    }

    pub fn from_vector(v: &Vector2<f64>) -> Self {
        Self::new(v.x, v.y)
    }

    pub fn vector(&self) -> Vector2<f64> {
        Vector2::new(self.x.0, self.y.0)
    }

    pub(crate) fn component_mut(&mut self, axis: usize) -> &mut PixelDistance {
        if axis == 0 { &mut self.x } else { &mut self.y }
    }

    pub(crate) fn component(&self, axis: usize) -> PixelDistance {
        if axis == 0 { self.x } else { self.y }
    }
}
