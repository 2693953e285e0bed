//! Scalar parameter types and their mapping into optimizer space.
//!
//! Every quantity the optimizer may touch is a thin newtype over `f64` that
//! implements [`Tweakable`]. The optimizer works on unconstrained reals; each
//! type decides how its physical value maps onto that line.

use std::f64::consts::TAU;
use std::fmt;

use serde::{Deserialize, Serialize};

/// A scalar that can be read from and written to optimizer space.
pub trait Tweakable {
    /// Current value mapped into optimizer space.
    fn tweakable_value(&self) -> f64;

    /// Convert `v` from optimizer space and store it.
    fn set_tweakable_value(&mut self, v: f64);
}

/// A length in meters, or a coordinate measured from the origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Distance(pub f64);

impl Distance {
    pub fn meters(self) -> f64 {
        self.0
    }
}

impl Tweakable for Distance {
    fn tweakable_value(&self) -> f64 {
        self.0
    }

    fn set_tweakable_value(&mut self, v: f64) {
        self.0 = v;
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4} m", self.0)
    }
}

/// An angle in radians.
///
/// Values written from optimizer space are normalized into `[0, 2π)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Angle(pub f64);

impl Angle {
    pub fn from_degrees(deg: f64) -> Self {
        Self(deg.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }

    /// The same angle wrapped into `[0, 2π)`.
    pub fn normalized(self) -> Self {
        let rad = self.0.rem_euclid(TAU);
        // rem_euclid can round up to exactly TAU for tiny negative inputs.
        if rad >= TAU { Self(0.0) } else { Self(rad) }
    }
}

impl Tweakable for Angle {
    fn tweakable_value(&self) -> f64 {
        self.0
    }

    fn set_tweakable_value(&mut self, v: f64) {
        *self = Angle(v).normalized();
    }
}

/// A strictly positive angle in radians, such as a field of view.
///
/// Optimizer space is `ln(radians)`, so no optimizer step can make it
/// zero or negative.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PositiveAngle(pub f64);

impl PositiveAngle {
    pub fn from_degrees(deg: f64) -> Self {
        Self(deg.to_radians())
    }

    pub fn radians(self) -> f64 {
        self.0
    }

    pub fn degrees(self) -> f64 {
        self.0.to_degrees()
    }
}

impl Tweakable for PositiveAngle {
    fn tweakable_value(&self) -> f64 {
        self.0.ln()
    }

    fn set_tweakable_value(&mut self, v: f64) {
        self.0 = v.exp();
    }
}

/// A length or absolute position on a photo, in pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PixelDistance(pub f64);

impl PixelDistance {
    pub fn pixels(self) -> f64 {
        self.0
    }
}

impl Tweakable for PixelDistance {
    fn tweakable_value(&self) -> f64 {
        self.0
    }

    fn set_tweakable_value(&mut self, v: f64) {
        self.0 = v;
    }
}

/// A dimensionless model coefficient (distortion terms).
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Coefficient(pub f64);

impl Tweakable for Coefficient {
    fn tweakable_value(&self) -> f64 {
        self.0
    }

    fn set_tweakable_value(&mut self, v: f64) {
        self.0 = v;
    }
}
