//! Camera projection model.
//!
//! Forward projection runs in four stages:
//!
//! ```text
//! local  = Rᵀ (world − position)            view transform
//! n      = (local.x / local.z, local.y / local.z)   perspective divide
//! n'     = distort(n)                        radial, tangential, affine
//! pixel  = f · n' + image_size / 2 + principal_offset
//! ```
//!
//! The undistorted variant collapses the stages without distortion into one
//! 4×4 matrix, which is also what unprojection inverts.

pub mod distortion;
pub mod view;

use nalgebra::{Vector2, Vector3};
use thiserror::Error;

pub use distortion::Distortion;
pub use view::{PhotoView, focal_length};

/// Failure of an inverse projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProjectionError {
    #[error("projection matrix is not invertible")]
    NonInvertible,
}

/// A projected world point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Projection {
    /// Pixel coordinate, origin in the top left corner.
    pub pixel: Vector2<f64>,
    /// Distance along the view axis. Not positive means behind the camera.
    pub depth: f64,
}

impl Projection {
    pub fn in_front(&self) -> bool {
        self.depth > 0.0
    }

    pub fn is_valid(&self) -> bool {
        self.in_front() && self.pixel.x.is_finite() && self.pixel.y.is_finite()
    }

    pub fn inside(&self, width: f64, height: f64) -> bool {
        (0.0..=width).contains(&self.pixel.x) && (0.0..=height).contains(&self.pixel.y)
    }
}

/// A half line starting at a camera position.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ray {
    pub origin: Vector3<f64>,
    /// Unit length.
    pub direction: Vector3<f64>,
}

impl Ray {
    pub fn at(&self, distance: f64) -> Vector3<f64> {
        self.origin + self.direction * distance
    }
}
