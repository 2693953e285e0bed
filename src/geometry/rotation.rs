//! Rotation helpers.

use nalgebra::{Rotation3, Vector3};

/// Rotation composed from Euler angles as `Rx(x) · Ry(y) · Rz(z)`.
///
/// Applied to a camera-local vector, this yields the vector in world
/// coordinates.
pub fn euler_xyz_rotation(x: f64, y: f64, z: f64) -> Rotation3<f64> {
    let rx = Rotation3::from_axis_angle(&Vector3::x_axis(), x);
    let ry = Rotation3::from_axis_angle(&Vector3::y_axis(), y);
    let rz = Rotation3::from_axis_angle(&Vector3::z_axis(), z);
    rx * ry * rz
}

/// Unsigned angle between two vectors in radians, in `[0, π]`.
///
/// Returns NaN if either vector has zero length.
pub fn angle_between(a: &Vector3<f64>, b: &Vector3<f64>) -> f64 {
    if a.norm_squared() == 0.0 || b.norm_squared() == 0.0 {
        return f64::NAN;
    }
    a.cross(b).norm().atan2(a.dot(b))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    #[test]
    fn test_identity_rotation() {
        let r = euler_xyz_rotation(0.0, 0.0, 0.0);
        assert_relative_eq!(r.matrix(), Rotation3::identity().matrix(), epsilon = 1e-15);
    }

    #[test]
    fn test_composition_order() {
        // Rz is applied first to the local vector, then Ry, then Rx.
        let r = euler_xyz_rotation(FRAC_PI_2, 0.0, FRAC_PI_2);
        let v = r * Vector3::x();
        // Rz(90°) maps x to y, Rx(90°) maps y to z.
        assert_relative_eq!(v, Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_rotation_is_orthonormal() {
        let r = euler_xyz_rotation(0.3, -1.2, 2.5);
        let should_be_identity = r.matrix() * r.matrix().transpose();
        assert_relative_eq!(should_be_identity, nalgebra::Matrix3::identity(), epsilon = 1e-12);
    }

    #[test]
    fn test_angle_between() {
        assert_relative_eq!(angle_between(&Vector3::x(), &Vector3::y()), FRAC_PI_2, epsilon = 1e-15);
        assert_relative_eq!(angle_between(&Vector3::x(), &-Vector3::x()), PI, epsilon = 1e-15);
        assert_relative_eq!(angle_between(&Vector3::new(0.0, 0.0, 3.0), &Vector3::z()), 0.0);
        assert!(angle_between(&Vector3::zeros(), &Vector3::z()).is_nan());
    }
}
