//! Lens distortion on normalized image coordinates.
//!
//! Radial terms use four coefficients `k1..k4`, tangential terms follow the
//! Brown–Conrady form with `p1, p2` scaled by `1 + p3·r² + p4·r⁴`, and a final
//! affinity/skew step mixes the distorted x with `b1, b2`.

use nalgebra::Vector2;

/// Distortion coefficients of one camera.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Distortion {
    /// `k1..k4`
    pub radial: [f64; 4],
    /// `p1..p4`
    pub tangential: [f64; 4],
    /// `b1, b2`
    pub affine: [f64; 2],
}

impl Distortion {
    /// Distortion that maps every coordinate onto itself.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_identity(&self) -> bool {
        self.radial.iter().chain(&self.tangential).chain(&self.affine).all(|&c| c == 0.0)
    }

    /// Distort a normalized (post perspective divide) coordinate.
    pub fn apply(&self, n: &Vector2<f64>) -> Vector2<f64> {
        let (x, y) = (n.x, n.y);
        let [k1, k2, k3, k4] = self.radial;
        let [p1, p2, p3, p4] = self.tangential;
        let [b1, b2] = self.affine;

        let r2 = x * x + y * y;
        let r4 = r2 * r2;
        let r6 = r4 * r2;
        let r8 = r4 * r4;

        let radial = 1.0 + k1 * r2 + k2 * r4 + k3 * r6 + k4 * r8;

        let tan_scale = 1.0 + p3 * r2 + p4 * r4;
        let x_tan = (2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x)) * tan_scale;
        let y_tan = (p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y) * tan_scale;

        let xd = x * radial + x_tan;
        let yd = y * radial + y_tan;

        Vector2::new(xd + b1 * xd + b2 * yd, yd)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_identity_distortion() {
        let d = Distortion::none();
        assert!(d.is_identity());
        let n = Vector2::new(0.3, -0.2);
        assert_eq!(d.apply(&n), n);
    }

    #[test]
    fn test_radial_scales_along_radius() {
        let d = Distortion {
            radial: [0.1, 0.0, 0.0, 0.0],
            ..Distortion::none()
        };
        let n = Vector2::new(0.5, 0.0);
        let out = d.apply(&n);
        assert_relative_eq!(out.x, 0.5 * (1.0 + 0.1 * 0.25), epsilon = 1e-15);
        assert_relative_eq!(out.y, 0.0);
    }

    #[test]
    fn test_tangential_terms() {
        let d = Distortion {
            tangential: [0.01, 0.02, 0.5, 0.0],
            ..Distortion::none()
        };
        let (x, y) = (0.2, 0.1);
        let r2 = x * x + y * y;
        let scale = 1.0 + 0.5 * r2;
        let out = d.apply(&Vector2::new(x, y));
        assert_relative_eq!(out.x, x + (2.0 * 0.01 * x * y + 0.02 * (r2 + 2.0 * x * x)) * scale, epsilon = 1e-15);
        assert_relative_eq!(out.y, y + (0.01 * (r2 + 2.0 * y * y) + 2.0 * 0.02 * x * y) * scale, epsilon = 1e-15);
    }

    #[test]
    fn test_affine_only_touches_x() {
        let d = Distortion {
            affine: [0.1, 0.2],
            ..Distortion::none()
        };
        let out = d.apply(&Vector2::new(1.0, 2.0));
        assert_relative_eq!(out.x, 1.0 + 0.1 + 0.4, epsilon = 1e-15);
        assert_relative_eq!(out.y, 2.0);
    }
}
