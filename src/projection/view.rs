//! Projection through one photo: pose, pinhole intrinsics and distortion.

use nalgebra::{Matrix3, Matrix4, Rotation3, Vector2, Vector3, Vector4};

use super::{Distortion, Projection, ProjectionError, Ray};

/// Everything needed to map world points onto one photo.
#[derive(Debug, Clone, Copy)]
pub struct PhotoView {
    /// Camera position in world coordinates.
    pub position: Vector3<f64>,
    /// Rotation from camera-local into world coordinates.
    pub rotation: Rotation3<f64>,
    /// Focal length in pixels.
    pub focal: f64,
    /// Image center plus principal point offset, in pixels.
    pub center: Vector2<f64>,
    pub distortion: Distortion,
}

impl PhotoView {
    /// Build a view from the horizontal field of view and the image size.
    pub fn new(
        position: Vector3<f64>,
        rotation: Rotation3<f64>,
        horizontal_fov: f64,
        principal_offset: Vector2<f64>,
        width: f64,
        height: f64,
        distortion: Distortion,
    ) -> Self {
        Self {
            position,
            rotation,
            focal: focal_length(width, horizontal_fov),
            center: Vector2::new(width / 2.0, height / 2.0) + principal_offset,
            distortion,
        }
    }

    /// World point in camera-local coordinates. `z` points forward.
    pub fn to_local(&self, world: &Vector3<f64>) -> Vector3<f64> {
        self.rotation.inverse() * (world - self.position)
    }

    /// Full forward projection including lens distortion.
    pub fn project(&self, world: &Vector3<f64>) -> Projection {
        self.project_with(world, true)
    }

    /// Forward projection without lens distortion.
    pub fn project_undistorted(&self, world: &Vector3<f64>) -> Projection {
        self.project_with(world, false)
    }

    fn project_with(&self, world: &Vector3<f64>, distort: bool) -> Projection {
        let local = self.to_local(world);
        let normalized = Vector2::new(local.x / local.z, local.y / local.z);
        let image = if distort {
            self.distortion.apply(&normalized)
        } else {
            normalized
        };
        Projection {
            pixel: image * self.focal + self.center,
            depth: local.z,
        }
    }

    /// `K₄ · V`: world homogeneous point to `(u·z, v·z, z, 1)`.
    pub fn pinhole_matrix(&self) -> Matrix4<f64> {
        let r_t: Matrix3<f64> = self.rotation.inverse().into_inner();
        let t = -(r_t * self.position);

        let mut view = Matrix4::identity();
        view.fixed_view_mut::<3, 3>(0, 0).copy_from(&r_t);
        view.fixed_view_mut::<3, 1>(0, 3).copy_from(&t);

        #[rustfmt::skip]
        let k = Matrix4::new(
            self.focal, 0.0,        self.center.x, 0.0,
            0.0,        self.focal, self.center.y, 0.0,
            0.0,        0.0,        1.0,           0.0,
            0.0,        0.0,        0.0,           1.0,
        );

        k * view
    }

    /// Inverse of the pinhole matrix, if it exists and is finite.
    pub fn inverse_pinhole_matrix(&self) -> Result<Matrix4<f64>, ProjectionError> {
        let inv = self
            .pinhole_matrix()
            .try_inverse()
            .ok_or(ProjectionError::NonInvertible)?;
        if inv.iter().all(|v| v.is_finite()) {
            Ok(inv)
        } else {
            Err(ProjectionError::NonInvertible)
        }
    }

    /// World points for the given pixels, each at `depth` along the view axis.
    pub fn unproject(
        &self,
        pixels: &[Vector2<f64>],
        depth: f64,
    ) -> Result<Vec<Vector3<f64>>, ProjectionError> {
        let inv = self.inverse_pinhole_matrix()?;
        Ok(pixels
            .iter()
            .map(|px| unproject_with(&inv, px, depth))
            .collect())
    }

    /// Ray from the camera position through `pixel`, ignoring distortion.
    pub fn unproject_ray(&self, pixel: &Vector2<f64>) -> Result<Ray, ProjectionError> {
        let inv = self.inverse_pinhole_matrix()?;
        let through = unproject_with(&inv, pixel, 1.0);
        let direction = through - self.position;
        let norm = direction.norm();
        if norm == 0.0 || !norm.is_finite() {
            return Err(ProjectionError::NonInvertible);
        }
        Ok(Ray {
            origin: self.position,
            direction: direction / norm,
        })
    }
}

fn unproject_with(inv: &Matrix4<f64>, pixel: &Vector2<f64>, depth: f64) -> Vector3<f64> {
    let h = inv * Vector4::new(pixel.x * depth, pixel.y * depth, depth, 1.0);
    Vector3::new(h.x / h.w, h.y / h.w, h.z / h.w)
}

/// Focal length in pixels for an image `width` wide covering `horizontal_fov`.
pub fn focal_length(width: f64, horizontal_fov: f64) -> f64 {
    (width / 2.0) / (horizontal_fov / 2.0).tan()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::euler_xyz_rotation;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn simple_view() -> PhotoView {
        PhotoView::new(
            Vector3::zeros(),
            Rotation3::identity(),
            std::f64::consts::FRAC_PI_2,
            Vector2::zeros(),
            200.0,
            100.0,
            Distortion::none(),
        )
    }

    #[test]
    fn test_focal_length() {
        // 90° horizontal FOV: f equals half the width.
        assert_relative_eq!(focal_length(200.0, std::f64::consts::FRAC_PI_2), 100.0, epsilon = 1e-12);
    }

    #[test]
    fn test_point_on_axis_hits_center() {
        let view = simple_view();
        let p = view.project(&Vector3::new(0.0, 0.0, 5.0));
        assert!(p.is_valid());
        assert_relative_eq!(p.pixel, Vector2::new(100.0, 50.0), epsilon = 1e-12);
        assert_relative_eq!(p.depth, 5.0);
    }

    #[test]
    fn test_behind_camera_is_invalid() {
        let view = simple_view();
        let p = view.project(&Vector3::new(0.0, 0.0, -1.0));
        assert!(p.depth < 0.0);
        assert!(!p.is_valid());
    }

    #[test]
    fn test_zero_distortion_matches_pinhole() {
        let view = PhotoView::new(
            Vector3::new(1.0, -2.0, 0.5),
            euler_xyz_rotation(0.1, 0.2, 0.3),
            1.2,
            Vector2::new(3.0, -4.0),
            640.0,
            480.0,
            Distortion::none(),
        );
        let world = Vector3::new(2.0, -1.0, 6.0);
        let a = view.project(&world);
        let b = view.project_undistorted(&world);
        assert_relative_eq!(a.pixel, b.pixel, epsilon = 1e-12);

        let h = view.pinhole_matrix() * world.push(1.0);
        assert_relative_eq!(Vector2::new(h.x / h.z, h.y / h.z), a.pixel, epsilon = 1e-9);
        assert_relative_eq!(h.z, a.depth, epsilon = 1e-12);
    }

    #[test]
    fn test_project_unproject_roundtrip() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let view = PhotoView::new(
                Vector3::new(
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                    rng.random_range(-5.0..5.0),
                ),
                euler_xyz_rotation(
                    rng.random_range(0.0..6.28),
                    rng.random_range(0.0..6.28),
                    rng.random_range(0.0..6.28),
                ),
                rng.random_range(0.3..2.5),
                Vector2::new(rng.random_range(-20.0..20.0), rng.random_range(-20.0..20.0)),
                800.0,
                600.0,
                Distortion::none(),
            );

            let local = Vector3::new(
                rng.random_range(-2.0..2.0),
                rng.random_range(-2.0..2.0),
                rng.random_range(0.5..20.0),
            );
            let world = view.rotation * local + view.position;

            let projection = view.project_undistorted(&world);
            let back = view.unproject(&[projection.pixel], projection.depth).unwrap();
            assert_relative_eq!(back[0], world, epsilon = 1e-6);
        }
    }

    #[test]
    fn test_unproject_ray_points_at_world() {
        let view = simple_view();
        let world = Vector3::new(1.0, 2.0, 4.0);
        let pixel = view.project(&world).pixel;
        let ray = view.unproject_ray(&pixel).unwrap();
        assert_relative_eq!(ray.direction, world.normalize(), epsilon = 1e-12);
        assert_relative_eq!(ray.origin, Vector3::zeros());
    }

    #[test]
    fn test_zero_width_is_not_invertible() {
        let view = PhotoView::new(
            Vector3::zeros(),
            Rotation3::identity(),
            1.2,
            Vector2::zeros(),
            0.0,
            0.0,
            Distortion::none(),
        );
        assert_eq!(
            view.unproject(&[Vector2::new(1.0, 1.0)], 1.0).unwrap_err(),
            ProjectionError::NonInvertible
        );
        assert!(view.unproject_ray(&Vector2::zeros()).is_err());
    }
}
