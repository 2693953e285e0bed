//! Geometry utilities: Euler rotations and vector angles.

pub mod rotation;

pub use rotation::{angle_between, euler_xyz_rotation};
