//! Lines between two points, optionally constrained to a direction.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use crate::geometry::angle_between;
use crate::params::Angle;

use super::residual::{PENALTY_COMPONENT, Points, ResidualContributor, finite_or_penalty};
use super::types::PointId;

/// A line from `p1` to `p2`.
///
/// When `direction_enabled` is set, the line contributes the angle between
/// `p2 − p1` and `direction`, weighted by `direction_accuracy`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Line {
    pub p1: Option<PointId>,
    pub p2: Option<PointId>,
    pub direction_enabled: bool,
    pub direction: Vector3<f64>,
    pub direction_accuracy: Angle,

    #[serde(skip)]
    pub last_residual_sqr: f64,
}

impl Default for Line {
    fn default() -> Self {
        Self {
            p1: None,
            p2: None,
            direction_enabled: false,
            direction: Vector3::z(),
            direction_accuracy: Angle::from_degrees(1.0),
            last_residual_sqr: 0.0,
        }
    }
}

impl Line {
    pub fn between(p1: PointId, p2: PointId) -> Self {
        Self {
            p1: Some(p1),
            p2: Some(p2),
            ..Self::default()
        }
    }

    /// Constrain the line to `direction` within `accuracy`.
    pub fn with_direction(mut self, direction: Vector3<f64>, accuracy: Angle) -> Self {
        self.direction_enabled = true;
        self.direction = direction;
        self.direction_accuracy = accuracy;
        self
    }

    fn endpoints(&self, points: &Points) -> Option<(Vector3<f64>, Vector3<f64>)> {
        let p1 = points.get(&self.p1?)?;
        let p2 = points.get(&self.p2?)?;
        Some((p1.position.vector(), p2.position.vector()))
    }
}

impl ResidualContributor for Line {
    type Owner = ();

    fn residual_components(&self, _owner: &(), points: &Points, out: &mut Vec<f64>) {
        if !self.direction_enabled {
            out.push(0.0);
            return;
        }
        let Some((a, b)) = self.endpoints(points) else {
            out.push(0.0);
            return;
        };

        let angle = angle_between(&(b - a), &self.direction);
        let r = finite_or_penalty(angle / self.direction_accuracy.radians());
        out.push(r.clamp(-PENALTY_COMPONENT, PENALTY_COMPONENT));
    }
}
