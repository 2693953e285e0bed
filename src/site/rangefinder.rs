//! Rangefinders and the point-to-point distances measured with them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::params::Distance;

use super::residual::{Points, ResidualContributor, finite_or_penalty};
use super::types::{PointId, RangefinderMeasurementId};

/// A distance measuring device. Its accuracy applies to all its measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rangefinder {
    pub name: String,
    pub accuracy: Distance,
    pub measurements: BTreeMap<RangefinderMeasurementId, RangefinderMeasurement>,
}

impl Rangefinder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accuracy: Distance(0.01),
            measurements: BTreeMap::new(),
        }
    }
}

/// Distance between two points as read from a rangefinder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangefinderMeasurement {
    pub p1: Option<PointId>,
    pub p2: Option<PointId>,
    pub measured_distance: Distance,

    #[serde(skip)]
    pub last_residual_sqr: f64,
}

impl RangefinderMeasurement {
    pub fn new(p1: PointId, p2: PointId, measured_distance: f64) -> Self {
        Self {
            p1: Some(p1),
            p2: Some(p2),
            measured_distance: Distance(measured_distance),
            last_residual_sqr: 0.0,
        }
    }

    /// Current distance between the two points, if both exist.
    pub fn current_distance(&self, points: &Points) -> Option<f64> {
        let p1 = points.get(&self.p1?)?;
        let p2 = points.get(&self.p2?)?;
        Some(p1.position.distance_to(&p2.position))
    }
}

impl ResidualContributor for RangefinderMeasurement {
    type Owner = Rangefinder;

    fn residual_components(&self, rangefinder: &Rangefinder, points: &Points, out: &mut Vec<f64>) {
        let Some(distance) = self.current_distance(points) else {
            out.push(0.0);
            return;
        };
        let r = (distance - self.measured_distance.meters()) / rangefinder.accuracy.meters();
        out.push(finite_or_penalty(r));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Position;
    use crate::site::Point;
    use crate::site::residual::RESIDUAL_PENALTY;
    use approx::assert_relative_eq;

    fn points() -> Points {
        let mut points = Points::new();
        points.insert(PointId(0), Point::at("a", Position::new(0.0, 0.0, 0.0)));
        points.insert(PointId(1), Point::at("b", Position::new(3.0, 4.0, 0.0)));
        points
    }

    #[test]
    fn test_exact_measurement_has_zero_residual() {
        let rf = Rangefinder::new("laser");
        let m = RangefinderMeasurement::new(PointId(0), PointId(1), 5.0);
        assert_relative_eq!(m.residual_sqr(&rf, &points()), 0.0, epsilon = 1e-20);
    }

    #[test]
    fn test_residual_weighted_by_accuracy() {
        let rf = Rangefinder::new("laser");
        let m = RangefinderMeasurement::new(PointId(0), PointId(1), 5.02);
        // 2 cm off at 1 cm accuracy.
        assert_relative_eq!(m.residual_sqr(&rf, &points()), 4.0, epsilon = 1e-9);
    }

    #[test]
    fn test_dangling_point_contributes_nothing() {
        let rf = Rangefinder::new("laser");
        let m = RangefinderMeasurement::new(PointId(0), PointId(5), 5.0);
        assert_eq!(m.residual_sqr(&rf, &points()), 0.0);
    }

    #[test]
    fn test_zero_accuracy_is_penalized() {
        let mut rf = Rangefinder::new("laser");
        rf.accuracy = Distance(0.0);
        let m = RangefinderMeasurement::new(PointId(0), PointId(1), 5.0);
        // 0 / 0 is NaN.
        assert_eq!(m.residual_sqr(&rf, &points()), RESIDUAL_PENALTY);
    }
}
