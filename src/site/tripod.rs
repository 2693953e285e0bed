//! Tripods: a rangefinder mounted with an offset from a pivot point.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::params::{Distance, ParameterSet, Position, Tweakable};

use super::residual::{Points, ResidualContributor, finite_or_penalty};
use super::types::{PointId, TripodMeasurementId, TripodParameter};

/// A tripod whose pivot stays fixed while it is turned towards points.
///
/// The rangefinder sits `offset` in front of the pivot along its view axis and
/// `offset_side` to the side, so a raw reading has to be corrected before it
/// can be compared with the pivot-to-point distance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tripod {
    pub name: String,
    /// Pivot position.
    pub position: Position,
    pub offset: Distance,
    pub offset_side: Distance,
    #[serde(default)]
    pub offset_locked: bool,
    #[serde(default)]
    pub offset_side_locked: bool,
    pub accuracy: Distance,
    pub measurements: BTreeMap<TripodMeasurementId, TripodMeasurement>,
}

impl Tripod {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            position: Position::default(),
            offset: Distance(0.0),
            offset_side: Distance(0.0),
            offset_locked: false,
            offset_side_locked: false,
            accuracy: Distance(0.01),
            measurements: BTreeMap::new(),
        }
    }

    /// Distance from the pivot for a raw reading.
    pub fn pivot_distance(&self, measured: f64) -> f64 {
        let direct = measured + self.offset.meters();
        direct.hypot(self.offset_side.meters())
    }
}

impl ParameterSet for Tripod {
    type Slot = TripodParameter;

    fn unlocked_parameters(&self) -> Vec<TripodParameter> {
        let mut slots = Vec::with_capacity(5);
        if !self.offset_locked {
            slots.push(TripodParameter::Offset);
        }
        if !self.offset_side_locked {
            slots.push(TripodParameter::OffsetSide);
        }
        slots.extend(
            self.position
                .unlocked_parameters()
                .into_iter()
                .map(TripodParameter::Position),
        );
        slots
    }

    fn parameter(&self, slot: TripodParameter) -> f64 {
        match slot {
            TripodParameter::Offset => self.offset.tweakable_value(),
            TripodParameter::OffsetSide => self.offset_side.tweakable_value(),
            TripodParameter::Position(axis) => self.position.parameter(axis),
        }
    }

    fn set_parameter(&mut self, slot: TripodParameter, value: f64) {
        match slot {
            TripodParameter::Offset => self.offset.set_tweakable_value(value),
            TripodParameter::OffsetSide => self.offset_side.set_tweakable_value(value),
            TripodParameter::Position(axis) => self.position.set_parameter(axis, value),
        }
    }
}

/// Raw rangefinder reading from the tripod to one point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripodMeasurement {
    pub point: Option<PointId>,
    pub measured_distance: Distance,

    #[serde(skip)]
    pub last_residual_sqr: f64,
}

impl TripodMeasurement {
    pub fn new(point: PointId, measured_distance: f64) -> Self {
        Self {
            point: Some(point),
            measured_distance: Distance(measured_distance),
            last_residual_sqr: 0.0,
        }
    }
}

impl ResidualContributor for TripodMeasurement {
    type Owner = Tripod;

    fn residual_components(&self, tripod: &Tripod, points: &Points, out: &mut Vec<f64>) {
        let Some(point) = self.point.and_then(|id| points.get(&id)) else {
            out.push(0.0);
            return;
        };
        let expected = tripod.pivot_distance(self.measured_distance.meters());
        let actual = point.position.distance_to(&tripod.position);
        out.push(finite_or_penalty((expected - actual) / tripod.accuracy.meters()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::site::Point;
    use approx::assert_relative_eq;

    #[test]
    fn test_offsets_unlocked_by_default() {
        let mut tripod = Tripod::new("t");
        tripod.position.lock_all(true);
        assert_eq!(
            tripod.unlocked_parameters(),
            vec![TripodParameter::Offset, TripodParameter::OffsetSide]
        );

        tripod.offset_locked = true;
        tripod.position.locked[2] = false;
        assert_eq!(
            tripod.unlocked_parameters(),
            vec![TripodParameter::OffsetSide, TripodParameter::Position(2)]
        );
    }

    #[test]
    fn test_residual_with_offsets() {
        let mut tripod = Tripod::new("t");
        tripod.offset = Distance(0.1);
        tripod.offset_side = Distance(0.05);

        let mut points = Points::new();
        points.insert(PointId(3), Point::at("p", Position::new(2.0, 0.0, 0.0)));

        let m = TripodMeasurement::new(PointId(3), 1.9);
        let expected = (2.0_f64 * 2.0 + 0.05 * 0.05).sqrt();
        let r = (expected - 2.0) / 0.01;
        assert_relative_eq!(m.residual_sqr(&tripod, &points), r * r, epsilon = 1e-9);
    }

    #[test]
    fn test_missing_point_is_zero() {
        let tripod = Tripod::new("t");
        let m = TripodMeasurement::new(PointId(3), 1.0);
        assert_eq!(m.residual_sqr(&tripod, &Points::new()), 0.0);
    }

    #[test]
    fn test_set_parameter() {
        let mut tripod = Tripod::new("t");
        tripod.set_parameter(TripodParameter::OffsetSide, 0.2);
        tripod.set_parameter(TripodParameter::Position(1), -3.0);
        assert_eq!(tripod.offset_side, Distance(0.2));
        assert_eq!(tripod.position.vector().y, -3.0);
        assert_eq!(tripod.parameter(TripodParameter::Position(1)), -3.0);
    }
}
