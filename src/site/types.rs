//! Identifier types and references into the site graph.
//!
//! Ids are plain integers handed out by one [`IdGenerator`] per site, so they
//! are unique across all entity kinds. Children refer to other entities by id
//! instead of holding pointers, which keeps the site trivially clonable.

use serde::{Deserialize, Serialize};
use thiserror::Error;

macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn new(id: u64) -> Self {
                Self(id)
            }
        }

        impl From<u64> for $name {
            fn from(id: u64) -> Self {
                Self(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

entity_id!(
    /// Identifies a [`Point`](super::Point).
    PointId, "P"
);
entity_id!(LineId, "L");
entity_id!(
    /// Identifies a [`Rangefinder`](super::Rangefinder).
    RangefinderId, "RF"
);
entity_id!(RangefinderMeasurementId, "RM");
entity_id!(
    /// Identifies a [`Tripod`](super::Tripod).
    TripodId, "T"
);
entity_id!(TripodMeasurementId, "TM");
entity_id!(
    /// Identifies a [`Camera`](super::Camera).
    CameraId, "C"
);
entity_id!(PhotoId, "PH");
entity_id!(MappingId, "M");

/// Source of fresh ids for every entity kind of one site.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdGenerator {
    next: u64,
}

impl IdGenerator {
    pub fn next_id<I: From<u64>>(&mut self) -> I {
        let id = self.next;
        self.next += 1;
        I::from(id)
    }

    /// Make sure ids issued from now on are greater than `used`.
    pub fn reserve_past(&mut self, used: u64) {
        self.next = self.next.max(used.saturating_add(1));
    }

    pub fn peek(&self) -> u64 {
        self.next
    }
}

/// Errors from structural site operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SiteError {
    #[error("rangefinder {0} does not exist")]
    UnknownRangefinder(RangefinderId),
    #[error("tripod {0} does not exist")]
    UnknownTripod(TripodId),
    #[error("camera {0} does not exist")]
    UnknownCamera(CameraId),
    #[error("photo {photo} of camera {camera} does not exist")]
    UnknownPhoto { camera: CameraId, photo: PhotoId },
    #[error("mapping {mapping} of photo {photo} does not exist")]
    UnknownMapping { photo: PhotoId, mapping: MappingId },
}

// ─────────────────────────────────────────────────────────────────────────────
// Parameter and residual references
// ─────────────────────────────────────────────────────────────────────────────

/// One scalar inside a tripod.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TripodParameter {
    Offset,
    OffsetSide,
    Position(usize),
}

/// One scalar inside a camera model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CameraParameter {
    HorizontalFov,
    PrincipalPoint(usize),
    Radial(usize),
    Tangential(usize),
    Affine(usize),
}

/// One scalar of a photo pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PhotoParameter {
    Position(usize),
    Orientation(usize),
}

/// Address of one unlocked scalar parameter in a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterRef {
    Point { point: PointId, axis: usize },
    Tripod { tripod: TripodId, slot: TripodParameter },
    Camera { camera: CameraId, slot: CameraParameter },
    Photo { camera: CameraId, photo: PhotoId, slot: PhotoParameter },
}

impl ParameterRef {
    /// Whether the axis or coefficient index exists on the addressed entity.
    pub fn slot_in_range(&self) -> bool {
        match *self {
            ParameterRef::Point { axis, .. } => axis < 3,
            ParameterRef::Tripod { slot, .. } => match slot {
                TripodParameter::Offset | TripodParameter::OffsetSide => true,
                TripodParameter::Position(axis) => axis < 3,
            },
            ParameterRef::Camera { slot, .. } => match slot {
                CameraParameter::HorizontalFov => true,
                CameraParameter::PrincipalPoint(axis) => axis < 2,
                CameraParameter::Radial(i) | CameraParameter::Tangential(i) => i < 4,
                CameraParameter::Affine(i) => i < 2,
            },
            ParameterRef::Photo { slot, .. } => match slot {
                PhotoParameter::Position(axis) | PhotoParameter::Orientation(axis) => axis < 3,
            },
        }
    }
}

/// Address of one residual contributor in a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResidualRef {
    Line(LineId),
    RangefinderMeasurement {
        rangefinder: RangefinderId,
        measurement: RangefinderMeasurementId,
    },
    TripodMeasurement {
        tripod: TripodId,
        measurement: TripodMeasurementId,
    },
    CameraPhoto { camera: CameraId, photo: PhotoId },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_id_display() {
        assert_eq!(format!("{}", PointId::new(12)), "P12");
        assert_eq!(format!("{}", MappingId::new(3)), "M3");
    }

    #[test]
    fn test_generator_is_shared_across_kinds() {
        let mut ids = IdGenerator::default();
        let p: PointId = ids.next_id();
        let c: CameraId = ids.next_id();
        let q: PointId = ids.next_id();
        assert_eq!((p.0, c.0, q.0), (0, 1, 2));
    }

    #[test]
    fn test_reserve_past() {
        let mut ids = IdGenerator::default();
        ids.reserve_past(41);
        let p: PointId = ids.next_id();
        assert_eq!(p, PointId(42));

        // Never moves backwards.
        ids.reserve_past(3);
        assert_eq!(ids.peek(), 43);
    }

    #[test]
    fn test_id_as_json_map_key() {
        use std::collections::BTreeMap;

        let mut map = BTreeMap::new();
        map.insert(PointId::new(7), "seven");
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(json, r#"{"7":"seven"}"#);

        let back: BTreeMap<PointId, String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back[&PointId::new(7)], "seven");
    }
}
