//! Survey entities and the site that aggregates them.

pub mod camera;
pub mod line;
pub mod photo;
pub mod point;
pub mod rangefinder;
pub mod residual;
#[allow(clippy::module_inception)]
pub mod site;
pub mod tripod;
pub mod types;

pub use camera::{Camera, CameraModel};
pub use line::Line;
pub use photo::{CameraPhoto, Mapping, SUGGESTION_DISTORTION_LIMIT, SuggestionStats};
pub use point::Point;
pub use rangefinder::{Rangefinder, RangefinderMeasurement};
pub use residual::{Points, RESIDUAL_PENALTY, ResidualContributor};
pub use site::Site;
pub use tripod::{Tripod, TripodMeasurement};
pub use types::{
    CameraId, CameraParameter, IdGenerator, LineId, MappingId, ParameterRef, PhotoId, PhotoParameter,
    PointId, RangefinderId, RangefinderMeasurementId, ResidualRef, SiteError, TripodId,
    TripodMeasurementId, TripodParameter,
};
