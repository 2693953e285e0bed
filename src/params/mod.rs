//! Optimizable parameters.
//!
//! Scalars implement [`Tweakable`]; entities that own several scalars
//! implement [`ParameterSet`] so the site can enumerate their unlocked slots.

pub mod composite;
pub mod scalar;

pub use composite::{Orientation, PixelCoordinate, Position};
pub use scalar::{Angle, Coefficient, Distance, PixelDistance, PositiveAngle, Tweakable};

/// An entity owning a fixed set of lockable scalar parameters.
///
/// Values passed through `parameter` / `set_parameter` are in optimizer
/// space (see [`Tweakable`]).
pub trait ParameterSet {
    /// Addresses one scalar inside the entity.
    type Slot: Copy;

    /// Slots that are currently unlocked, in a stable order.
    fn unlocked_parameters(&self) -> Vec<Self::Slot>;

    fn parameter(&self, slot: Self::Slot) -> f64;

    fn set_parameter(&mut self, slot: Self::Slot, value: f64);
}
