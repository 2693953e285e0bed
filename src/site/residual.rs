//! Residual contributors.
//!
//! A contributor emits one or more signed components, each already divided
//! by the accuracy of the instrument that produced the measurement. Its
//! squared residual is the sum of the squared components, and the
//! optimizer's objective is the sum over all contributors.

use std::collections::BTreeMap;

use super::point::Point;
use super::types::PointId;

/// Squared residual substituted for degenerate or behind-camera evaluations.
pub const RESIDUAL_PENALTY: f64 = 1_000_000.0;

/// Component whose square equals [`RESIDUAL_PENALTY`].
pub(crate) const PENALTY_COMPONENT: f64 = 1_000.0;

/// All points of a site, looked up by contributors.
pub type Points = BTreeMap<PointId, Point>;

/// Something that compares the current geometry against a measurement.
pub trait ResidualContributor {
    /// Entity whose parameters the contributor needs besides the points.
    type Owner: ?Sized;

    /// Append the weighted residual components to `out`.
    ///
    /// The number of appended components depends only on the structure of
    /// the site, never on parameter values.
    fn residual_components(&self, owner: &Self::Owner, points: &Points, out: &mut Vec<f64>);

    fn residual_sqr(&self, owner: &Self::Owner, points: &Points) -> f64 {
        let mut components = Vec::new();
        self.residual_components(owner, points, &mut components);
        sum_of_squares(&components)
    }
}

pub(crate) fn sum_of_squares(components: &[f64]) -> f64 {
    components.iter().map(|c| c * c).sum()
}

/// Replace a non-finite component with the penalty component.
pub(crate) fn finite_or_penalty(component: f64) -> f64 {
    if component.is_finite() {
        component
    } else {
        PENALTY_COMPONENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_penalty_component_squares_to_penalty() {
        assert_eq!(PENALTY_COMPONENT * PENALTY_COMPONENT, RESIDUAL_PENALTY);
        assert_eq!(sum_of_squares(&[finite_or_penalty(f64::NAN)]), RESIDUAL_PENALTY);
        assert_eq!(finite_or_penalty(-2.0), -2.0);
    }
}
