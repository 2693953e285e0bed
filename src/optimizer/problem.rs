//! Least-squares view of a site.
//!
//! Solvers only see a parameter vector and a residual vector. Every
//! evaluation writes the candidate vector into the site and evaluates all
//! contributors, after checking whether the caller asked to stop.

use nalgebra::{DMatrix, DVector};

use crate::site::{ParameterRef, ResidualRef, Site};

pub struct SiteProblem<'a> {
    site: &'a mut Site,
    params: Vec<ParameterRef>,
    residuals: Vec<ResidualRef>,
    should_stop: &'a dyn Fn() -> bool,
    evaluations: usize,
    scratch: Vec<f64>,
}

impl<'a> SiteProblem<'a> {
    pub fn new(
        site: &'a mut Site,
        params: Vec<ParameterRef>,
        residuals: Vec<ResidualRef>,
        should_stop: &'a dyn Fn() -> bool,
    ) -> Self {
        Self {
            site,
            params,
            residuals,
            should_stop,
            evaluations: 0,
            scratch: Vec::new(),
        }
    }

    pub fn params(&self) -> &[ParameterRef] {
        &self.params
    }

    pub fn num_params(&self) -> usize {
        self.params.len()
    }

    pub fn num_residuals(&self) -> usize {
        self.residuals.len()
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations
    }

    pub fn stop_requested(&self) -> bool {
        (self.should_stop)()
    }

    /// Current parameter values in optimizer space.
    pub fn initial_vector(&self) -> DVector<f64> {
        DVector::from_vec(self.site.parameter_values(&self.params))
    }

    /// Write `x` into the site.
    pub fn write(&mut self, x: &DVector<f64>) {
        for (&param, &value) in self.params.iter().zip(x.iter()) {
            self.site.set_parameter(param, value);
        }
    }

    /// Stacked residual components at `x`, or `None` if a stop was requested.
    pub fn residuals_at(&mut self, x: &DVector<f64>) -> Option<DVector<f64>> {
        if self.stop_requested() {
            return None;
        }
        self.write(x);
        self.evaluations += 1;

        self.scratch.clear();
        for &residual in &self.residuals {
            self.site.residual_components(residual, &mut self.scratch);
        }
        Some(DVector::from_column_slice(&self.scratch))
    }

    /// Objective (sum of squared components) at `x`, or `None` if stopped.
    pub fn objective_at(&mut self, x: &DVector<f64>) -> Option<f64> {
        self.residuals_at(x).map(|r| r.norm_squared())
    }

    /// Forward difference Jacobian around `x` where the residuals are `r0`.
    ///
    /// Each column uses a step of `relative_step · max(|x_j|, 1)`. Returns
    /// `None` if a stop was requested part way.
    pub fn jacobian_at(
        &mut self,
        x: &DVector<f64>,
        r0: &DVector<f64>,
        relative_step: f64,
    ) -> Option<DMatrix<f64>> {
        let mut jacobian = DMatrix::zeros(r0.len(), x.len());
        let mut probe = x.clone();

        for j in 0..x.len() {
            let h = relative_step * x[j].abs().max(1.0);
            probe[j] = x[j] + h;
            let r = self.residuals_at(&probe)?;
            probe[j] = x[j];

            let column = (r - r0) / h;
            jacobian.set_column(j, &column);
        }

        Some(jacobian)
    }

    /// Write `x` back and refresh the site's display caches. Returns the
    /// objective at `x`.
    pub fn finish(mut self, x: &DVector<f64>) -> f64 {
        self.write(x);
        self.site.evaluate_objective()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Position;
    use crate::site::{Rangefinder, RangefinderMeasurement};
    use approx::assert_relative_eq;
    use std::cell::Cell;

    fn site() -> Site {
        let mut site = Site::new("t");
        let a = site.add_point("a", Position::fixed(0.0, 0.0, 0.0));
        let b = site.add_point("b", Position::new(2.0, 0.0, 0.0));
        let rf = site.add_rangefinder(Rangefinder::new("r"));
        site.add_rangefinder_measurement(rf, RangefinderMeasurement::new(a, b, 1.0))
            .unwrap();
        site
    }

    #[test]
    fn test_jacobian_matches_analytic() {
        let mut site = site();
        let (params, residuals) = site.flatten_parameters();
        let never = || false;
        let mut problem = SiteProblem::new(&mut site, params, residuals, &never);

        let x = problem.initial_vector();
        let r0 = problem.residuals_at(&x).unwrap();
        // (2 - 1) / 0.01
        assert_relative_eq!(r0[0], 100.0, epsilon = 1e-9);

        let j = problem.jacobian_at(&x, &r0, 1e-7).unwrap();
        // d|b|/db = b / |b| = (1, 0, 0), divided by the accuracy.
        assert_relative_eq!(j[(0, 0)], 100.0, max_relative = 1e-4);
        assert_relative_eq!(j[(0, 1)], 0.0, epsilon = 1e-2);
        assert_relative_eq!(j[(0, 2)], 0.0, epsilon = 1e-2);
        assert_eq!(problem.evaluations(), 4);
    }

    #[test]
    fn test_stop_is_polled_before_evaluation() {
        let mut site = site();
        let (params, residuals) = site.flatten_parameters();
        let calls = Cell::new(0);
        let stop_after_two = || {
            calls.set(calls.get() + 1);
            calls.get() > 2
        };
        let mut problem = SiteProblem::new(&mut site, params, residuals, &stop_after_two);

        let x = problem.initial_vector();
        let r0 = problem.residuals_at(&x).unwrap();
        assert!(problem.jacobian_at(&x, &r0, 1e-7).is_none());
        assert_eq!(problem.evaluations(), 2);
    }
}
