//! Nonlinear least-squares optimization of a site.
//!
//! The optimizer only knows the flattened lists produced by
//! [`Site::flatten_parameters`]: a vector of unlocked scalars and a list of
//! residual contributors. Two solvers are available:
//! - Levenberg–Marquardt on the stacked residual components (default)
//! - Nelder–Mead on the scalar objective
//!
//! Both only ever accept parameter vectors that lower the objective, so the
//! objective after a run is never higher than before it.

mod lm;
mod nelder_mead;
pub mod problem;

use std::fmt;
use std::time::Duration;

use nalgebra::DVector;
use thiserror::Error;
use tracing::info;

use crate::site::{ParameterRef, ResidualRef, Site};

use problem::SiteProblem;

/// Configuration errors, reported before any work starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum OptimizeError {
    #[error("site has no unlocked parameters")]
    NoParameters,
    #[error("site has no residual contributors")]
    NoResiduals,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SolverMethod {
    #[default]
    LevenbergMarquardt,
    NelderMead,
}

impl fmt::Display for SolverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverMethod::LevenbergMarquardt => write!(f, "Levenberg-Marquardt"),
            SolverMethod::NelderMead => write!(f, "Nelder-Mead"),
        }
    }
}

/// Why a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// A tolerance was reached.
    Converged,
    MaxIterations,
    /// The stop callback returned true.
    Stopped,
    /// No further progress possible (singular system or damping at its bound).
    Stalled,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Termination::Converged => "converged",
            Termination::MaxIterations => "max iterations reached",
            Termination::Stopped => "stopped",
            Termination::Stalled => "stalled",
        };
        f.write_str(s)
    }
}

/// Levenberg–Marquardt damping schedule.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DampingSchedule {
    pub initial: f64,
    /// Factor applied after a rejected step.
    pub up: f64,
    /// Factor applied after an accepted step.
    pub down: f64,
    pub min: f64,
    pub max: f64,
}

impl Default for DampingSchedule {
    fn default() -> Self {
        Self {
            initial: 1e-3,
            up: 10.0,
            down: 0.1,
            min: 1e-10,
            max: 1e10,
        }
    }
}

/// Configuration for a site optimization.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub method: SolverMethod,
    /// Maximum number of solver iterations.
    pub max_iterations: usize,
    /// Convergence threshold on the gradient norm.
    pub gradient_tolerance: f64,
    /// Convergence threshold on the relative step size.
    pub param_tolerance: f64,
    /// Objective values at or below this count as converged.
    pub objective_tolerance: f64,
    /// Relative forward difference step for the Jacobian.
    pub jacobian_step: f64,
    pub damping: DampingSchedule,
    /// Nelder–Mead initial simplex size, relative to `max(|x|, 1)`.
    pub simplex_step: f64,
    /// How often a background run copies its progress into the live site.
    pub sync_interval: Duration,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            method: SolverMethod::LevenbergMarquardt,
            max_iterations: 1000,
            gradient_tolerance: 1e-8,
            param_tolerance: 1e-8,
            objective_tolerance: 1e-16,
            jacobian_step: 1e-7,
            damping: DampingSchedule::default(),
            simplex_step: 0.1,
            sync_interval: Duration::from_millis(250),
        }
    }
}

/// Accepted state after one solver iteration.
pub struct Progress<'a> {
    pub iteration: usize,
    pub objective: f64,
    pub parameters: &'a [ParameterRef],
    /// Values for `parameters`, in optimizer space.
    pub values: &'a [f64],
}

/// Summary of a finished run.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizeReport {
    pub method: SolverMethod,
    pub iterations: usize,
    /// Number of residual evaluations, including Jacobian columns.
    pub evaluations: usize,
    pub initial_objective: f64,
    pub final_objective: f64,
    pub termination: Termination,
    pub num_parameters: usize,
    pub num_residuals: usize,
}

impl fmt::Display for OptimizeReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} after {} iterations ({} evaluations), objective {:.6e} -> {:.6e}, {} parameters, {} residuals",
            self.method,
            self.termination,
            self.iterations,
            self.evaluations,
            self.initial_objective,
            self.final_objective,
            self.num_parameters,
            self.num_residuals
        )
    }
}

/// What a solver hands back to [`optimize`].
pub(crate) struct SolveOutcome {
    pub best: DVector<f64>,
    pub initial_objective: Option<f64>,
    pub iterations: usize,
    pub termination: Termination,
}

impl SolveOutcome {
    /// A run that ended before the first evaluation.
    pub fn unevaluated(start: DVector<f64>, termination: Termination) -> Self {
        Self {
            best: start,
            initial_objective: None,
            iterations: 0,
            termination,
        }
    }
}

/// Flatten `site` and check that there is something to optimize.
pub fn validate(site: &Site) -> Result<(Vec<ParameterRef>, Vec<ResidualRef>), OptimizeError> {
    let (params, residuals) = site.flatten_parameters();
    if params.is_empty() {
        return Err(OptimizeError::NoParameters);
    }
    if residuals.is_empty() {
        return Err(OptimizeError::NoResiduals);
    }
    Ok((params, residuals))
}

/// Minimize the site objective in place.
///
/// `should_stop` is polled before every objective evaluation; once it
/// returns true the best vector found so far is written back and the report
/// says [`Termination::Stopped`]. `on_progress` is called after every
/// iteration with the currently accepted vector.
pub fn optimize(
    site: &mut Site,
    config: &OptimizerConfig,
    should_stop: &dyn Fn() -> bool,
    on_progress: &mut dyn FnMut(&Progress<'_>),
) -> Result<OptimizeReport, OptimizeError> {
    let (params, residuals) = validate(site)?;
    let num_parameters = params.len();
    let num_residuals = residuals.len();

    info!(
        "Optimizing {} parameters against {} residuals ({})",
        num_parameters, num_residuals, config.method
    );

    let mut problem = SiteProblem::new(site, params, residuals, should_stop);
    let outcome = match config.method {
        SolverMethod::LevenbergMarquardt => lm::levenberg_marquardt(&mut problem, config, on_progress),
        SolverMethod::NelderMead => nelder_mead::nelder_mead(&mut problem, config, on_progress),
    };

    let evaluations = problem.evaluations();
    let final_objective = problem.finish(&outcome.best);
    let initial_objective = outcome.initial_objective.unwrap_or(final_objective);

    let report = OptimizeReport {
        method: config.method,
        iterations: outcome.iterations,
        evaluations,
        initial_objective,
        final_objective,
        termination: outcome.termination,
        num_parameters,
        num_residuals,
    };
    info!("{}", report);
    Ok(report)
}
