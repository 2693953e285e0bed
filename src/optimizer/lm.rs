//! Levenberg–Marquardt on the stacked residual components.
//!
//! Each iteration solves
//!
//! ```text
//! (JᵀJ + λ diag(JᵀJ)) δ = −Jᵀr
//! ```
//!
//! with a forward difference Jacobian. A step is taken only if it lowers the
//! objective; `λ` shrinks after accepted steps and grows after rejected ones.

use nalgebra::DVector;
use tracing::debug;

use super::problem::SiteProblem;
use super::{OptimizerConfig, Progress, SolveOutcome, Termination};

pub(crate) fn levenberg_marquardt(
    problem: &mut SiteProblem<'_>,
    config: &OptimizerConfig,
    on_progress: &mut dyn FnMut(&Progress<'_>),
) -> SolveOutcome {
    let mut x = problem.initial_vector();
    let num_params = x.len();

    let Some(mut residuals) = problem.residuals_at(&x) else {
        return SolveOutcome::unevaluated(x, Termination::Stopped);
    };
    let mut cost = residuals.norm_squared();
    let initial_cost = cost;

    let mut lambda = config.damping.initial;
    let mut iterations = 0;
    let mut termination = Termination::MaxIterations;

    for iter in 0..config.max_iterations {
        if cost <= config.objective_tolerance {
            termination = Termination::Converged;
            break;
        }

        iterations = iter + 1;

        let Some(jacobian) = problem.jacobian_at(&x, &residuals, config.jacobian_step) else {
            termination = Termination::Stopped;
            break;
        };

        let gradient = jacobian.tr_mul(&residuals);
        let jtj = jacobian.tr_mul(&jacobian);

        if gradient.norm() < config.gradient_tolerance {
            termination = Termination::Converged;
            break;
        }

        let mut damped_jtj = jtj;
        for i in 0..num_params {
            damped_jtj[(i, i)] += lambda * damped_jtj[(i, i)].max(1e-6);
        }

        let Some(delta) = damped_jtj.lu().solve(&(-&gradient)) else {
            termination = Termination::Stalled;
            break;
        };

        if delta.norm() < config.param_tolerance * (x.norm() + config.param_tolerance) {
            termination = Termination::Converged;
            break;
        }

        let trial: DVector<f64> = &x + &delta;
        let Some(trial_residuals) = problem.residuals_at(&trial) else {
            termination = Termination::Stopped;
            break;
        };
        let trial_cost = trial_residuals.norm_squared();

        if trial_cost < cost {
            x = trial;
            residuals = trial_residuals;
            cost = trial_cost;
            lambda = (lambda * config.damping.down).max(config.damping.min);
        } else {
            if lambda >= config.damping.max {
                termination = Termination::Stalled;
                break;
            }
            lambda = (lambda * config.damping.up).min(config.damping.max);
        }

        debug!(
            "LM iter {}: objective={:.6e}, lambda={:.1e}, |g|={:.3e}",
            iterations,
            cost,
            lambda,
            gradient.norm()
        );

        on_progress(&Progress {
            iteration: iterations,
            objective: cost,
            parameters: problem.params(),
            values: x.as_slice(),
        });
    }

    SolveOutcome {
        best: x,
        initial_objective: Some(initial_cost),
        iterations,
        termination,
    }
}
