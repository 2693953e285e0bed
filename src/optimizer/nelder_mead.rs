//! Derivative-free Nelder–Mead simplex search on the objective.

use nalgebra::DVector;
use tracing::debug;

use super::problem::SiteProblem;
use super::{OptimizerConfig, Progress, SolveOutcome, Termination};

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

struct Vertex {
    x: DVector<f64>,
    f: f64,
}

pub(crate) fn nelder_mead(
    problem: &mut SiteProblem<'_>,
    config: &OptimizerConfig,
    on_progress: &mut dyn FnMut(&Progress<'_>),
) -> SolveOutcome {
    let x0 = problem.initial_vector();
    let n = x0.len();

    let Some(f0) = problem.objective_at(&x0) else {
        return SolveOutcome::unevaluated(x0, Termination::Stopped);
    };
    let initial_cost = f0;

    let mut simplex = vec![Vertex { x: x0.clone(), f: f0 }];
    for i in 0..n {
        let mut x = x0.clone();
        x[i] += config.simplex_step * x0[i].abs().max(1.0);
        let Some(f) = problem.objective_at(&x) else {
            return best_of(simplex, initial_cost, 0, Termination::Stopped);
        };
        simplex.push(Vertex { x, f });
    }

    let mut iterations = 0;
    let mut termination = Termination::MaxIterations;

    'outer: for iter in 0..config.max_iterations {
        simplex.sort_by(|a, b| a.f.total_cmp(&b.f));

        let best = simplex[0].f;
        let worst = simplex[n].f;
        let spread = simplex[1..]
            .iter()
            .map(|v| (&v.x - &simplex[0].x).amax())
            .fold(0.0, f64::max);
        if best <= config.objective_tolerance
            || ((worst - best).abs() <= config.objective_tolerance.max(f64::EPSILON * best.abs())
                && spread <= config.param_tolerance.max(f64::EPSILON))
        {
            termination = Termination::Converged;
            break;
        }

        iterations = iter + 1;

        let centroid = simplex[..n]
            .iter()
            .fold(DVector::zeros(n), |acc, v| acc + &v.x)
            / n as f64;

        let reflected = &centroid + (&centroid - &simplex[n].x) * REFLECTION;
        let Some(f_reflected) = problem.objective_at(&reflected) else {
            termination = Termination::Stopped;
            break;
        };

        if f_reflected < simplex[0].f {
            let expanded = &centroid + (&reflected - &centroid) * EXPANSION;
            let Some(f_expanded) = problem.objective_at(&expanded) else {
                termination = Termination::Stopped;
                break;
            };
            simplex[n] = if f_expanded < f_reflected {
                Vertex { x: expanded, f: f_expanded }
            } else {
                Vertex { x: reflected, f: f_reflected }
            };
        } else if f_reflected < simplex[n - 1].f {
            simplex[n] = Vertex { x: reflected, f: f_reflected };
        } else {
            // Contract towards the better of the worst and reflected points.
            let (toward, f_toward) = if f_reflected < simplex[n].f {
                (reflected, f_reflected)
            } else {
                (simplex[n].x.clone(), simplex[n].f)
            };
            let contracted = &centroid + (&toward - &centroid) * CONTRACTION;
            let Some(f_contracted) = problem.objective_at(&contracted) else {
                termination = Termination::Stopped;
                break;
            };

            if f_contracted < f_toward {
                simplex[n] = Vertex { x: contracted, f: f_contracted };
            } else {
                let anchor = simplex[0].x.clone();
                for vertex in simplex.iter_mut().skip(1) {
                    vertex.x = &anchor + (&vertex.x - &anchor) * SHRINK;
                    match problem.objective_at(&vertex.x) {
                        Some(f) => vertex.f = f,
                        None => {
                            // Not evaluated, so it can never be picked as best.
                            vertex.f = f64::INFINITY;
                            termination = Termination::Stopped;
                            break 'outer;
                        }
                    }
                }
            }
        }

        if let Some(v) = simplex.iter().min_by(|a, b| a.f.total_cmp(&b.f)) {
            debug!("Nelder-Mead iter {}: objective={:.6e}", iterations, v.f);
            on_progress(&Progress {
                iteration: iterations,
                objective: v.f,
                parameters: problem.params(),
                values: v.x.as_slice(),
            });
        }
    }

    best_of(simplex, initial_cost, iterations, termination)
}

fn best_of(
    simplex: Vec<Vertex>,
    initial_cost: f64,
    iterations: usize,
    termination: Termination,
) -> SolveOutcome {
    // The best value never rises above the starting objective.
    let best = simplex
        .into_iter()
        .min_by(|a, b| a.f.total_cmp(&b.f))
        .map_or_else(|| DVector::zeros(0), |v| v.x);
    SolveOutcome {
        best,
        initial_objective: Some(initial_cost),
        iterations,
        termination,
    }
}
