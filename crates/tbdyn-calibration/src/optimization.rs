//! Nelder-Mead search for the maximum a posteriori point

use argmin::core::observers::{Observe, ObserverMode};
use argmin::core::{Executor, State, TerminationReason, TerminationStatus, KV};
use argmin::solver::neldermead::NelderMead;
use tbdyn_core::SimulationEngine;
use tracing::{debug, info};

use crate::calibration_problem::CalibrationProblem;
use crate::error::{CalibrationError, Result};
use crate::types::CalibrationResult;

/// Stopping rule and starting simplex of the posterior mode search
#[derive(Debug, Clone)]
pub struct MapSearch {
    pub max_iterations: u64,
    /// Stop once the standard deviation of the simplex costs falls below this
    pub sd_tolerance: f64,
    /// Relative offset of each extra simplex vertex from the starting point
    pub initial_step: f64,
    /// Log every iteration through [`TracingObserver`]
    pub log_iterations: bool,
}

impl Default for MapSearch {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            sd_tolerance: 1e-6,
            initial_step: 0.1,
            log_iterations: false,
        }
    }
}

/// Observer that reports optimisation progress through `tracing`
#[derive(Debug, Default)]
pub struct TracingObserver;

impl<I> Observe<I> for TracingObserver
where
    I: State,
    <I as State>::Float: std::fmt::LowerExp,
{
    fn observe_iter(&mut self, state: &I, _kv: &KV) -> std::result::Result<(), argmin::core::Error> {
        let evaluations = state.get_func_counts().get("cost_count").copied().unwrap_or(0);
        debug!(
            iteration = state.get_iter(),
            cost = %format!("{:.6e}", state.get_cost()),
            best_cost = %format!("{:.6e}", state.get_best_cost()),
            evaluations,
            "Nelder-Mead iteration"
        );
        Ok(())
    }
}

/// n + 1 vertices for n parameters, each extra vertex perturbing one
/// coordinate; zero coordinates get an absolute step
fn initial_simplex(initial_params: &[f64], step: f64) -> Vec<Vec<f64>> {
    let mut vertices = vec![initial_params.to_vec()];
    for i in 0..initial_params.len() {
        let mut vertex = initial_params.to_vec();
        vertex[i] = if vertex[i] == 0.0 { step } else { vertex[i] * (1.0 + step) };
        vertices.push(vertex);
    }
    vertices
}

/// Search for the posterior mode of a calibration problem, to seed an
/// external sampler
pub fn optimize<E: SimulationEngine>(problem: CalibrationProblem<'_, E>, config: &MapSearch) -> Result<CalibrationResult> {
    let initial_params = problem.initial_parameters();
    let parameter_names = problem.parameter_names();
    let bounds = problem.parameter_bounds();

    info!(
        parameters = ?parameter_names,
        initial_values = ?initial_params,
        max_iterations = config.max_iterations,
        sd_tolerance = config.sd_tolerance,
        "Starting Nelder-Mead optimisation"
    );

    let solver = NelderMead::new(initial_simplex(&initial_params, config.initial_step))
        .with_sd_tolerance(config.sd_tolerance)
        .map_err(|e| CalibrationError::Optimization(format!("Invalid sd_tolerance: {}", e)))?;
    let mut executor =
        Executor::new(problem, solver).configure(|state| state.max_iters(config.max_iterations));
    if config.log_iterations {
        executor = executor.add_observer(TracingObserver, ObserverMode::Always);
    }
    let result = executor
        .run()
        .map_err(|e| CalibrationError::Optimization(e.to_string()))?;

    let state = result.state();
    let best_parameters: Vec<f64> = state
        .best_param
        .clone()
        .unwrap_or(initial_params)
        .iter()
        .zip(&bounds)
        .map(|(value, (low, high))| value.clamp(*low, *high))
        .collect();

    let calibration = CalibrationResult {
        best_parameters,
        parameter_names,
        final_loss: state.best_cost,
        iterations: state.iter as usize,
        converged: matches!(
            state.termination_status,
            TerminationStatus::Terminated(TerminationReason::SolverConverged)
        ),
        termination_reason: format!("{:?}", state.termination_status),
    };
    info!(
        final_loss = calibration.final_loss,
        iterations = calibration.iterations,
        reason = %calibration.termination_reason,
        "Finished Nelder-Mead optimisation"
    );
    Ok(calibration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayesian::tests::{linear_bcm, LinearEngine};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_recovers_growth_rate() {
        let bcm = linear_bcm();
        let problem = CalibrationProblem::new(&bcm, LinearEngine).unwrap();
        let config = MapSearch {
            max_iterations: 500,
            sd_tolerance: 1e-10,
            log_iterations: true,
            ..MapSearch::default()
        };
        let result = optimize(problem, &config).unwrap();
        assert_abs_diff_eq!(result.parameters_map()["growth"], 3.0, epsilon = 1e-3);
        assert_eq!(result.parameter_names, vec!["growth".to_string()]);
        assert!(result.converged);
    }

    #[test]
    fn test_iteration_cap_stops_search() {
        let bcm = linear_bcm();
        let problem = CalibrationProblem::new(&bcm, LinearEngine).unwrap();
        let config = MapSearch {
            max_iterations: 2,
            sd_tolerance: 0.0,
            ..MapSearch::default()
        };
        let result = optimize(problem, &config).unwrap();
        assert_eq!(result.iterations, 2);
        assert!(!result.converged);
        assert!(result.termination_reason.contains("MaxItersReached"));
    }

    #[test]
    fn test_loose_tolerance_converges_early() {
        let bcm = linear_bcm();
        let problem = CalibrationProblem::new(&bcm, LinearEngine).unwrap();
        let config = MapSearch {
            sd_tolerance: 1e12,
            ..MapSearch::default()
        };
        let result = optimize(problem, &config).unwrap();
        assert!(result.converged);
        assert!(result.iterations <= 1);
    }

    #[test]
    fn test_initial_simplex_step() {
        let vertices = initial_simplex(&[2.0, 0.0], 0.5);
        assert_eq!(vertices, vec![vec![2.0, 0.0], vec![3.0, 0.0], vec![2.0, 0.5]]);

        let bcm = linear_bcm();
        let problem = CalibrationProblem::new(&bcm, LinearEngine).unwrap();
        let config = MapSearch {
            sd_tolerance: -1.0,
            ..MapSearch::default()
        };
        assert!(optimize(problem, &config).is_err());
    }
}
