//! Maximum a posteriori calibration problem

use std::collections::HashMap;

use argmin::core::{CostFunction, Error};
use tbdyn_core::SimulationEngine;
use tracing::trace;

use crate::bayesian::BayesianCompartmentalModel;
use crate::error::{CalibrationError, Result};
use crate::types::CalibrationParameter;

/// Negative log posterior of a [`BayesianCompartmentalModel`] as a cost
/// function over every calibrated parameter, including target dispersions.
///
/// # Example
///
/// ```rust,ignore
/// use tbdyn_calibration::{optimize, CalibrationProblem, MapSearch};
///
/// let problem = CalibrationProblem::new(&bcm, engine)?;
/// let result = optimize(problem, &MapSearch { max_iterations: 500, ..MapSearch::default() })?;
/// println!("MAP estimate: {:?}", result.parameters_map());
/// ```
pub struct CalibrationProblem<'a, E: SimulationEngine> {
    bcm: &'a BayesianCompartmentalModel,
    engine: E,
    parameters: Vec<CalibrationParameter>,
}

impl<'a, E: SimulationEngine> CalibrationProblem<'a, E> {
    /// Fails if the model declares no priors
    pub fn new(bcm: &'a BayesianCompartmentalModel, engine: E) -> Result<Self> {
        let parameters: Vec<CalibrationParameter> = bcm
            .all_priors()
            .into_iter()
            .map(CalibrationParameter::from_prior)
            .collect();
        if parameters.is_empty() {
            return Err(CalibrationError::Configuration(
                "No calibration parameters provided".to_string(),
            ));
        }
        Ok(Self {
            bcm,
            engine,
            parameters,
        })
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters.len()
    }

    pub fn parameter_names(&self) -> Vec<String> {
        self.parameters.iter().map(|p| p.id.clone()).collect()
    }

    pub fn initial_parameters(&self) -> Vec<f64> {
        self.parameters.iter().map(|p| p.initial_value()).collect()
    }

    pub fn parameter_bounds(&self) -> Vec<(f64, f64)> {
        self.parameters
            .iter()
            .map(|p| (p.min_bound, p.max_bound))
            .collect()
    }

    /// Clamp parameter values to their bounds
    ///
    /// Nelder-Mead can step outside the bounds while exploring; the
    /// simulation always receives values inside them.
    pub fn clamp_to_bounds(&self, param_values: &[f64]) -> Vec<f64> {
        param_values
            .iter()
            .zip(&self.parameters)
            .map(|(value, param)| value.clamp(param.min_bound, param.max_bound))
            .collect()
    }

    fn validate_parameter_count(&self, param_values: &[f64]) -> Result<()> {
        if param_values.len() != self.parameters.len() {
            return Err(CalibrationError::Configuration(format!(
                "Expected {} parameters, got {}",
                self.parameters.len(),
                param_values.len()
            )));
        }
        Ok(())
    }

    fn named_values(&self, param_values: &[f64]) -> HashMap<String, f64> {
        self.parameters
            .iter()
            .zip(param_values)
            .map(|(param, value)| (param.id.clone(), *value))
            .collect()
    }

    /// Negative log posterior; infinite where the posterior vanishes
    pub fn negative_log_posterior(&self, param_values: &[f64]) -> Result<f64> {
        self.validate_parameter_count(param_values)?;
        let values = self.named_values(&self.clamp_to_bounds(param_values));
        let log_posterior = self.bcm.log_posterior(&self.engine, &values)?;
        trace!(log_posterior, "Evaluated posterior");
        Ok(if log_posterior.is_nan() {
            f64::INFINITY
        } else {
            -log_posterior
        })
    }
}

impl<E: SimulationEngine> CostFunction for CalibrationProblem<'_, E> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, param_values: &Self::Param) -> std::result::Result<Self::Output, Error> {
        self.negative_log_posterior(param_values)
            .map_err(|e| Error::msg(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bayesian::tests::{linear_bcm, LinearEngine};

    #[test]
    fn test_problem_from_priors() {
        let bcm = linear_bcm();
        let problem = CalibrationProblem::new(&bcm, LinearEngine).unwrap();
        assert_eq!(problem.parameter_names(), vec!["growth".to_string()]);
        assert_eq!(problem.parameter_bounds(), vec![(0.0, 10.0)]);
        assert_eq!(problem.initial_parameters(), vec![5.0]);
        assert_eq!(problem.clamp_to_bounds(&[12.0]), vec![10.0]);
    }

    #[test]
    fn test_cost_is_lowest_at_truth() {
        let bcm = linear_bcm();
        let problem = CalibrationProblem::new(&bcm, LinearEngine).unwrap();
        let at_truth = problem.cost(&vec![3.0]).unwrap();
        assert!(at_truth < problem.cost(&vec![2.5]).unwrap());
        assert!(at_truth < problem.cost(&vec![3.5]).unwrap());
        assert!(problem.cost(&vec![1.0, 2.0]).is_err());
    }
}
