//! Type definitions for calibration

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::priors::Prior;

/// Parameter searched by the optimiser, with its bounds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationParameter {
    pub id: String,
    pub min_bound: f64,
    pub max_bound: f64,
    /// Starting point; the midpoint of the bounds when absent
    pub initial_guess: Option<f64>,
}

impl CalibrationParameter {
    pub fn new(id: impl Into<String>, min_bound: f64, max_bound: f64) -> Self {
        Self {
            id: id.into(),
            min_bound,
            max_bound,
            initial_guess: None,
        }
    }

    /// Bounds from the prior support (`[0, inf)` for unbounded priors),
    /// starting at the prior's central value
    pub fn from_prior(prior: &Prior) -> Self {
        let (min_bound, max_bound) = prior.bounds().unwrap_or((0.0, f64::INFINITY));
        Self {
            id: prior.name().to_string(),
            min_bound,
            max_bound,
            initial_guess: Some(prior.initial_value()),
        }
    }

    pub fn initial_value(&self) -> f64 {
        self.initial_guess
            .unwrap_or_else(|| (self.min_bound + self.max_bound) / 2.0)
    }

    pub fn is_within_bounds(&self, value: f64) -> bool {
        value >= self.min_bound && value <= self.max_bound
    }
}

/// Result from a calibration run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationResult {
    /// Best parameter values found, clamped to their bounds
    pub best_parameters: Vec<f64>,

    /// Parameter names (in same order as best_parameters)
    pub parameter_names: Vec<String>,

    /// Negative log posterior at the best parameters
    pub final_loss: f64,

    pub iterations: usize,

    pub converged: bool,

    pub termination_reason: String,
}

impl CalibrationResult {
    /// Get parameters as a HashMap for easy lookup
    pub fn parameters_map(&self) -> HashMap<String, f64> {
        self.parameter_names
            .iter()
            .zip(self.best_parameters.iter())
            .map(|(name, value)| (name.clone(), *value))
            .collect()
    }
}
