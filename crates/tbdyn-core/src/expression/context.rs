use std::collections::HashMap;

/// Values an expression can read while being evaluated.
///
/// Parameters are set once per parameter draw. Time, outputs and computed
/// values change at each evaluated time point.
#[derive(Debug, Clone, Default)]
pub struct EvaluationContext {
    parameters: HashMap<String, f64>,
    outputs: HashMap<String, f64>,
    computed_values: HashMap<String, f64>,
    time: f64,
}

impl EvaluationContext {
    /// Create an empty context at time zero
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context seeded with parameter values
    pub fn with_parameters(parameters: HashMap<String, f64>) -> Self {
        Self {
            parameters,
            ..Self::default()
        }
    }

    /// Set a parameter value
    pub fn set_parameter(&mut self, name: impl Into<String>, value: f64) {
        self.parameters.insert(name.into(), value);
    }

    /// Set multiple parameters
    pub fn set_parameters(&mut self, parameters: HashMap<String, f64>) {
        self.parameters.extend(parameters);
    }

    /// Set the current model time
    pub fn set_time(&mut self, time: f64) {
        self.time = time;
    }

    pub fn set_output(&mut self, name: impl Into<String>, value: f64) {
        self.outputs.insert(name.into(), value);
    }

    pub fn set_computed_value(&mut self, name: impl Into<String>, value: f64) {
        self.computed_values.insert(name.into(), value);
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    /// Get a single parameter value by name
    pub fn get_parameter(&self, name: &str) -> Option<f64> {
        self.parameters.get(name).copied()
    }

    pub fn get_output(&self, name: &str) -> Option<f64> {
        self.outputs.get(name).copied()
    }

    pub fn get_computed_value(&self, name: &str) -> Option<f64> {
        self.computed_values.get(name).copied()
    }

    /// Get a reference to all parameters
    pub fn parameters(&self) -> &HashMap<String, f64> {
        &self.parameters
    }
}
