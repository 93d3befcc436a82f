//! Observed data that derived outputs are compared against

use std::collections::HashMap;

use statrs::distribution::{Continuous, Normal};
use tbdyn_core::{DerivedOutputs, TimeSeries};

use crate::error::{CalibrationError, Result};
use crate::priors::Prior;

/// Standard deviation of a target's observation model
#[derive(Debug, Clone, PartialEq)]
pub enum Dispersion {
    Fixed(f64),
    /// Calibrated alongside the model parameters under this prior
    Calibrated(Prior),
}

/// Normally distributed observations of one derived output
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    name: String,
    data: TimeSeries,
    dispersion: Dispersion,
}

impl Target {
    /// Target with a fixed standard deviation
    pub fn normal(name: impl Into<String>, data: TimeSeries, stdev: f64) -> Result<Self> {
        let name = name.into();
        if !stdev.is_finite() || stdev <= 0.0 {
            return Err(CalibrationError::Configuration(format!(
                "target '{}' needs a positive standard deviation, got {}",
                name, stdev
            )));
        }
        Self::with_dispersion(name, data, Dispersion::Fixed(stdev))
    }

    /// Target whose standard deviation is a calibrated parameter
    pub fn normal_with_dispersion_prior(
        name: impl Into<String>,
        data: TimeSeries,
        dispersion: Prior,
    ) -> Result<Self> {
        Self::with_dispersion(name.into(), data, Dispersion::Calibrated(dispersion))
    }

    fn with_dispersion(name: String, data: TimeSeries, dispersion: Dispersion) -> Result<Self> {
        if data.is_empty() {
            return Err(CalibrationError::Configuration(format!(
                "target '{}' has no observations",
                name
            )));
        }
        Ok(Self {
            name,
            data,
            dispersion,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &TimeSeries {
        &self.data
    }

    pub fn dispersion(&self) -> &Dispersion {
        &self.dispersion
    }

    pub fn dispersion_prior(&self) -> Option<&Prior> {
        match &self.dispersion {
            Dispersion::Calibrated(prior) => Some(prior),
            Dispersion::Fixed(_) => None,
        }
    }

    /// Standard deviation under the given parameter values
    pub fn stdev(&self, parameters: &HashMap<String, f64>) -> Result<f64> {
        match &self.dispersion {
            Dispersion::Fixed(stdev) => Ok(*stdev),
            Dispersion::Calibrated(prior) => parameters.get(prior.name()).copied().ok_or_else(|| {
                CalibrationError::Configuration(format!(
                    "no value for dispersion parameter '{}' of target '{}'",
                    prior.name(),
                    self.name
                ))
            }),
        }
    }

    /// Sum of normal log densities of the observations around the modelled
    /// output at each observed time
    pub fn log_likelihood(&self, outputs: &DerivedOutputs, parameters: &HashMap<String, f64>) -> Result<f64> {
        let stdev = self.stdev(parameters)?;
        if !(stdev > 0.0) {
            return Ok(f64::NEG_INFINITY);
        }
        let mut total = 0.0;
        for (time, observed) in self.data.iter() {
            let modelled = outputs.value_at(&self.name, time).ok_or_else(|| {
                CalibrationError::Configuration(format!(
                    "output '{}' has no value at target time {}",
                    self.name, time
                ))
            })?;
            let normal = Normal::new(modelled, stdev)
                .map_err(|e| CalibrationError::Configuration(format!("target '{}': {}", self.name, e)))?;
            total += normal.ln_pdf(observed);
        }
        Ok(total)
    }
}
