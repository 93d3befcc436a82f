//! A compartmental model bundled with its priors and targets

use std::collections::{BTreeSet, HashMap};

use tbdyn_core::{CompartmentalModel, DerivedOutputs, SimulationEngine};
use tracing::debug;

use crate::error::{CalibrationError, Result};
use crate::priors::Prior;
use crate::targets::Target;

/// Model, default parameters, priors and targets for Bayesian calibration.
///
/// Parameter values drawn by a sampler override the defaults. Dispersion
/// priors of targets are calibrated alongside the model priors.
#[derive(Debug, Clone)]
pub struct BayesianCompartmentalModel {
    model: CompartmentalModel,
    parameters: HashMap<String, f64>,
    priors: Vec<Prior>,
    targets: Vec<Target>,
}

impl BayesianCompartmentalModel {
    /// Fails if a target has no saved output of the same name or if two
    /// priors share a name.
    pub fn new(
        model: CompartmentalModel,
        parameters: HashMap<String, f64>,
        priors: Vec<Prior>,
        targets: Vec<Target>,
    ) -> Result<Self> {
        for target in &targets {
            match model.output(target.name()) {
                Some(request) if request.save_results => {}
                _ => {
                    return Err(CalibrationError::Configuration(format!(
                        "target '{}' has no saved output",
                        target.name()
                    )))
                }
            }
        }

        let mut names = BTreeSet::new();
        let all = priors.iter().chain(targets.iter().filter_map(Target::dispersion_prior));
        for prior in all {
            if !names.insert(prior.name()) {
                return Err(CalibrationError::Configuration(format!(
                    "prior '{}' declared twice",
                    prior.name()
                )));
            }
        }

        debug!(
            priors = names.len(),
            targets = targets.len(),
            "Assembled Bayesian compartmental model"
        );
        Ok(Self {
            model,
            parameters,
            priors,
            targets,
        })
    }

    pub fn model(&self) -> &CompartmentalModel {
        &self.model
    }

    pub fn parameters(&self) -> &HashMap<String, f64> {
        &self.parameters
    }

    pub fn priors(&self) -> &[Prior] {
        &self.priors
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    /// Model priors followed by target dispersion priors
    pub fn all_priors(&self) -> Vec<&Prior> {
        self.priors
            .iter()
            .chain(self.targets.iter().filter_map(Target::dispersion_prior))
            .collect()
    }

    /// Defaults overridden by the given values
    pub fn merged_parameters(&self, values: &HashMap<String, f64>) -> HashMap<String, f64> {
        let mut merged = self.parameters.clone();
        merged.extend(values.iter().map(|(k, v)| (k.clone(), *v)));
        merged
    }

    /// Sum of prior log densities; every prior needs a value
    pub fn log_prior(&self, values: &HashMap<String, f64>) -> Result<f64> {
        let mut total = 0.0;
        for prior in self.all_priors() {
            let value = values.get(prior.name()).copied().ok_or_else(|| {
                CalibrationError::Configuration(format!("no value for prior '{}'", prior.name()))
            })?;
            total += prior.ln_pdf(value)?;
        }
        Ok(total)
    }

    /// Sum of target log likelihoods over already evaluated outputs
    pub fn log_likelihood(&self, outputs: &DerivedOutputs, values: &HashMap<String, f64>) -> Result<f64> {
        let parameters = self.merged_parameters(values);
        let mut total = 0.0;
        for target in &self.targets {
            total += target.log_likelihood(outputs, &parameters)?;
        }
        Ok(total)
    }

    /// Simulate with `engine` and evaluate the derived outputs
    pub fn run<E: SimulationEngine>(&self, engine: &E, values: &HashMap<String, f64>) -> Result<DerivedOutputs> {
        let parameters = self.merged_parameters(values);
        let results = engine.simulate(&self.model, &parameters)?;
        Ok(DerivedOutputs::evaluate(&self.model, &results, &parameters)?)
    }

    /// Log posterior up to a constant.
    ///
    /// Values outside the prior support return negative infinity without
    /// running the simulation.
    pub fn log_posterior<E: SimulationEngine>(&self, engine: &E, values: &HashMap<String, f64>) -> Result<f64> {
        let log_prior = self.log_prior(values)?;
        if log_prior == f64::NEG_INFINITY {
            return Ok(log_prior);
        }
        let outputs = self.run(engine, values)?;
        Ok(log_prior + self.log_likelihood(&outputs, values)?)
    }
}
