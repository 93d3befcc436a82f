//! Priors, targets and the Bayesian model used to calibrate the TB model

use std::collections::{BTreeMap, HashMap};

use tbdyn_calibration::{BayesianCompartmentalModel, Prior, Target};
use tbdyn_core::TimeSeries;
use tracing::info;

use crate::error::{Result, TbError};
use crate::model::build_default_model;
use crate::params::FixedParams;

/// Every prior used in calibration
pub fn get_all_priors() -> Result<Vec<Prior>> {
    Ok(vec![
        Prior::uniform("contact_rate", (0.001, 0.05))?,
        Prior::beta("rr_infection_latent", 3.0, 8.0)?,
        Prior::beta("rr_infection_recovered", 2.0, 2.0)?,
        Prior::gamma_from_mode("progression_multiplier", 1.0, 2.0)?,
        Prior::truncated_normal("smear_positive_death_rate", 0.389, 0.0276, (0.335, 0.449))?,
        Prior::truncated_normal("smear_negative_death_rate", 0.025, 0.0041, (0.017, 0.035))?,
        Prior::truncated_normal("smear_positive_self_recovery", 0.231, 0.0276, (0.177, 0.288))?,
        Prior::truncated_normal("smear_negative_self_recovery", 0.130, 0.0291, (0.073, 0.209))?,
        Prior::uniform("screening_scaleup_shape", (0.05, 0.5))?,
        Prior::truncated_normal("screening_inflection_time", 2000.0, 3.5, (1990.0, 2010.0))?,
        Prior::gamma_from_mode("time_to_screening_end_asymp", 1.0, 5.0)?,
        // Sampled even when COVID effects are switched off, so one prior set
        // serves every model variant; the likelihood is then flat in both.
        Prior::uniform("detection_reduction", (0.01, 0.5))?,
        Prior::uniform("contact_reduction", (0.01, 0.8))?,
    ])
}

fn target_series<'a>(target_data: &'a BTreeMap<String, TimeSeries>, name: &str) -> Result<&'a TimeSeries> {
    target_data
        .get(name)
        .ok_or_else(|| TbError::MissingTarget(name.to_string()))
}

/// Calibration targets built from observed series keyed by output name.
///
/// Notifications and prevalence carry calibrated dispersions; population
/// size has a fixed standard deviation of 100,000.
pub fn get_targets(target_data: &BTreeMap<String, TimeSeries>) -> Result<Vec<Target>> {
    let mut targets = vec![Target::normal(
        "total_population",
        target_series(target_data, "total_population")?.clone(),
        100_000.0,
    )?];
    for (name, dispersion, bounds) in [
        ("notification", "notif_dispersion", (1000.0, 15000.0)),
        ("adults_prevalence_pulmonary", "prev_dispersion", (20.0, 70.0)),
        ("prevalence_smear_positive", "sptb_dispersion", (5.0, 30.0)),
    ] {
        targets.push(Target::normal_with_dispersion_prior(
            name,
            target_series(target_data, name)?.clone(),
            Prior::uniform(dispersion, bounds)?,
        )?);
    }
    Ok(targets)
}

/// The TB model with its priors and targets.
///
/// Default parameter values come from `fixed_params.parameters`, overridden
/// by `params`.
pub fn get_bcm(
    fixed_params: &FixedParams,
    params: HashMap<String, f64>,
    target_data: &BTreeMap<String, TimeSeries>,
) -> Result<BayesianCompartmentalModel> {
    let model = build_default_model(fixed_params)?;
    let mut parameters: HashMap<String, f64> = fixed_params
        .parameters
        .iter()
        .map(|(name, value)| (name.clone(), *value))
        .collect();
    parameters.extend(params);

    let priors = get_all_priors()?;
    let targets = get_targets(target_data)?;
    info!(
        priors = priors.len(),
        targets = targets.len(),
        "Assembled TB calibration"
    );
    Ok(BayesianCompartmentalModel::new(model, parameters, priors, targets)?)
}
