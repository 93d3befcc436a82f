use std::collections::BTreeMap;

use nalgebra::DMatrix;
use tbdyn_core::functions::{average_age_for_bcg, average_sigmoid};
use tbdyn_core::{Adjustment, Expr, Function, ModelError, Result, Stratification};
use tracing::debug;

use crate::constants::age_stratum_names;
use crate::model::treatment_outcome_rate;
use crate::params::{value_for_age, FixedParams};

/// Youngest age at which diabetes raises progression to active disease
const DIABETES_MINIMUM_AGE: u32 = 15;

/// Natural death rate of an age group
pub fn natural_death_rate(fixed_params: &FixedParams, age: u32) -> Expr {
    value_for_age(&fixed_params.age.death_rates, age)
        .map(Expr::constant)
        .unwrap_or_else(|| Expr::parameter("crude_death_rate"))
}

/// Multiplier on infection of susceptibles from BCG vaccination.
///
/// Protection wanes with age as a logistic curve averaged over the age
/// group; the oldest group is unaffected.
fn bcg_adjustments(
    age_strata: &[u32],
    coverage: Expr,
    inflection: f64,
) -> Result<BTreeMap<String, Adjustment>> {
    let mut adjustments = BTreeMap::new();
    for (i, age) in age_strata.iter().enumerate() {
        let adjustment = if i + 1 == age_strata.len() {
            Adjustment::multiply(1.0)
        } else {
            let average_age = average_age_for_bcg(*age, age_strata)?;
            let vaccinated_multiplier = average_sigmoid(0.0, average_age, inflection);
            Adjustment::multiply(Expr::call(
                Function::BcgMultiplier,
                vec![coverage.clone(), Expr::constant(vaccinated_multiplier)],
            )?)
        };
        adjustments.insert(age.to_string(), adjustment);
    }
    Ok(adjustments)
}

/// Latency rates by age, scaled by `progression_multiplier` for activation
/// and reduced by diabetes in adults
fn latency_adjustments(
    flow_name: &str,
    rates: &BTreeMap<u32, f64>,
    age_strata: &[u32],
    fixed_params: &FixedParams,
) -> Result<BTreeMap<String, Adjustment>> {
    let is_activation = flow_name != "stabilisation";
    let mut adjustments = BTreeMap::new();
    for age in age_strata {
        let rate = value_for_age(rates, *age).ok_or_else(|| {
            ModelError::configuration(format!("no {} rate for age group {}", flow_name, age))
        })?;
        let mut value = Expr::constant(rate);
        if is_activation {
            value = value * Expr::parameter("progression_multiplier");
            if *age >= DIABETES_MINIMUM_AGE {
                let prop_diabetes = value_for_age(&fixed_params.age.prop_diabetes, *age).unwrap_or(0.0);
                value = Expr::call(
                    Function::LatencyWithDiabetes,
                    vec![
                        Expr::time(),
                        Expr::constant(prop_diabetes),
                        value,
                        Expr::parameter("rr_progression_diabetes"),
                    ],
                )?;
            }
        }
        adjustments.insert(age.to_string(), Adjustment::overwrite(value));
    }
    Ok(adjustments)
}

/// Age structure: ageing between groups, contact-matrix mixing, births into
/// the youngest group, BCG protection, and age-specific latency, mortality
/// and treatment outcomes.
pub fn get_age_strat(
    compartments: &[impl AsRef<str>],
    age_strata: &[u32],
    fixed_params: &FixedParams,
    contact_matrix: &DMatrix<f64>,
) -> Result<Stratification> {
    let age_params = &fixed_params.age;
    let mut strat = Stratification::new("age", &age_stratum_names(age_strata), compartments)?;
    if let Some(split) = &age_params.population_split {
        strat.set_population_split(split.clone())?;
    }
    strat.set_mixing_matrix(contact_matrix.clone())?;
    strat.enable_ageing()?;

    let births = age_strata
        .iter()
        .enumerate()
        .map(|(i, age)| (age.to_string(), Adjustment::multiply(if i == 0 { 1.0 } else { 0.0 })))
        .collect();
    strat.set_flow_adjustments("birth", births)?;

    if let Some(coverage) = &age_params.bcg_coverage {
        let coverage = Expr::sigmoidal_interpolation(
            coverage.times().to_vec(),
            coverage.values().iter().copied().map(Expr::constant).collect(),
        )?;
        strat.set_flow_adjustments(
            "infection_from_susceptible",
            bcg_adjustments(age_strata, coverage, age_params.bcg_effect_inflection)?,
        )?;
    }

    for (flow_name, rates) in [
        ("stabilisation", &age_params.stabilisation),
        ("early_activation", &age_params.early_activation),
        ("late_activation", &age_params.late_activation),
    ] {
        strat.set_flow_adjustments(
            flow_name,
            latency_adjustments(flow_name, rates, age_strata, fixed_params)?,
        )?;
    }

    let deaths = age_strata
        .iter()
        .map(|age| {
            (
                age.to_string(),
                Adjustment::overwrite(natural_death_rate(fixed_params, *age)),
            )
        })
        .collect();
    strat.set_flow_adjustments("universal_death", deaths)?;

    for (flow_name, function) in [
        ("treatment_recovery", Function::TreatmentSuccessRate),
        ("treatment_death", Function::TreatmentDeathRate),
        ("relapse", Function::RelapseRate),
    ] {
        let mut adjustments = BTreeMap::new();
        for age in age_strata {
            let rate = treatment_outcome_rate(function, natural_death_rate(fixed_params, *age))?;
            adjustments.insert(age.to_string(), Adjustment::overwrite(rate));
        }
        strat.set_flow_adjustments(flow_name, adjustments)?;
    }

    debug!(
        strata = age_strata.len(),
        bcg = age_params.bcg_coverage.is_some(),
        "Built age stratification"
    );
    Ok(strat)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{contact_matrix, AGE_STRATA, COMPARTMENTS};
    use crate::params::tests::fixed_params;
    use approx::assert_abs_diff_eq;
    use tbdyn_core::functions::{bcg_multiplier, latency_with_diabetes, treatment_outcomes};
    use tbdyn_core::EvaluationContext;

    fn age_strat() -> Stratification {
        get_age_strat(&COMPARTMENTS, &AGE_STRATA, &fixed_params(), &contact_matrix()).unwrap()
    }

    fn context(time: f64) -> EvaluationContext {
        let mut context = EvaluationContext::new();
        context.set_parameter("progression_multiplier", 2.0);
        context.set_parameter("rr_progression_diabetes", 3.0);
        context.set_parameter("treatment_duration", 0.5);
        context.set_parameter("prop_death_among_negative_tx_outcome", 0.2);
        context.set_parameter("treatment_success_rate", 0.8);
        context.set_time(time);
        context
    }

    fn evaluate(strat: &Stratification, flow: &str, stratum: &str, time: f64) -> f64 {
        strat
            .adjustment_for(flow, stratum, None)
            .unwrap()
            .value()
            .evaluate(&context(time))
            .unwrap()
    }

    #[test]
    fn test_births_enter_youngest_group() {
        let strat = age_strat();
        assert_eq!(strat.adjustment_for("birth", "0", None), Some(&Adjustment::multiply(1.0)));
        assert_eq!(strat.adjustment_for("birth", "15", None), Some(&Adjustment::multiply(0.0)));
        assert!(strat.is_ageing());
        assert_eq!(strat.ageing_transitions()[0], ("0".to_string(), "5".to_string(), 0.2));
    }

    #[test]
    fn test_latency_by_age() {
        let strat = age_strat();
        assert_abs_diff_eq!(evaluate(&strat, "early_activation", "5", 2000.0), 2.0 * 0.9862, epsilon = 1e-12);
        assert_abs_diff_eq!(evaluate(&strat, "stabilisation", "0", 2000.0), 4.383, epsilon = 1e-12);

        let expected = latency_with_diabetes(2000.0, 0.15, 2.0 * 0.0012053, 3.0);
        assert_abs_diff_eq!(evaluate(&strat, "late_activation", "70", 2000.0), expected, epsilon = 1e-15);
        // diabetes raises progression when the relative risk exceeds one
        assert!(expected > 2.0 * 0.0012053);
    }

    #[test]
    fn test_bcg_protection_wanes_with_age() {
        let strat = age_strat();
        let young = evaluate(&strat, "infection_from_susceptible", "0", 2010.0);
        let older = evaluate(&strat, "infection_from_susceptible", "35", 2010.0);
        assert!(young < older && older < 1.0);
        assert_eq!(evaluate(&strat, "infection_from_susceptible", "70", 2010.0), 1.0);

        let expected = bcg_multiplier(90.0, average_sigmoid(0.0, 2.5, 20.0));
        assert_abs_diff_eq!(young, expected, epsilon = 1e-9);
    }

    #[test]
    fn test_mortality_and_treatment_outcomes_by_age() {
        let strat = age_strat();
        assert_eq!(evaluate(&strat, "universal_death", "50", 2000.0), 0.01);

        let outcomes = treatment_outcomes(0.5, 0.2, 0.06, 0.8).unwrap();
        assert_abs_diff_eq!(evaluate(&strat, "treatment_recovery", "70", 2000.0), outcomes.success, epsilon = 1e-12);
        assert_abs_diff_eq!(evaluate(&strat, "treatment_death", "70", 2000.0), outcomes.death, epsilon = 1e-12);
        assert_abs_diff_eq!(evaluate(&strat, "relapse", "70", 2000.0), outcomes.relapse, epsilon = 1e-12);
    }

    #[test]
    fn test_contact_matrix_must_match_strata() {
        let result = get_age_strat(&COMPARTMENTS, &[0, 15, 50], &fixed_params(), &contact_matrix());
        assert!(matches!(result, Err(ModelError::Configuration(_))));
    }
}
