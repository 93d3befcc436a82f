//! Derived outputs reported by the TB model

use tbdyn_core::{strata_filter, CompartmentalModel, Expr, Function, Result, StrataFilter, TimeSeries};
use tracing::debug;

use crate::strats::organ::natural_history_prefix;

/// Age groups starting at or above this age are adults
const ADULT_MINIMUM_AGE: u32 = 15;

const PULMONARY_STRATA: [&str; 2] = ["smear_positive", "smear_negative"];

/// Request the standard set of outputs: population sizes, latency,
/// prevalence, incidence, notifications and their breakdowns by
/// compartment, age and organ.
///
/// Pulmonary prevalence outputs are only requested when the organ strata
/// include both smear-positive and smear-negative disease.
pub fn request_model_outputs(
    model: &mut CompartmentalModel,
    compartments: &[&str],
    latent_compartments: &[&str],
    infectious_compartments: &[&str],
    age_strata: &[u32],
    organ_strata: &[&str],
) -> Result<()> {
    let all = StrataFilter::new;
    let total_pop = model.request_output_for_compartments("total_population", compartments, all(), true)?;

    let latent_pop = model.request_output_for_compartments(
        "latent_population_size",
        latent_compartments,
        all(),
        true,
    )?;
    model.request_function_output("percentage_latent", 100.0 * latent_pop / total_pop.clone(), true)?;

    let infectious_pop = model.request_output_for_compartments(
        "infectious_population_size",
        infectious_compartments,
        all(),
        true,
    )?;
    model.request_function_output(
        "prevalence_infectious",
        1e5 * infectious_pop.clone() / total_pop.clone(),
        true,
    )?;

    model.request_output_for_flow("incidence_early_raw", "early_activation", all(), all(), false)?;
    model.request_output_for_flow("incidence_late_raw", "late_activation", all(), all(), false)?;
    let incidence_raw = model.request_aggregate_output(
        "incidence_raw",
        &["incidence_early_raw", "incidence_late_raw"],
        false,
    )?;
    model.request_function_output("incidence", 1e5 * incidence_raw / total_pop.clone(), true)?;

    model.request_output_for_flow("notification", "detection", all(), all(), true)?;

    for compartment in compartments {
        let size = model.request_output_for_compartments(
            format!("number_{}", compartment),
            &[compartment],
            all(),
            true,
        )?;
        model.request_function_output(format!("prop_{}", compartment), size / total_pop.clone(), true)?;
    }

    for age in age_strata {
        let age = age.to_string();
        model.request_output_for_compartments(
            format!("total_populationXage_{}", age),
            compartments,
            strata_filter(&[("age", age.as_str())]),
            true,
        )?;
    }

    for organ in organ_strata {
        let organ_size = model.request_output_for_compartments(
            format!("total_populationXorgan_{}", organ),
            compartments,
            strata_filter(&[("organ", *organ)]),
            true,
        )?;
        // zero while nobody has active disease
        model.request_function_output(
            format!("prop_{}", organ),
            Expr::call(Function::Proportion, vec![organ_size, infectious_pop.clone()])?,
            true,
        )?;
    }

    if PULMONARY_STRATA.iter().all(|s| organ_strata.contains(s)) {
        request_pulmonary_prevalence(model, compartments, age_strata, total_pop)?;
    }

    debug!(outputs = model.outputs().len(), "Requested model outputs");
    Ok(())
}

/// Pulmonary and smear-positive prevalence per 100,000, overall and among adults
fn request_pulmonary_prevalence(
    model: &mut CompartmentalModel,
    compartments: &[&str],
    age_strata: &[u32],
    total_pop: Expr,
) -> Result<()> {
    let pulmonary_sizes: Vec<String> = PULMONARY_STRATA
        .iter()
        .map(|organ| format!("total_populationXorgan_{}", organ))
        .collect();
    let pulmonary_pop = model.request_aggregate_output("pulmonary_population_size", &pulmonary_sizes, false)?;
    model.request_function_output("prevalence_pulmonary", 1e5 * pulmonary_pop / total_pop.clone(), true)?;
    model.request_function_output(
        "prevalence_smear_positive",
        1e5 * Expr::output("total_populationXorgan_smear_positive") / total_pop,
        true,
    )?;

    let adult_ages: Vec<String> = age_strata
        .iter()
        .filter(|age| **age >= ADULT_MINIMUM_AGE)
        .map(u32::to_string)
        .collect();
    let mut adult_pulmonary = Vec::new();
    for age in &adult_ages {
        for organ in PULMONARY_STRATA {
            let name = format!("total_populationXorgan_{}Xage_{}", organ, age);
            model.request_output_for_compartments(
                name.clone(),
                compartments,
                strata_filter(&[("organ", organ), ("age", age.as_str())]),
                false,
            )?;
            adult_pulmonary.push(name);
        }
    }
    let adult_sizes: Vec<String> = adult_ages
        .iter()
        .map(|age| format!("total_populationXage_{}", age))
        .collect();
    let adults_pulmonary = model.request_aggregate_output("adults_pulmonary", &adult_pulmonary, false)?;
    let adults_pop = model.request_aggregate_output("adults_population", &adult_sizes, false)?;
    model.request_function_output(
        "adults_prevalence_pulmonary",
        1e5 * adults_pulmonary / adults_pop,
        true,
    )?;
    Ok(())
}

/// Case detection ratio per organ stratum from the passive detection rate
/// series and the organ's untreated death and self-recovery rates
pub fn request_cdr(model: &mut CompartmentalModel, organ_strata: &[&str], detection_rate: &TimeSeries) -> Result<()> {
    let detection = Expr::sigmoidal_interpolation(
        detection_rate.times().to_vec(),
        detection_rate.values().iter().copied().map(Expr::constant).collect(),
    )?;
    for organ in organ_strata {
        let prefix = natural_history_prefix(organ);
        let cdr = Expr::call(
            Function::CaseDetectionRatio,
            vec![
                detection.clone(),
                Expr::parameter(format!("{}_death_rate", prefix)),
                Expr::parameter(format!("{}_self_recovery", prefix)),
            ],
        )?;
        let name = format!("cdr_{}", organ);
        model.add_computed_value_func(name.as_str(), cdr)?;
        model.request_computed_value_output(&name)?;
    }
    Ok(())
}
