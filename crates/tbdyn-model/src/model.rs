//! Assembly of the full TB model

use nalgebra::DMatrix;
use tbdyn_core::{CompartmentalModel, Expr, Function, Result};
use tracing::info;

use crate::constants::{
    contact_matrix, AGE_STRATA, COMPARTMENTS, INFECTIOUS_COMPARTMENTS, LATENT_COMPARTMENTS, ORGAN_STRATA,
};
use crate::outputs::{request_cdr, request_model_outputs};
use crate::params::FixedParams;
use crate::strats::{get_act3_strat, get_age_strat, get_organ_strat};

/// Exit rate from treatment for one outcome, given the natural death rate
/// of the people treated
pub fn treatment_outcome_rate(function: Function, natural_death_rate: Expr) -> Result<Expr> {
    Ok(Expr::call(
        function,
        vec![
            Expr::parameter("treatment_duration"),
            Expr::parameter("prop_death_among_negative_tx_outcome"),
            natural_death_rate,
            Expr::parameter("treatment_success_rate"),
        ],
    )?)
}

/// Dip in a rate during 2020-2022, deepest in 2021 at `1 - reduction`
pub fn covid_multiplier(reduction_parameter: &str) -> Result<Expr> {
    Ok(Expr::sigmoidal_interpolation(
        vec![2020.0, 2021.0, 2022.0],
        vec![
            Expr::constant(1.0),
            1.0 - Expr::parameter(reduction_parameter),
            Expr::constant(1.0),
        ],
    )?)
}

fn add_infection_flows(model: &mut CompartmentalModel, fixed_params: &FixedParams) -> Result<()> {
    let mut contact_rate = Expr::parameter("contact_rate");
    if fixed_params.covid_effects.contact_reduction {
        contact_rate = contact_rate * covid_multiplier("contact_reduction")?;
    }
    model.add_infection_frequency_flow(
        "infection_from_susceptible",
        contact_rate.clone(),
        "susceptible",
        "early_latent",
    )?;
    model.add_infection_frequency_flow(
        "infection_from_late_latent",
        contact_rate.clone() * Expr::parameter("rr_infection_latent"),
        "late_latent",
        "early_latent",
    )?;
    model.add_infection_frequency_flow(
        "infection_from_recovered",
        contact_rate * Expr::parameter("rr_infection_recovered"),
        "recovered",
        "early_latent",
    )
}

fn add_latency_flows(model: &mut CompartmentalModel) -> Result<()> {
    model.add_transition_flow(
        "stabilisation",
        Expr::parameter("stabilisation_rate"),
        "early_latent",
        "late_latent",
    )?;
    model.add_transition_flow(
        "early_activation",
        Expr::parameter("early_activation_rate"),
        "early_latent",
        "infectious",
    )?;
    model.add_transition_flow(
        "late_activation",
        Expr::parameter("late_activation_rate"),
        "late_latent",
        "infectious",
    )
}

fn add_detection_flows(model: &mut CompartmentalModel, fixed_params: &FixedParams) -> Result<()> {
    let mut detection_rate = 1.0 / Expr::parameter("time_to_screening_end_asymp");
    if fixed_params.covid_effects.detection_reduction {
        detection_rate = detection_rate * covid_multiplier("detection_reduction")?;
    }
    model.add_transition_flow("detection", detection_rate, "infectious", "on_treatment")?;
    if fixed_params.act3_stratification.is_some() {
        // scaled per arm and age group by the ACT3 stratification
        model.add_transition_flow("acf_detection", 1.0, "infectious", "on_treatment")?;
    }
    Ok(())
}

fn add_treatment_flows(model: &mut CompartmentalModel) -> Result<()> {
    let natural_death = || Expr::parameter("crude_death_rate");
    model.add_transition_flow(
        "treatment_recovery",
        treatment_outcome_rate(Function::TreatmentSuccessRate, natural_death())?,
        "on_treatment",
        "recovered",
    )?;
    model.add_death_flow(
        "treatment_death",
        treatment_outcome_rate(Function::TreatmentDeathRate, natural_death())?,
        "on_treatment",
    )?;
    model.add_transition_flow(
        "relapse",
        treatment_outcome_rate(Function::RelapseRate, natural_death())?,
        "on_treatment",
        "infectious",
    )
}

/// Base TB model: births, infection of susceptible, latent and recovered
/// people, latency, natural history of active disease, detection, treatment
/// and deaths
pub fn build_base_model(
    compartments: &[&str],
    infectious_compartments: &[&str],
    fixed_params: &FixedParams,
) -> Result<CompartmentalModel> {
    let mut model = CompartmentalModel::new(compartments, infectious_compartments)?;
    model.add_crude_birth_flow("birth", Expr::parameter("crude_birth_rate"), "susceptible")?;
    add_infection_flows(&mut model, fixed_params)?;
    add_latency_flows(&mut model)?;
    model.add_transition_flow(
        "self_recovery",
        Expr::parameter("self_recovery_rate"),
        "infectious",
        "recovered",
    )?;
    add_detection_flows(&mut model, fixed_params)?;
    add_treatment_flows(&mut model)?;
    model.add_death_flow("infect_death", Expr::parameter("infect_death_rate"), "infectious")?;
    model.add_universal_death_flows("universal_death", Expr::parameter("crude_death_rate"))?;
    Ok(model)
}

/// Full TB model: the base model stratified by age, organ involvement and,
/// when configured, ACT3 trial arm, with every output requested.
pub fn build_model(
    compartments: &[&str],
    latent_compartments: &[&str],
    infectious_compartments: &[&str],
    age_strata: &[u32],
    fixed_params: &FixedParams,
    contact_matrix: &DMatrix<f64>,
) -> Result<CompartmentalModel> {
    let mut model = build_base_model(compartments, infectious_compartments, fixed_params)?;

    model.stratify_with(get_age_strat(compartments, age_strata, fixed_params, contact_matrix)?)?;
    model.stratify_with(get_organ_strat(infectious_compartments, &ORGAN_STRATA, fixed_params)?)?;
    if let Some(act3) = &fixed_params.act3_stratification {
        model.stratify_with(get_act3_strat(compartments, age_strata, act3)?)?;
    }

    request_model_outputs(
        &mut model,
        compartments,
        latent_compartments,
        infectious_compartments,
        age_strata,
        &ORGAN_STRATA,
    )?;
    request_cdr(&mut model, &ORGAN_STRATA, &fixed_params.detection_rate)?;

    info!(
        act3 = fixed_params.act3_stratification.is_some(),
        parameters = model.required_parameters().len(),
        "Built TB model"
    );
    model.log_summary();
    Ok(model)
}

/// [`build_model`] with the standard compartments, age groups and contact matrix
pub fn build_default_model(fixed_params: &FixedParams) -> Result<CompartmentalModel> {
    build_model(
        &COMPARTMENTS,
        &LATENT_COMPARTMENTS,
        &INFECTIOUS_COMPARTMENTS,
        &AGE_STRATA,
        fixed_params,
        &contact_matrix(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::tests::fixed_params;
    use approx::assert_abs_diff_eq;
    use tbdyn_core::{EvaluationContext, FlowKind};

    #[test]
    fn test_covid_multiplier_dips_in_2021() {
        let multiplier = covid_multiplier("contact_reduction").unwrap();
        let mut context = EvaluationContext::new();
        context.set_parameter("contact_reduction", 0.3);
        for (time, expected) in [(2015.0, 1.0), (2021.0, 0.7), (2023.0, 1.0)] {
            context.set_time(time);
            assert_abs_diff_eq!(multiplier.evaluate(&context).unwrap(), expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_structure() {
        let model = build_default_model(&fixed_params()).unwrap();
        // 4 compartments x 6 ages, plus 2 infectious compartments x 6 ages x 3 organs,
        // all split over 3 arms
        assert_eq!(model.stratified_compartments().len(), (4 * 6 + 2 * 6 * 3) * 3);
        assert_eq!(model.stratifications().len(), 3);
        assert!(model.output("adults_prevalence_pulmonary").is_some());
        assert!(model.output("cdr_extrapulmonary").is_some());

        let flows = model.stratified_flows();
        let births: Vec<_> = flows.iter().filter(|f| f.kind == FlowKind::Entry).collect();
        assert_eq!(births.len(), 6 * 3);
        assert!(flows.iter().any(|f| f.name == "ageing_50_to_70"));
    }

    #[test]
    fn test_every_parameter_has_a_default() {
        let params = fixed_params();
        let model = build_default_model(&params).unwrap();
        let missing: Vec<String> = model
            .required_parameters()
            .into_iter()
            .filter(|p| !params.parameters.contains_key(p))
            .collect();
        assert!(missing.is_empty(), "missing defaults: {:?}", missing);
    }

    #[test]
    fn test_acf_flow_only_with_act3() {
        let mut params = fixed_params();
        params.act3_stratification = None;
        let model = build_default_model(&params).unwrap();
        assert!(!model.has_flow("acf_detection"));
        assert_eq!(model.stratifications().len(), 2);
    }
}
