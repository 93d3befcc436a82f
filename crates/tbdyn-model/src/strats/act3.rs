use std::collections::BTreeMap;

use tbdyn_core::{
    proportional_mixing_matrix, strata_filter, Adjustment, Expr, ModelError, Result, Stratification,
};
use tracing::debug;

use crate::constants::INFECTION_FLOWS;
use crate::params::Act3Params;

/// Flow adjustments requested in configuration, with the population
/// proportions applied to `birth` and a generic `infection` entry filling in
/// every infection flow not configured explicitly.
fn configured_adjustments(params: &Act3Params) -> Result<BTreeMap<String, BTreeMap<String, Adjustment>>> {
    let mut adjustments = BTreeMap::new();
    for (flow_name, per_stratum) in &params.adjustments {
        let mut adjs = BTreeMap::new();
        for (stratum, value) in per_stratum {
            adjs.insert(stratum.clone(), Adjustment::multiply(value.to_expr()?));
        }
        adjustments.insert(flow_name.clone(), adjs);
    }

    if let Some(infection) = adjustments.remove("infection") {
        for flow_name in INFECTION_FLOWS {
            adjustments
                .entry(flow_name.to_string())
                .or_insert_with(|| infection.clone());
        }
    }

    let birth = params
        .proportions
        .iter()
        .map(|(stratum, prop)| (stratum.clone(), Adjustment::multiply(*prop)))
        .collect();
    adjustments.insert("birth".to_string(), birth);
    Ok(adjustments)
}

/// Active case finding multiplier per arm for one age group.
///
/// Age groups below the minimum screening age get zero in every arm, as do
/// arms without a schedule.
fn acf_adjustments(params: &Act3Params, age: u32) -> Result<BTreeMap<String, Adjustment>> {
    let mut adjustments: BTreeMap<String, Adjustment> = params
        .strata
        .iter()
        .map(|stratum| (stratum.clone(), Adjustment::multiply(0.0)))
        .collect();
    if age < params.acf_minimum_age {
        return Ok(adjustments);
    }
    for (arm, schedule) in &params.acf_schedules {
        let intensity = Expr::linear_interpolation(
            schedule.times().to_vec(),
            schedule.values().iter().copied().map(Expr::constant).collect(),
        )?;
        adjustments.insert(
            arm.clone(),
            Adjustment::multiply(Expr::parameter("acf_sensitivity") * intensity),
        );
    }
    Ok(adjustments)
}

/// Trial arms of the ACT3 active case finding intervention.
///
/// Arms mix preferentially within themselves, carry the configured flow
/// multipliers and receive active case finding per age group. Must be
/// applied after the age stratification.
pub fn get_act3_strat(
    compartments: &[impl AsRef<str>],
    age_strata: &[u32],
    params: &Act3Params,
) -> Result<Stratification> {
    let mut strat = Stratification::new("act3", &params.strata, compartments)?;
    strat.set_population_split(params.proportions.clone())?;
    strat.set_mixing_matrix(proportional_mixing_matrix(
        strat.strata(),
        &params.proportions,
        params.prop_mixing_same_stratum,
    )?)?;

    if let Some(unknown) = params.acf_schedules.keys().find(|arm| !strat.has_stratum(arm)) {
        return Err(ModelError::UnknownStratum {
            stratification: "act3".to_string(),
            stratum: unknown.clone(),
        });
    }

    let adjustments = configured_adjustments(params)?;
    let n_adjusted = adjustments.len();
    for (flow_name, adjs) in adjustments {
        strat.set_flow_adjustments(flow_name, adjs)?;
    }

    for age in age_strata {
        let age_name = age.to_string();
        strat.set_flow_adjustments_for_source(
            "acf_detection",
            acf_adjustments(params, *age)?,
            strata_filter(&[("age", age_name.as_str())]),
        )?;
    }

    debug!(
        strata = strat.strata().len(),
        adjusted_flows = n_adjusted,
        acf_minimum_age = params.acf_minimum_age,
        "Built ACT3 stratification"
    );
    Ok(strat)
}
