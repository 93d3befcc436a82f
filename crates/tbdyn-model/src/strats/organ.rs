use std::collections::BTreeMap;

use tbdyn_core::{Adjustment, Expr, ModelError, Result, Stratification};
use tracing::debug;

use crate::constants::ACTIVATION_FLOWS;
use crate::params::FixedParams;

/// Parameter prefix for an organ stratum's natural history; extrapulmonary
/// disease behaves like smear-negative disease
pub fn natural_history_prefix(stratum: &str) -> &str {
    if stratum == "extrapulmonary" {
        "smear_negative"
    } else {
        stratum
    }
}

/// Share of new active disease in each organ stratum.
///
/// `pulmonary` is the proportion of incident disease that is pulmonary and
/// `smear_positive` the proportion of pulmonary disease that is smear
/// positive; both must lie in `[0, 1]`.
pub fn organ_splitting_proportions(pulmonary: f64, smear_positive: f64) -> Result<BTreeMap<String, f64>> {
    for (name, value) in [
        ("incidence_props_pulmonary", pulmonary),
        ("incidence_props_smear_positive_among_pulmonary", smear_positive),
    ] {
        if !(0.0..=1.0).contains(&value) {
            return Err(ModelError::configuration(format!(
                "{} must be in [0, 1], got {}",
                name, value
            )));
        }
    }
    Ok(BTreeMap::from([
        ("smear_positive".to_string(), pulmonary * smear_positive),
        ("smear_negative".to_string(), pulmonary * (1.0 - smear_positive)),
        ("extrapulmonary".to_string(), 1.0 - pulmonary),
    ]))
}

/// Organ involvement of active disease.
///
/// Sets relative infectiousness, organ-specific death and self-recovery,
/// passive detection scaled up over time, and the split of activation
/// between organ strata.
pub fn get_organ_strat(
    infectious_compartments: &[impl AsRef<str>],
    organ_strata: &[impl AsRef<str>],
    fixed_params: &FixedParams,
) -> Result<Stratification> {
    let mut strat = Stratification::new("organ", organ_strata, infectious_compartments)?;
    let strata = strat.strata().to_vec();

    let infectiousness: BTreeMap<String, Adjustment> = strata
        .iter()
        .map(|stratum| {
            (
                stratum.clone(),
                Adjustment::multiply(fixed_params.infect_multiplier(stratum)),
            )
        })
        .collect();
    for compartment in infectious_compartments {
        strat.add_infectiousness_adjustments(compartment.as_ref(), infectiousness.clone())?;
    }

    let overwrite_with = |suffix: &str| -> BTreeMap<String, Adjustment> {
        strata
            .iter()
            .map(|stratum| {
                let name = format!("{}_{}", natural_history_prefix(stratum), suffix);
                (stratum.clone(), Adjustment::overwrite(Expr::parameter(name)))
            })
            .collect()
    };
    strat.set_flow_adjustments("infect_death", overwrite_with("death_rate"))?;
    strat.set_flow_adjustments("self_recovery", overwrite_with("self_recovery"))?;

    let screening = Expr::tanh_scaleup(
        Expr::parameter("screening_scaleup_shape"),
        Expr::parameter("screening_inflection_time"),
        Expr::parameter("screening_start_asymp"),
        Expr::parameter("screening_end_asymp"),
    );
    let mut detection = BTreeMap::new();
    for stratum in &strata {
        let sensitivity = fixed_params
            .passive_screening_sensitivity
            .get(stratum)
            .copied()
            .ok_or_else(|| {
                ModelError::configuration(format!(
                    "no passive screening sensitivity for organ stratum '{}'",
                    stratum
                ))
            })?;
        detection.insert(stratum.clone(), Adjustment::multiply(screening.clone() * sensitivity));
    }
    strat.set_flow_adjustments("detection", detection)?;

    let splitting = organ_splitting_proportions(
        fixed_params.incidence_props_pulmonary,
        fixed_params.incidence_props_smear_positive_among_pulmonary,
    )?;
    for flow_name in ACTIVATION_FLOWS {
        let adjustments = splitting
            .iter()
            .map(|(stratum, prop)| (stratum.clone(), Adjustment::multiply(*prop)))
            .collect();
        strat.set_flow_adjustments(flow_name, adjustments)?;
    }

    debug!(strata = strata.len(), "Built organ stratification");
    Ok(strat)
}
