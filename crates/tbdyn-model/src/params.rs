//! Fixed (non-calibrated) parameters of the TB model

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tbdyn_core::{RateExpression, TimeSeries};

use crate::error::Result;

/// Everything the builders need besides the calibrated parameters.
///
/// Parsed from JSON; sections missing from the document take their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FixedParams {
    /// Default values of model parameters, overridden by calibration draws
    #[serde(default)]
    pub parameters: BTreeMap<String, f64>,
    pub incidence_props_pulmonary: f64,
    pub incidence_props_smear_positive_among_pulmonary: f64,
    /// Relative infectiousness per organ stratum; 1 when absent
    #[serde(default)]
    pub infect_multiplier: BTreeMap<String, f64>,
    pub passive_screening_sensitivity: BTreeMap<String, f64>,
    /// Passive detection rate series used for the case detection ratio
    pub detection_rate: TimeSeries,
    #[serde(default)]
    pub age: AgeParams,
    #[serde(default)]
    pub act3_stratification: Option<Act3Params>,
    #[serde(default)]
    pub covid_effects: CovidEffects,
}

impl FixedParams {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn infect_multiplier(&self, stratum: &str) -> f64 {
        self.infect_multiplier.get(stratum).copied().unwrap_or(1.0)
    }
}

/// Age-specific natural history.
///
/// Maps keyed by age hold the value from that age up to the next key.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AgeParams {
    /// Initial population share per age stratum; even when absent
    pub population_split: Option<BTreeMap<String, f64>>,
    pub stabilisation: BTreeMap<u32, f64>,
    pub early_activation: BTreeMap<u32, f64>,
    pub late_activation: BTreeMap<u32, f64>,
    /// Natural death rate; `crude_death_rate` is used when no key applies
    pub death_rates: BTreeMap<u32, f64>,
    pub prop_diabetes: BTreeMap<u32, f64>,
    /// Percentage of each birth cohort vaccinated; no BCG effect when absent
    pub bcg_coverage: Option<TimeSeries>,
    /// Age at which half of the BCG protection has waned
    pub bcg_effect_inflection: f64,
}

impl Default for AgeParams {
    fn default() -> Self {
        Self {
            population_split: None,
            stabilisation: BTreeMap::from([(0, 4.383), (5, 4.383), (15, 1.9724)]),
            early_activation: BTreeMap::from([(0, 2.4107), (5, 0.9862), (15, 0.0986)]),
            late_activation: BTreeMap::from([(0, 6.94e-9), (5, 0.0023376), (15, 0.0012053)]),
            death_rates: BTreeMap::new(),
            prop_diabetes: BTreeMap::new(),
            bcg_coverage: None,
            bcg_effect_inflection: 20.0,
        }
    }
}

/// Value of an age-keyed map for an age group: the entry with the largest
/// key not above `age`
pub fn value_for_age(values: &BTreeMap<u32, f64>, age: u32) -> Option<f64> {
    values.range(..=age).next_back().map(|(_, value)| *value)
}

/// Intervention arms of the ACT3 trial
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Act3Params {
    pub strata: Vec<String>,
    pub proportions: BTreeMap<String, f64>,
    pub prop_mixing_same_stratum: f64,
    /// Flow name to per-arm multiplier; numbers or formulas
    #[serde(default)]
    pub adjustments: BTreeMap<String, BTreeMap<String, RateExpression>>,
    /// Active case finding intensity over time per arm, scaled by
    /// `acf_sensitivity`
    #[serde(default = "default_acf_schedules")]
    pub acf_schedules: BTreeMap<String, TimeSeries>,
    /// Age groups starting below this age are not screened
    #[serde(default = "default_acf_minimum_age")]
    pub acf_minimum_age: u32,
}

fn default_acf_minimum_age() -> u32 {
    15
}

fn default_acf_schedules() -> BTreeMap<String, TimeSeries> {
    let trial = TimeSeries::new(vec![2014.0, 2015.0, 2018.0, 2018.1], vec![0.0, 1.9, 1.9, 0.0]);
    let control = TimeSeries::new(vec![2017.0, 2018.0, 2018.1], vec![0.0, 1.9, 0.0]);
    [("trial", trial), ("control", control)]
        .into_iter()
        .filter_map(|(arm, schedule)| schedule.ok().map(|s| (arm.to_string(), s)))
        .collect()
}

/// Disruption of transmission and detection around 2020-2022
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CovidEffects {
    /// Scale infection by `1 - contact_reduction` at the 2021 trough
    pub contact_reduction: bool,
    /// Scale detection by `1 - detection_reduction` at the 2021 trough
    pub detection_reduction: bool,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::error::TbError;

    pub(crate) const FIXED_PARAMS: &str = r#"{
        "parameters": {
            "crude_birth_rate": 0.02,
            "crude_death_rate": 0.008,
            "contact_rate": 0.01,
            "rr_infection_latent": 0.3,
            "rr_infection_recovered": 0.5,
            "progression_multiplier": 1.0,
            "rr_progression_diabetes": 3.0,
            "smear_positive_death_rate": 0.389,
            "smear_negative_death_rate": 0.025,
            "smear_positive_self_recovery": 0.231,
            "smear_negative_self_recovery": 0.13,
            "screening_scaleup_shape": 0.2,
            "screening_inflection_time": 2000.0,
            "screening_start_asymp": 0.0,
            "screening_end_asymp": 1.0,
            "time_to_screening_end_asymp": 1.0,
            "treatment_duration": 0.5,
            "prop_death_among_negative_tx_outcome": 0.2,
            "treatment_success_rate": 0.8,
            "acf_sensitivity": 0.8,
            "contact_rate_multiplier": 1.2,
            "contact_reduction": 0.3,
            "detection_reduction": 0.2
        },
        "incidence_props_pulmonary": 0.85,
        "incidence_props_smear_positive_among_pulmonary": 0.5,
        "infect_multiplier": {"smear_negative": 0.25, "extrapulmonary": 0.0},
        "passive_screening_sensitivity": {
            "smear_positive": 1.0,
            "smear_negative": 0.7,
            "extrapulmonary": 0.7
        },
        "detection_rate": {"times": [1990.0, 2000.0, 2020.0], "values": [0.1, 0.5, 1.2]},
        "age": {
            "death_rates": {"0": 0.02, "5": 0.001, "15": 0.002, "35": 0.004, "50": 0.01, "70": 0.06},
            "prop_diabetes": {"15": 0.05, "50": 0.15},
            "bcg_coverage": {"times": [1980.0, 2000.0], "values": [20.0, 90.0]}
        },
        "act3_stratification": {
            "strata": ["trial", "control", "other"],
            "proportions": {"trial": 0.1, "control": 0.1, "other": 0.8},
            "prop_mixing_same_stratum": 0.5,
            "adjustments": {
                "infection": {"trial": "contact_rate_multiplier", "control": 1.0, "other": 1.0},
                "detection": {"trial": 1.0, "control": 1.0, "other": 1.0}
            }
        },
        "covid_effects": {"contact_reduction": true, "detection_reduction": true}
    }"#;

    pub(crate) fn fixed_params() -> FixedParams {
        FixedParams::from_json(FIXED_PARAMS).unwrap()
    }

    #[test]
    fn test_sections_and_defaults() {
        let params = fixed_params();
        assert_eq!(params.infect_multiplier("smear_positive"), 1.0);
        assert_eq!(params.infect_multiplier("smear_negative"), 0.25);
        assert_eq!(params.age.early_activation[&5], 0.9862);
        assert_eq!(params.age.bcg_effect_inflection, 20.0);

        let act3 = params.act3_stratification.unwrap();
        assert_eq!(act3.acf_minimum_age, 15);
        assert_eq!(act3.acf_schedules["trial"].times(), &[2014.0, 2015.0, 2018.0, 2018.1]);
        assert_eq!(act3.acf_schedules["control"].values(), &[0.0, 1.9, 0.0]);
        assert!(params.covid_effects.contact_reduction);
    }

    #[test]
    fn test_value_for_age_uses_bracket_below() {
        let values = BTreeMap::from([(0, 2.0), (5, 1.0), (15, 0.5)]);
        assert_eq!(value_for_age(&values, 0), Some(2.0));
        assert_eq!(value_for_age(&values, 10), Some(1.0));
        assert_eq!(value_for_age(&values, 70), Some(0.5));
        assert_eq!(value_for_age(&BTreeMap::from([(15, 0.1)]), 5), None);
    }

    #[test]
    fn test_rejects_malformed_series() {
        let json = FIXED_PARAMS.replace(
            r#""detection_rate": {"times": [1990.0, 2000.0, 2020.0]"#,
            r#""detection_rate": {"times": [2000.0, 1990.0, 2020.0]"#,
        );
        assert!(matches!(FixedParams::from_json(&json), Err(TbError::Params(_))));
    }
}
