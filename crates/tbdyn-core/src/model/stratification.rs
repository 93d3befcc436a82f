use std::collections::{BTreeMap, BTreeSet};

use nalgebra::DMatrix;

use super::adjustment::{Adjustment, FlowAdjustments};
use super::compartment::{CompartmentId, StrataFilter};
use super::mixing::{validate_mixing_matrix, validate_population_split};
use crate::error::{ModelError, Result};

/// Partition of a set of compartments into mutually exclusive strata.
///
/// Built by a stratification builder, then attached to a model with
/// [`CompartmentalModel::stratify_with`](super::CompartmentalModel::stratify_with).
#[derive(Clone, Debug)]
pub struct Stratification {
    name: String,
    strata: Vec<String>,
    compartments: Vec<String>,
    population_split: BTreeMap<String, f64>,
    mixing_matrix: Option<DMatrix<f64>>,
    flow_adjustments: Vec<FlowAdjustments>,
    infectiousness_adjustments: BTreeMap<String, BTreeMap<String, Adjustment>>,
    ageing: Option<Vec<(String, String, f64)>>,
}

impl Stratification {
    /// Create a stratification with an even population split.
    ///
    /// Fails if the strata list is empty or holds duplicates, or if no
    /// compartments are given.
    pub fn new(
        name: impl Into<String>,
        strata: &[impl AsRef<str>],
        compartments: &[impl AsRef<str>],
    ) -> Result<Self> {
        let name = name.into();
        let strata: Vec<String> = strata.iter().map(|s| s.as_ref().to_string()).collect();
        let compartments: Vec<String> = compartments.iter().map(|c| c.as_ref().to_string()).collect();

        if strata.is_empty() {
            return Err(ModelError::configuration(format!(
                "stratification '{}' has no strata",
                name
            )));
        }
        let mut seen = BTreeSet::new();
        if let Some(duplicate) = strata.iter().find(|stratum| !seen.insert(stratum.as_str())) {
            return Err(ModelError::configuration(format!(
                "stratification '{}' declares stratum '{}' twice",
                name, duplicate
            )));
        }
        if compartments.is_empty() {
            return Err(ModelError::configuration(format!(
                "stratification '{}' covers no compartments",
                name
            )));
        }

        let even = 1.0 / strata.len() as f64;
        let population_split = strata.iter().map(|stratum| (stratum.clone(), even)).collect();

        Ok(Self {
            name,
            strata,
            compartments,
            population_split,
            mixing_matrix: None,
            flow_adjustments: Vec::new(),
            infectiousness_adjustments: BTreeMap::new(),
            ageing: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn strata(&self) -> &[String] {
        &self.strata
    }

    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    pub fn population_split(&self) -> &BTreeMap<String, f64> {
        &self.population_split
    }

    pub fn mixing_matrix(&self) -> Option<&DMatrix<f64>> {
        self.mixing_matrix.as_ref()
    }

    pub fn flow_adjustments(&self) -> &[FlowAdjustments] {
        &self.flow_adjustments
    }

    pub fn infectiousness_adjustments(&self) -> &BTreeMap<String, BTreeMap<String, Adjustment>> {
        &self.infectiousness_adjustments
    }

    pub fn has_stratum(&self, stratum: &str) -> bool {
        self.strata.iter().any(|s| s == stratum)
    }

    pub fn stratifies(&self, compartment: &str) -> bool {
        self.compartments.iter().any(|c| c == compartment)
    }

    pub fn is_ageing(&self) -> bool {
        self.ageing.is_some()
    }

    /// Treat the strata as age breakpoints and move people from each age
    /// group to the next at rate `1 / width`.
    ///
    /// Every stratum name must parse as a number, in increasing order.
    pub fn enable_ageing(&mut self) -> Result<()> {
        let breakpoints = self.breakpoints()?;
        let transitions = self
            .strata
            .windows(2)
            .zip(breakpoints.windows(2))
            .map(|(names, ages)| (names[0].clone(), names[1].clone(), 1.0 / (ages[1] - ages[0])))
            .collect();
        self.ageing = Some(transitions);
        Ok(())
    }

    /// `(from, to, rate)` for each ageing transition between adjacent strata
    pub fn ageing_transitions(&self) -> &[(String, String, f64)] {
        self.ageing.as_deref().unwrap_or_default()
    }

    fn breakpoints(&self) -> Result<Vec<f64>> {
        let breakpoints = self
            .strata
            .iter()
            .map(|stratum| {
                stratum.parse::<f64>().map_err(|_| {
                    ModelError::configuration(format!(
                        "age stratum '{}' of '{}' is not a number",
                        stratum, self.name
                    ))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        if breakpoints.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(ModelError::configuration(format!(
                "age strata of '{}' must be increasing",
                self.name
            )));
        }
        Ok(breakpoints)
    }

    /// Set the proportion of the population entering each stratum
    pub fn set_population_split(&mut self, split: BTreeMap<String, f64>) -> Result<()> {
        validate_population_split(&self.strata, &split)?;
        self.population_split = split;
        Ok(())
    }

    /// Set the inter-stratum mixing matrix, rows and columns in strata order
    pub fn set_mixing_matrix(&mut self, matrix: DMatrix<f64>) -> Result<()> {
        validate_mixing_matrix(self.strata.len(), &matrix)?;
        self.mixing_matrix = Some(matrix);
        Ok(())
    }

    /// Adjust a flow in every matching stratum
    pub fn set_flow_adjustments(
        &mut self,
        flow_name: impl Into<String>,
        adjustments: BTreeMap<String, Adjustment>,
    ) -> Result<()> {
        self.set_flow_adjustments_for_source(flow_name, adjustments, StrataFilter::new())
    }

    /// Adjust a flow only where its source lies in the given strata of
    /// previously applied stratifications.
    ///
    /// The referenced stratifications are checked when the stratification is
    /// attached to a model.
    pub fn set_flow_adjustments_for_source(
        &mut self,
        flow_name: impl Into<String>,
        adjustments: BTreeMap<String, Adjustment>,
        source_strata: StrataFilter,
    ) -> Result<()> {
        self.check_strata_keys(adjustments.keys())?;
        if source_strata.contains_key(&self.name) {
            return Err(ModelError::configuration(format!(
                "stratification '{}' cannot scope its own adjustments by itself",
                self.name
            )));
        }
        self.flow_adjustments.push(FlowAdjustments {
            flow_name: flow_name.into(),
            adjustments,
            source_strata,
        });
        Ok(())
    }

    /// Adjust the infectiousness of a compartment per stratum
    pub fn add_infectiousness_adjustments(
        &mut self,
        compartment: impl Into<String>,
        adjustments: BTreeMap<String, Adjustment>,
    ) -> Result<()> {
        let compartment = compartment.into();
        if !self.stratifies(&compartment) {
            return Err(ModelError::configuration(format!(
                "stratification '{}' does not cover compartment '{}'",
                self.name, compartment
            )));
        }
        self.check_strata_keys(adjustments.keys())?;
        self.infectiousness_adjustments.insert(compartment, adjustments);
        Ok(())
    }

    /// Adjustment for a flow entering `stratum`.
    ///
    /// Among the adjustment sets declared for the flow whose source filter
    /// matches `source`, the most specific wins; ties go to the most recently
    /// declared. `source` is the endpoint compartment as it was before this
    /// stratification was applied.
    pub fn adjustment_for(
        &self,
        flow_name: &str,
        stratum: &str,
        source: Option<&CompartmentId>,
    ) -> Option<&Adjustment> {
        let mut best: Option<(&FlowAdjustments, usize)> = None;
        for candidate in self.flow_adjustments.iter().filter(|fa| fa.flow_name == flow_name) {
            let specificity = match source {
                Some(comp) => comp.match_specificity(&candidate.source_strata),
                None => candidate.source_strata.is_empty().then_some(0),
            };
            if let Some(specificity) = specificity {
                if best.map_or(true, |(_, current)| specificity >= current) {
                    best = Some((candidate, specificity));
                }
            }
        }
        best.and_then(|(fa, _)| fa.adjustments.get(stratum))
    }

    /// Infectiousness adjustment of a base compartment in a stratum
    pub fn infectiousness_adjustment(&self, compartment: &str, stratum: &str) -> Option<&Adjustment> {
        self.infectiousness_adjustments
            .get(compartment)
            .and_then(|adjustments| adjustments.get(stratum))
    }

    fn check_strata_keys<'a>(&self, keys: impl Iterator<Item = &'a String>) -> Result<()> {
        for key in keys {
            if !self.has_stratum(key) {
                return Err(ModelError::UnknownStratum {
                    stratification: self.name.clone(),
                    stratum: key.clone(),
                });
            }
        }
        Ok(())
    }
}
