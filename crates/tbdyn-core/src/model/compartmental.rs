use std::collections::BTreeSet;

use tracing::{debug, info};

use super::adjustment::Adjustment;
use super::compartment::{CompartmentId, StrataFilter};
use super::flow::{Flow, FlowKind, StratifiedFlow};
use super::outputs::OutputRequest;
use super::stratification::Stratification;
use crate::error::{ModelError, Result};
use crate::expression::Expr;

/// A compartmental model under assembly.
///
/// Compartments and flows are declared first, stratifications are then
/// attached in order, and derived outputs are requested last. The model never
/// holds parameter values: every rate is an [`Expr`] evaluated by the engine.
#[derive(Clone, Debug)]
pub struct CompartmentalModel {
    pub(super) compartments: Vec<String>,
    pub(super) infectious_compartments: Vec<String>,
    pub(super) flows: Vec<Flow>,
    pub(super) stratifications: Vec<Stratification>,
    pub(super) outputs: Vec<OutputRequest>,
    pub(super) computed_values: Vec<(String, Expr)>,
}

impl CompartmentalModel {
    /// Create a model from its base compartments.
    ///
    /// Fails on duplicate compartment names or infectious compartments that
    /// are not declared.
    pub fn new(compartments: &[impl AsRef<str>], infectious_compartments: &[impl AsRef<str>]) -> Result<Self> {
        let mut names = Vec::with_capacity(compartments.len());
        for compartment in compartments {
            let name = compartment.as_ref().to_string();
            if names.contains(&name) {
                return Err(ModelError::DuplicateName(name));
            }
            names.push(name);
        }

        let mut infectious = Vec::with_capacity(infectious_compartments.len());
        for compartment in infectious_compartments {
            let name = compartment.as_ref();
            if !names.iter().any(|n| n == name) {
                return Err(ModelError::UnknownCompartment(name.to_string()));
            }
            infectious.push(name.to_string());
        }

        Ok(Self {
            compartments: names,
            infectious_compartments: infectious,
            flows: Vec::new(),
            stratifications: Vec::new(),
            outputs: Vec::new(),
            computed_values: Vec::new(),
        })
    }

    pub fn compartments(&self) -> &[String] {
        &self.compartments
    }

    pub fn infectious_compartments(&self) -> &[String] {
        &self.infectious_compartments
    }

    pub fn flows(&self) -> &[Flow] {
        &self.flows
    }

    pub fn stratifications(&self) -> &[Stratification] {
        &self.stratifications
    }

    pub fn stratification(&self, name: &str) -> Option<&Stratification> {
        self.stratifications.iter().find(|s| s.name() == name)
    }

    pub fn has_compartment(&self, name: &str) -> bool {
        self.compartments.iter().any(|c| c == name)
    }

    pub fn has_flow(&self, name: &str) -> bool {
        self.flows.iter().any(|f| f.name == name)
    }

    /// Per-capita flow from `source` to `dest`
    pub fn add_transition_flow(
        &mut self,
        name: impl Into<String>,
        rate: impl Into<Expr>,
        source: &str,
        dest: &str,
    ) -> Result<()> {
        self.add_flow(name.into(), FlowKind::Transition, rate.into(), Some(source), Some(dest))
    }

    /// Frequency-dependent infection from `source` to `dest`
    pub fn add_infection_frequency_flow(
        &mut self,
        name: impl Into<String>,
        rate: impl Into<Expr>,
        source: &str,
        dest: &str,
    ) -> Result<()> {
        self.add_flow(name.into(), FlowKind::Infection, rate.into(), Some(source), Some(dest))
    }

    /// Exit from the model out of `source`
    pub fn add_death_flow(&mut self, name: impl Into<String>, rate: impl Into<Expr>, source: &str) -> Result<()> {
        self.add_flow(name.into(), FlowKind::Death, rate.into(), Some(source), None)
    }

    /// One death flow out of every compartment, all sharing the same name
    pub fn add_universal_death_flows(&mut self, name: impl Into<String>, rate: impl Into<Expr>) -> Result<()> {
        let name = name.into();
        let rate = rate.into();
        for compartment in self.compartments.clone() {
            self.add_flow(name.clone(), FlowKind::Death, rate.clone(), Some(&compartment), None)?;
        }
        Ok(())
    }

    /// Entry into `dest` proportional to the total population
    pub fn add_crude_birth_flow(&mut self, name: impl Into<String>, rate: impl Into<Expr>, dest: &str) -> Result<()> {
        self.add_flow(name.into(), FlowKind::Entry, rate.into(), None, Some(dest))
    }

    fn add_flow(
        &mut self,
        name: String,
        kind: FlowKind,
        rate: Expr,
        source: Option<&str>,
        dest: Option<&str>,
    ) -> Result<()> {
        if !self.stratifications.is_empty() {
            return Err(ModelError::configuration(format!(
                "flow '{}' added after stratification",
                name
            )));
        }
        for endpoint in source.iter().chain(dest.iter()) {
            if !self.has_compartment(endpoint) {
                return Err(ModelError::UnknownCompartment(endpoint.to_string()));
            }
        }
        let source = source.map(str::to_string);
        let dest = dest.map(str::to_string);
        if let Some(existing) = self.flows.iter().find(|f| f.name == name) {
            if existing.kind != kind || (existing.source == source && existing.dest == dest) {
                return Err(ModelError::DuplicateName(name));
            }
        }
        self.flows.push(Flow {
            name,
            kind,
            source,
            dest,
            rate,
        });
        Ok(())
    }

    /// Attach a stratification.
    ///
    /// Checks that its name is new, that every compartment and adjusted flow
    /// exists, and that source-scoped adjustments only refer to strata of
    /// stratifications already applied. Must happen before any output request.
    pub fn stratify_with(&mut self, stratification: Stratification) -> Result<()> {
        if !self.outputs.is_empty() || !self.computed_values.is_empty() {
            return Err(ModelError::configuration(format!(
                "stratification '{}' applied after outputs were requested",
                stratification.name()
            )));
        }
        if self.stratification(stratification.name()).is_some() {
            return Err(ModelError::DuplicateName(stratification.name().to_string()));
        }
        for compartment in stratification.compartments() {
            if !self.has_compartment(compartment) {
                return Err(ModelError::UnknownCompartment(compartment.clone()));
            }
        }
        if stratification.mixing_matrix().is_some() {
            if let Some(missing) = self.compartments.iter().find(|c| !stratification.stratifies(c)) {
                return Err(ModelError::configuration(format!(
                    "stratification '{}' has a mixing matrix but does not cover compartment '{}'",
                    stratification.name(),
                    missing
                )));
            }
        }
        for adjustments in stratification.flow_adjustments() {
            if !self.has_flow(&adjustments.flow_name) {
                return Err(ModelError::UnknownFlow(adjustments.flow_name.clone()));
            }
            self.check_strata_filter(&adjustments.source_strata)?;
        }

        debug!(
            stratification = stratification.name(),
            strata = stratification.strata().len(),
            compartments = stratification.compartments().len(),
            adjusted_flows = stratification.flow_adjustments().len(),
            "Applying stratification"
        );
        self.stratifications.push(stratification);
        Ok(())
    }

    /// Check that a filter only names applied stratifications and their strata
    pub(crate) fn check_strata_filter(&self, filter: &StrataFilter) -> Result<()> {
        for (name, stratum) in filter {
            let stratification = self
                .stratification(name)
                .ok_or_else(|| ModelError::UnknownStratification(name.clone()))?;
            if !stratification.has_stratum(stratum) {
                return Err(ModelError::UnknownStratum {
                    stratification: name.clone(),
                    stratum: stratum.clone(),
                });
            }
        }
        Ok(())
    }

    /// All compartments after every stratification, in declaration order
    pub fn stratified_compartments(&self) -> Vec<CompartmentId> {
        self.stratifications
            .iter()
            .fold(self.base_compartment_ids(), |compartments, stratification| {
                expand_compartments(compartments, stratification)
            })
    }

    fn base_compartment_ids(&self) -> Vec<CompartmentId> {
        self.compartments.iter().map(CompartmentId::new).collect()
    }

    /// All flows after every stratification, with adjustments composed in
    /// stratification order.
    ///
    /// A flow whose source is stratified is expanded once per stratum, and
    /// its destination follows into the same stratum when that is stratified
    /// too. A flow entering a stratified destination from an unstratified (or
    /// absent) source is split, and without an adjustment each part carries
    /// `1 / n` of the rate. Ageing stratifications add a transition from each
    /// age group to the next for every compartment they cover.
    pub fn stratified_flows(&self) -> Vec<StratifiedFlow> {
        let mut compartments = self.base_compartment_ids();
        let mut flows: Vec<StratifiedFlow> = self
            .flows
            .iter()
            .map(|flow| StratifiedFlow {
                name: flow.name.clone(),
                kind: flow.kind,
                source: flow.source.as_ref().map(CompartmentId::new),
                dest: flow.dest.as_ref().map(CompartmentId::new),
                rate: flow.rate.clone(),
            })
            .collect();

        for stratification in &self.stratifications {
            let n_strata = stratification.strata().len() as f64;
            flows = flows
                .into_iter()
                .flat_map(|flow| {
                    let source_stratified = flow
                        .source
                        .as_ref()
                        .is_some_and(|c| stratification.stratifies(c.name()));
                    let dest_stratified = flow
                        .dest
                        .as_ref()
                        .is_some_and(|c| stratification.stratifies(c.name()));
                    if !source_stratified && !dest_stratified {
                        return vec![flow];
                    }

                    let scope = flow.source.as_ref().or(flow.dest.as_ref());
                    stratification
                        .strata()
                        .iter()
                        .map(|stratum| {
                            let adjustment = stratification.adjustment_for(&flow.name, stratum, scope);
                            let rate = match adjustment {
                                Some(adjustment) => adjustment.apply(flow.rate.clone()),
                                None if !source_stratified => flow.rate.clone() * (1.0 / n_strata),
                                None => flow.rate.clone(),
                            };
                            let place = |comp: &Option<CompartmentId>, stratified: bool| {
                                comp.as_ref().map(|c| {
                                    if stratified {
                                        c.with_stratum(stratification.name(), stratum)
                                    } else {
                                        c.clone()
                                    }
                                })
                            };
                            StratifiedFlow {
                                name: flow.name.clone(),
                                kind: flow.kind,
                                source: place(&flow.source, source_stratified),
                                dest: place(&flow.dest, dest_stratified),
                                rate,
                            }
                        })
                        .collect()
                })
                .collect();

            if stratification.is_ageing() {
                for compartment in compartments.iter().filter(|c| stratification.stratifies(c.name())) {
                    for (from, to, rate) in stratification.ageing_transitions() {
                        flows.push(StratifiedFlow {
                            name: format!("ageing_{}_to_{}", from, to),
                            kind: FlowKind::Transition,
                            source: Some(compartment.with_stratum(stratification.name(), from)),
                            dest: Some(compartment.with_stratum(stratification.name(), to)),
                            rate: Expr::constant(*rate),
                        });
                    }
                }
            }
            compartments = expand_compartments(compartments, stratification);
        }
        flows
    }

    /// Product of the infectiousness adjustments applying to a compartment
    pub fn infectiousness_multiplier(&self, compartment: &CompartmentId) -> Expr {
        let mut multiplier = Expr::constant(1.0);
        for stratification in &self.stratifications {
            let Some(stratum) = compartment.stratum(stratification.name()) else {
                continue;
            };
            match stratification.infectiousness_adjustment(compartment.name(), stratum) {
                Some(Adjustment::Multiply(factor)) => multiplier = multiplier * factor.clone(),
                Some(Adjustment::Overwrite(value)) => multiplier = value.clone(),
                None => {}
            }
        }
        multiplier
    }

    /// Names of every parameter referenced by flow rates, infectiousness
    /// adjustments and computed values
    pub fn required_parameters(&self) -> BTreeSet<String> {
        let mut parameters = BTreeSet::new();
        for flow in self.stratified_flows() {
            parameters.extend(flow.rate.parameters());
        }
        for compartment in self.stratified_compartments() {
            parameters.extend(self.infectiousness_multiplier(&compartment).parameters());
        }
        for (_, expr) in &self.computed_values {
            parameters.extend(expr.parameters());
        }
        for request in &self.outputs {
            parameters.extend(request.source.parameters());
        }
        parameters
    }

    /// Log a one-line summary of the assembled structure
    pub fn log_summary(&self) {
        info!(
            compartments = self.stratified_compartments().len(),
            flows = self.stratified_flows().len(),
            stratifications = self.stratifications.len(),
            outputs = self.outputs.len(),
            "Model assembled"
        );
    }
}

fn expand_compartments(compartments: Vec<CompartmentId>, stratification: &Stratification) -> Vec<CompartmentId> {
    compartments
        .into_iter()
        .flat_map(|comp| {
            if stratification.stratifies(comp.name()) {
                stratification
                    .strata()
                    .iter()
                    .map(|stratum| comp.with_stratum(stratification.name(), stratum))
                    .collect()
            } else {
                vec![comp]
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::expression::EvaluationContext;
    use crate::model::compartment::strata_filter;

    fn base_model() -> CompartmentalModel {
        let mut model = CompartmentalModel::new(
            &["susceptible", "latent", "infectious", "recovered"],
            &["infectious"],
        )
        .unwrap();
        model
            .add_crude_birth_flow("birth", Expr::parameter("crude_birth_rate"), "susceptible")
            .unwrap();
        model
            .add_infection_frequency_flow("infection", Expr::parameter("contact_rate"), "susceptible", "latent")
            .unwrap();
        model
            .add_transition_flow("activation", Expr::parameter("activation_rate"), "latent", "infectious")
            .unwrap();
        model
            .add_transition_flow("recovery", Expr::parameter("recovery_rate"), "infectious", "recovered")
            .unwrap();
        model
            .add_universal_death_flows("universal_death", Expr::parameter("death_rate"))
            .unwrap();
        model
    }

    fn multiply(pairs: &[(&str, f64)]) -> BTreeMap<String, Adjustment> {
        pairs
            .iter()
            .map(|(stratum, value)| (stratum.to_string(), Adjustment::multiply(*value)))
            .collect()
    }

    #[test]
    fn test_new_rejects_duplicates_and_unknown_infectious() {
        assert!(matches!(
            CompartmentalModel::new(&["a", "a"], &[] as &[&str]),
            Err(ModelError::DuplicateName(_))
        ));
        assert!(matches!(
            CompartmentalModel::new(&["a"], &["b"]),
            Err(ModelError::UnknownCompartment(_))
        ));
    }

    #[test]
    fn test_flow_validation() {
        let mut model = base_model();
        assert!(matches!(
            model.add_transition_flow("x", 1.0, "susceptible", "nowhere"),
            Err(ModelError::UnknownCompartment(_))
        ));
        assert!(matches!(
            model.add_transition_flow("activation", 1.0, "latent", "infectious"),
            Err(ModelError::DuplicateName(_))
        ));
        assert_eq!(model.flows().iter().filter(|f| f.name == "universal_death").count(), 4);
    }

    #[test]
    fn test_stratified_compartments_only_cover_stratified_subset() {
        let mut model = base_model();
        let organ = Stratification::new("organ", &["pulmonary", "extrapulmonary"], &["infectious"]).unwrap();
        model.stratify_with(organ).unwrap();
        let names: Vec<String> = model
            .stratified_compartments()
            .iter()
            .map(|c| c.to_string())
            .collect();
        assert_eq!(
            names,
            vec![
                "susceptible",
                "latent",
                "infectiousXorgan_pulmonary",
                "infectiousXorgan_extrapulmonary",
                "recovered"
            ]
        );
    }

    #[test]
    fn test_split_flows_default_to_even_share() {
        let mut model = base_model();
        let organ = Stratification::new("organ", &["a", "b", "c", "d"], &["infectious"]).unwrap();
        model.stratify_with(organ).unwrap();

        let activation: Vec<StratifiedFlow> = model
            .stratified_flows()
            .into_iter()
            .filter(|f| f.name == "activation")
            .collect();
        assert_eq!(activation.len(), 4);

        let mut context = EvaluationContext::new();
        context.set_parameter("activation_rate", 0.8);
        for flow in &activation {
            assert_eq!(flow.source.as_ref().unwrap().to_string(), "latent");
            assert_eq!(flow.rate.evaluate(&context).unwrap(), 0.2);
        }
    }

    #[test]
    fn test_adjustments_compose_in_order() {
        let mut model = base_model();
        let mut age = Stratification::new(
            "age",
            &["young", "old"],
            &["susceptible", "latent", "infectious", "recovered"],
        )
        .unwrap();
        age.set_flow_adjustments("activation", multiply(&[("young", 2.0), ("old", 1.0)]))
            .unwrap();
        model.stratify_with(age).unwrap();

        let mut organ = Stratification::new("organ", &["positive", "negative"], &["infectious"]).unwrap();
        organ
            .set_flow_adjustments("activation", multiply(&[("positive", 0.25), ("negative", 0.75)]))
            .unwrap();
        organ
            .set_flow_adjustments(
                "recovery",
                BTreeMap::from([
                    ("positive".to_string(), Adjustment::overwrite(Expr::parameter("recovery_positive"))),
                    ("negative".to_string(), Adjustment::overwrite(Expr::parameter("recovery_negative"))),
                ]),
            )
            .unwrap();
        model.stratify_with(organ).unwrap();

        let mut context = EvaluationContext::new();
        context.set_parameter("activation_rate", 1.0);
        context.set_parameter("recovery_positive", 0.3);
        context.set_parameter("recovery_negative", 0.1);

        let flows = model.stratified_flows();
        let young_positive = flows
            .iter()
            .find(|f| {
                f.name == "activation"
                    && f.dest.as_ref().unwrap().to_string() == "infectiousXage_youngXorgan_positive"
            })
            .unwrap();
        assert_eq!(
            young_positive.source.as_ref().unwrap().to_string(),
            "latentXage_young"
        );
        assert_eq!(young_positive.rate.evaluate(&context).unwrap(), 0.5);

        let recovery_negative = flows
            .iter()
            .find(|f| {
                f.name == "recovery"
                    && f.source.as_ref().unwrap().to_string() == "infectiousXage_oldXorgan_negative"
            })
            .unwrap();
        assert_eq!(
            recovery_negative.dest.as_ref().unwrap().to_string(),
            "recoveredXage_old"
        );
        assert_eq!(recovery_negative.rate.evaluate(&context).unwrap(), 0.1);
    }

    #[test]
    fn test_source_scope_must_reference_applied_stratification() {
        let mut model = base_model();
        let mut arms = Stratification::new(
            "act3",
            &["trial", "control"],
            &["susceptible", "latent", "infectious", "recovered"],
        )
        .unwrap();
        arms.set_flow_adjustments_for_source(
            "recovery",
            multiply(&[("trial", 0.0), ("control", 0.0)]),
            strata_filter(&[("age", "0")]),
        )
        .unwrap();
        assert!(matches!(
            model.clone().stratify_with(arms.clone()),
            Err(ModelError::UnknownStratification(_))
        ));

        let age = Stratification::new(
            "age",
            &["0", "15"],
            &["susceptible", "latent", "infectious", "recovered"],
        )
        .unwrap();
        model.stratify_with(age).unwrap();
        model.stratify_with(arms).unwrap();

        let mut context = EvaluationContext::new();
        context.set_parameter("recovery_rate", 0.5);
        for flow in model.stratified_flows().iter().filter(|f| f.name == "recovery") {
            let source = flow.source.as_ref().unwrap();
            let expected = if source.stratum("age") == Some("0") { 0.0 } else { 0.5 };
            assert_eq!(flow.rate.evaluate(&context).unwrap(), expected);
        }
    }

    #[test]
    fn test_rejects_unknown_flow_and_duplicate_stratification() {
        let mut model = base_model();
        let mut strat = Stratification::new("organ", &["a", "b"], &["infectious"]).unwrap();
        strat.set_flow_adjustments("missing", multiply(&[("a", 1.0)])).unwrap();
        assert!(matches!(model.stratify_with(strat), Err(ModelError::UnknownFlow(_))));

        let strat = Stratification::new("organ", &["a", "b"], &["infectious"]).unwrap();
        model.stratify_with(strat.clone()).unwrap();
        assert!(matches!(model.stratify_with(strat), Err(ModelError::DuplicateName(_))));
    }

    #[test]
    fn test_infectiousness_multiplier() {
        let mut model = base_model();
        let mut organ = Stratification::new("organ", &["positive", "negative"], &["infectious"]).unwrap();
        organ
            .add_infectiousness_adjustments(
                "infectious",
                BTreeMap::from([
                    ("positive".to_string(), Adjustment::multiply(1.0)),
                    ("negative".to_string(), Adjustment::multiply(Expr::parameter("negative_infect_multiplier"))),
                ]),
            )
            .unwrap();
        model.stratify_with(organ).unwrap();

        let negative = CompartmentId::new("infectious").with_stratum("organ", "negative");
        assert_eq!(
            model.infectiousness_multiplier(&negative),
            Expr::parameter("negative_infect_multiplier")
        );
        assert!(model.required_parameters().contains("negative_infect_multiplier"));
    }

    #[test]
    fn test_ageing_flows_follow_earlier_strata() {
        let mut model = base_model();
        let organ = Stratification::new("organ", &["positive", "negative"], &["infectious"]).unwrap();
        model.stratify_with(organ).unwrap();
        let mut age = Stratification::new(
            "age",
            &["0", "15"],
            &["susceptible", "latent", "infectious", "recovered"],
        )
        .unwrap();
        age.enable_ageing().unwrap();
        model.stratify_with(age).unwrap();

        let ageing: Vec<StratifiedFlow> = model
            .stratified_flows()
            .into_iter()
            .filter(|f| f.name == "ageing_0_to_15")
            .collect();
        // susceptible, latent, two organ strata of infectious, recovered
        assert_eq!(ageing.len(), 5);

        let context = EvaluationContext::new();
        let positive = ageing
            .iter()
            .find(|f| f.source.as_ref().unwrap().stratum("organ") == Some("positive"))
            .unwrap();
        assert_eq!(
            positive.dest.as_ref().unwrap().to_string(),
            "infectiousXorgan_positiveXage_15"
        );
        assert_eq!(positive.kind, FlowKind::Transition);
        assert_eq!(positive.rate.evaluate(&context).unwrap(), 1.0 / 15.0);
    }
}
