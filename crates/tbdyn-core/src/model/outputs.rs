//! Derived output requests

use std::collections::BTreeSet;

use tracing::debug;

use super::compartment::StrataFilter;
use super::compartmental::CompartmentalModel;
use crate::error::{ModelError, Result};
use crate::expression::Expr;

/// Where a derived output takes its values from
#[derive(Clone, Debug, PartialEq)]
pub enum OutputSource {
    /// Summed size of the named base compartments restricted to the strata
    Compartments {
        compartments: Vec<String>,
        strata: StrataFilter,
    },
    /// Summed throughput of a flow restricted by source and destination strata
    Flow {
        flow: String,
        source_strata: StrataFilter,
        dest_strata: StrataFilter,
    },
    /// Sum of previously declared outputs
    Aggregate { sources: Vec<String> },
    /// Expression over previously declared outputs, computed values,
    /// parameters and time
    Function(Expr),
    /// A computed value recorded as an output
    ComputedValue(String),
}

impl OutputSource {
    /// Parameters read when evaluating this output
    pub fn parameters(&self) -> BTreeSet<String> {
        match self {
            Self::Function(expr) => expr.parameters(),
            _ => BTreeSet::new(),
        }
    }
}

/// A named derived output declared on a model
#[derive(Clone, Debug, PartialEq)]
pub struct OutputRequest {
    pub name: String,
    pub source: OutputSource,
    /// Whether the output is kept in the results or only used by later outputs
    pub save_results: bool,
}

impl CompartmentalModel {
    pub fn outputs(&self) -> &[OutputRequest] {
        &self.outputs
    }

    pub fn output(&self, name: &str) -> Option<&OutputRequest> {
        self.outputs.iter().find(|o| o.name == name)
    }

    pub fn computed_values(&self) -> &[(String, Expr)] {
        &self.computed_values
    }

    /// Request the summed size of compartments, optionally restricted to strata
    pub fn request_output_for_compartments(
        &mut self,
        name: impl Into<String>,
        compartments: &[impl AsRef<str>],
        strata: StrataFilter,
        save_results: bool,
    ) -> Result<Expr> {
        let compartments: Vec<String> = compartments.iter().map(|c| c.as_ref().to_string()).collect();
        if let Some(unknown) = compartments.iter().find(|c| !self.has_compartment(c)) {
            return Err(ModelError::UnknownCompartment(unknown.clone()));
        }
        self.check_strata_filter(&strata)?;
        self.push_output(
            name.into(),
            OutputSource::Compartments {
                compartments,
                strata,
            },
            save_results,
        )
    }

    /// Request the throughput of a flow, optionally restricted by the strata
    /// of its source and destination
    pub fn request_output_for_flow(
        &mut self,
        name: impl Into<String>,
        flow: &str,
        source_strata: StrataFilter,
        dest_strata: StrataFilter,
        save_results: bool,
    ) -> Result<Expr> {
        if !self.has_flow(flow) {
            return Err(ModelError::UnknownFlow(flow.to_string()));
        }
        self.check_strata_filter(&source_strata)?;
        self.check_strata_filter(&dest_strata)?;
        self.push_output(
            name.into(),
            OutputSource::Flow {
                flow: flow.to_string(),
                source_strata,
                dest_strata,
            },
            save_results,
        )
    }

    /// Request the sum of already declared outputs
    pub fn request_aggregate_output(
        &mut self,
        name: impl Into<String>,
        sources: &[impl AsRef<str>],
        save_results: bool,
    ) -> Result<Expr> {
        let sources: Vec<String> = sources.iter().map(|s| s.as_ref().to_string()).collect();
        if let Some(missing) = sources.iter().find(|s| self.output(s).is_none()) {
            return Err(ModelError::configuration(format!(
                "aggregate output references '{}' before it is declared",
                missing
            )));
        }
        self.push_output(name.into(), OutputSource::Aggregate { sources }, save_results)
    }

    /// Request an output computed from an expression over declared outputs
    pub fn request_function_output(
        &mut self,
        name: impl Into<String>,
        expr: Expr,
        save_results: bool,
    ) -> Result<Expr> {
        if let Some(missing) = expr.outputs().into_iter().find(|o| self.output(o).is_none()) {
            return Err(ModelError::configuration(format!(
                "function output references '{}' before it is declared",
                missing
            )));
        }
        self.check_computed_values_declared(&expr)?;
        self.push_output(name.into(), OutputSource::Function(expr), save_results)
    }

    /// Declare a value computed at each time point from parameters, time and
    /// earlier computed values
    pub fn add_computed_value_func(&mut self, name: impl Into<String>, expr: Expr) -> Result<Expr> {
        let name = name.into();
        if self.computed_values.iter().any(|(existing, _)| *existing == name) {
            return Err(ModelError::DuplicateName(name));
        }
        if !expr.outputs().is_empty() {
            return Err(ModelError::configuration(format!(
                "computed value '{}' cannot read derived outputs",
                name
            )));
        }
        self.check_computed_values_declared(&expr)?;
        debug!(computed_value = %name, "Declared computed value");
        self.computed_values.push((name.clone(), expr));
        Ok(Expr::computed_value(name))
    }

    /// Record a declared computed value as an output of the same name
    pub fn request_computed_value_output(&mut self, name: &str) -> Result<Expr> {
        if !self.computed_values.iter().any(|(existing, _)| existing == name) {
            return Err(ModelError::configuration(format!(
                "computed value '{}' is not declared",
                name
            )));
        }
        self.push_output(
            name.to_string(),
            OutputSource::ComputedValue(name.to_string()),
            true,
        )
    }

    fn check_computed_values_declared(&self, expr: &Expr) -> Result<()> {
        for value in expr.computed_values() {
            if !self.computed_values.iter().any(|(existing, _)| *existing == value) {
                return Err(ModelError::configuration(format!(
                    "expression references computed value '{}' before it is declared",
                    value
                )));
            }
        }
        Ok(())
    }

    fn push_output(&mut self, name: String, source: OutputSource, save_results: bool) -> Result<Expr> {
        if self.output(&name).is_some() {
            return Err(ModelError::DuplicateName(name));
        }
        self.outputs.push(OutputRequest {
            name: name.clone(),
            source,
            save_results,
        });
        Ok(Expr::output(name))
    }
}
