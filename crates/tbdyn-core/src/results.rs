//! Raw simulation results and derived output evaluation

use std::collections::{BTreeMap, HashMap};

use nalgebra::DMatrix;
use tracing::{debug, warn};

use crate::error::{ModelError, Result};
use crate::expression::EvaluationContext;
use crate::model::{CompartmentId, CompartmentalModel, FlowId, OutputSource};

/// Trajectories produced by a simulation engine.
///
/// Compartment sizes and flow throughputs are stored with one row per time
/// point and one column per stratified compartment or flow.
#[derive(Clone, Debug)]
pub struct ModelResults {
    times: Vec<f64>,
    compartments: Vec<CompartmentId>,
    compartment_values: DMatrix<f64>,
    flows: Vec<FlowId>,
    flow_values: DMatrix<f64>,
}

impl ModelResults {
    pub fn new(
        times: Vec<f64>,
        compartments: Vec<CompartmentId>,
        compartment_values: DMatrix<f64>,
        flows: Vec<FlowId>,
        flow_values: DMatrix<f64>,
    ) -> Result<Self> {
        if compartment_values.nrows() != times.len() || compartment_values.ncols() != compartments.len() {
            return Err(ModelError::Simulation(format!(
                "compartment values are {}x{}, expected {}x{}",
                compartment_values.nrows(),
                compartment_values.ncols(),
                times.len(),
                compartments.len()
            )));
        }
        if flow_values.nrows() != times.len() || flow_values.ncols() != flows.len() {
            return Err(ModelError::Simulation(format!(
                "flow values are {}x{}, expected {}x{}",
                flow_values.nrows(),
                flow_values.ncols(),
                times.len(),
                flows.len()
            )));
        }
        if times.windows(2).any(|pair| pair[1] <= pair[0]) {
            return Err(ModelError::Simulation(
                "result times must be strictly increasing".to_string(),
            ));
        }
        Ok(Self {
            times,
            compartments,
            compartment_values,
            flows,
            flow_values,
        })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn compartments(&self) -> &[CompartmentId] {
        &self.compartments
    }

    pub fn compartment_values(&self) -> &DMatrix<f64> {
        &self.compartment_values
    }

    pub fn flows(&self) -> &[FlowId] {
        &self.flows
    }

    pub fn flow_values(&self) -> &DMatrix<f64> {
        &self.flow_values
    }

    fn sum_columns(values: &DMatrix<f64>, columns: &[usize]) -> Vec<f64> {
        values
            .row_iter()
            .map(|row| columns.iter().map(|&col| row[col]).sum())
            .collect()
    }
}

/// Derived outputs evaluated over a set of results.
///
/// Only outputs requested with `save_results` are kept.
#[derive(Clone, Debug, Default)]
pub struct DerivedOutputs {
    times: Vec<f64>,
    values: BTreeMap<String, Vec<f64>>,
}

impl DerivedOutputs {
    /// Evaluate every output declared on `model`, in declaration order
    pub fn evaluate(
        model: &CompartmentalModel,
        results: &ModelResults,
        parameters: &HashMap<String, f64>,
    ) -> Result<Self> {
        let times = results.times().to_vec();
        let mut contexts: Vec<EvaluationContext> = times
            .iter()
            .map(|&time| {
                let mut context = EvaluationContext::with_parameters(parameters.clone());
                context.set_time(time);
                context
            })
            .collect();

        let mut computed: HashMap<String, Vec<f64>> = HashMap::new();
        for (name, expr) in model.computed_values() {
            let series = contexts
                .iter()
                .map(|context| expr.evaluate(context))
                .collect::<std::result::Result<Vec<f64>, _>>()?;
            for (context, value) in contexts.iter_mut().zip(&series) {
                context.set_computed_value(name.clone(), *value);
            }
            computed.insert(name.clone(), series);
        }

        let mut all: HashMap<String, Vec<f64>> = HashMap::new();
        let mut saved = BTreeMap::new();
        for request in model.outputs() {
            let series = match &request.source {
                OutputSource::Compartments {
                    compartments,
                    strata,
                } => {
                    let columns: Vec<usize> = results
                        .compartments()
                        .iter()
                        .enumerate()
                        .filter(|(_, comp)| {
                            compartments.iter().any(|name| name == comp.name()) && comp.matches(strata)
                        })
                        .map(|(idx, _)| idx)
                        .collect();
                    ModelResults::sum_columns(results.compartment_values(), &columns)
                }
                OutputSource::Flow {
                    flow,
                    source_strata,
                    dest_strata,
                } => {
                    let columns: Vec<usize> = results
                        .flows()
                        .iter()
                        .enumerate()
                        .filter(|(_, id)| id.matches(flow, source_strata, dest_strata))
                        .map(|(idx, _)| idx)
                        .collect();
                    if columns.is_empty() {
                        warn!(output = %request.name, flow = %flow, "Flow output matches no flow results");
                    }
                    ModelResults::sum_columns(results.flow_values(), &columns)
                }
                OutputSource::Aggregate { sources } => {
                    let mut total = vec![0.0; times.len()];
                    for source in sources {
                        let series = all
                            .get(source)
                            .ok_or_else(|| ModelError::UnknownOutput(source.clone()))?;
                        for (acc, value) in total.iter_mut().zip(series) {
                            *acc += value;
                        }
                    }
                    total
                }
                OutputSource::Function(expr) => contexts
                    .iter()
                    .map(|context| expr.evaluate(context))
                    .collect::<std::result::Result<Vec<f64>, _>>()?,
                OutputSource::ComputedValue(name) => computed
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ModelError::UnknownOutput(name.clone()))?,
            };

            for (context, value) in contexts.iter_mut().zip(&series) {
                context.set_output(request.name.clone(), *value);
            }
            if request.save_results {
                saved.insert(request.name.clone(), series.clone());
            }
            all.insert(request.name.clone(), series);
        }

        debug!(
            evaluated = all.len(),
            saved = saved.len(),
            time_points = times.len(),
            "Evaluated derived outputs"
        );
        Ok(Self {
            times,
            values: saved,
        })
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.values.get(name).map(Vec::as_slice)
    }

    /// Value of an output at a time point present in the results
    pub fn value_at(&self, name: &str, time: f64) -> Option<f64> {
        let idx = self.times.iter().position(|t| (t - time).abs() < 1e-9)?;
        self.get(name).map(|series| series[idx])
    }
}
