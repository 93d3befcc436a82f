use std::collections::HashMap;

use crate::error::ModelError;
use crate::model::CompartmentalModel;
use crate::results::ModelResults;

/// Seam to an external numerical solver.
///
/// Implementations integrate the stratified compartments and flows of a
/// model under one parameter set and return the raw trajectories. Derived
/// outputs are then evaluated with
/// [`DerivedOutputs::evaluate`](crate::results::DerivedOutputs::evaluate).
pub trait SimulationEngine {
    fn simulate(
        &self,
        model: &CompartmentalModel,
        parameters: &HashMap<String, f64>,
    ) -> Result<ModelResults, ModelError>;
}
