use serde::{Deserialize, Serialize};

use super::compartment::{CompartmentId, StrataFilter};
use crate::expression::Expr;

/// How a flow moves people
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowKind {
    /// Per-capita transition from source to destination
    Transition,
    /// Infection: rate scaled by the force of infection (frequency dependent)
    Infection,
    /// Exit from the model out of the source compartment
    Death,
    /// Entry into the destination compartment proportional to total population
    Entry,
}

/// A named flow between base compartments with its unstratified rate
#[derive(Clone, Debug)]
pub struct Flow {
    pub name: String,
    pub kind: FlowKind,
    pub source: Option<String>,
    pub dest: Option<String>,
    pub rate: Expr,
}

/// A flow between stratified compartments, with all stratification
/// adjustments folded into its rate
#[derive(Clone, Debug)]
pub struct StratifiedFlow {
    pub name: String,
    pub kind: FlowKind,
    pub source: Option<CompartmentId>,
    pub dest: Option<CompartmentId>,
    pub rate: Expr,
}

impl StratifiedFlow {
    /// Identity of this flow, used to label flow throughputs
    pub fn id(&self) -> FlowId {
        FlowId {
            name: self.name.clone(),
            source: self.source.clone(),
            dest: self.dest.clone(),
        }
    }
}

/// Identifies a stratified flow in simulation results
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FlowId {
    pub name: String,
    pub source: Option<CompartmentId>,
    pub dest: Option<CompartmentId>,
}

impl FlowId {
    /// True when the flow has the given name and its endpoints match the filters.
    ///
    /// Source filters are checked against the source compartment, or the
    /// destination for entry flows. Destination filters are checked against
    /// the destination, or the source for exit flows.
    pub fn matches(&self, name: &str, source_strata: &StrataFilter, dest_strata: &StrataFilter) -> bool {
        if self.name != name {
            return false;
        }
        let source = self.source.as_ref().or(self.dest.as_ref());
        let dest = self.dest.as_ref().or(self.source.as_ref());
        let source_ok = source_strata.is_empty() || source.is_some_and(|c| c.matches(source_strata));
        let dest_ok = dest_strata.is_empty() || dest.is_some_and(|c| c.matches(dest_strata));
        source_ok && dest_ok
    }
}
