//! Declarative stratified compartmental models.
//!
//! A [`CompartmentalModel`] is assembled from named compartments and flows,
//! split by [`Stratification`]s and annotated with derived output requests.
//! Rates are symbolic [`Expr`] trees; an external [`SimulationEngine`]
//! integrates the model and [`DerivedOutputs`] evaluates the requests over
//! its raw results.

pub mod engine;
pub mod error;
pub mod expression;
pub mod functions;
pub mod model;
pub mod results;
pub mod types;

pub use engine::SimulationEngine;
pub use error::{ModelError, Result};
pub use expression::{EvaluationContext, Expr, ExpressionError, Function, RateExpression};
pub use model::{
    proportional_mixing_matrix, strata_filter, Adjustment, CompartmentId, CompartmentalModel, Flow,
    FlowId, FlowKind, OutputRequest, OutputSource, StrataFilter, Stratification, StratifiedFlow,
};
pub use results::{DerivedOutputs, ModelResults};
pub use types::TimeSeries;
