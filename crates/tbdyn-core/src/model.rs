//! Model structure: compartments, flows, stratifications and output requests

mod adjustment;
mod compartment;
mod compartmental;
mod flow;
mod mixing;
mod outputs;
mod stratification;

pub use adjustment::{Adjustment, FlowAdjustments};
pub use compartment::{strata_filter, CompartmentId, StrataFilter};
pub use compartmental::CompartmentalModel;
pub use flow::{Flow, FlowId, FlowKind, StratifiedFlow};
pub use mixing::{
    proportional_mixing_matrix, validate_mixing_matrix, validate_population_split,
    POPULATION_SPLIT_TOLERANCE,
};
pub use outputs::{OutputRequest, OutputSource};
pub use stratification::Stratification;
