//! Priors, targets and maximum a posteriori calibration for tbdyn models.
//!
//! Sampling is left to external engines: this crate declares what is
//! calibrated ([`Prior`], [`Target`]), evaluates log densities through a
//! [`BayesianCompartmentalModel`], and offers a Nelder-Mead point estimate
//! that can seed a sampler.

pub mod bayesian;
pub mod calibration_problem;
pub mod error;
pub mod labels;
pub mod optimization;
pub mod priors;
pub mod targets;
pub mod types;

pub use bayesian::BayesianCompartmentalModel;
pub use calibration_problem::CalibrationProblem;
pub use error::{CalibrationError, Result};
pub use labels::{is_dispersion_parameter, parameter_label, readable_label};
pub use optimization::{optimize, MapSearch, TracingObserver};
pub use priors::{convert_all_priors, Distribution, Prior, PriorSpec};
pub use targets::{Dispersion, Target};
pub use types::{CalibrationParameter, CalibrationResult};
