//! Tuberculosis transmission model built on `tbdyn-core`.
//!
//! [`build_model`] assembles the base TB model and stratifies it by age,
//! organ involvement and, when configured, ACT3 trial arm before requesting
//! its derived outputs. [`get_bcm`] bundles the result with the priors and
//! targets used for calibration.
//!
//! ```rust,ignore
//! use tbdyn_model::{build_default_model, FixedParams};
//!
//! let fixed_params = FixedParams::from_json(&json)?;
//! let model = build_default_model(&fixed_params)?;
//! println!("{} parameters", model.required_parameters().len());
//! ```

pub mod calibration;
pub mod constants;
pub mod error;
pub mod model;
pub mod outputs;
pub mod params;
pub mod strats;

pub use calibration::{get_all_priors, get_bcm, get_targets};
pub use error::{Result, TbError};
pub use model::{build_base_model, build_default_model, build_model};
pub use outputs::{request_cdr, request_model_outputs};
pub use params::{Act3Params, AgeParams, CovidEffects, FixedParams};
pub use strats::{get_act3_strat, get_age_strat, get_organ_strat};
