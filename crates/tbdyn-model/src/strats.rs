//! Stratification builders, applied in order: age, organ, then ACT3 arm

pub mod act3;
pub mod age;
pub mod organ;

pub use act3::get_act3_strat;
pub use age::get_age_strat;
pub use organ::{get_organ_strat, organ_splitting_proportions};
