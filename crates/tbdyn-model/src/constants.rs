//! Model structure shared by the builders

use nalgebra::DMatrix;

pub const COMPARTMENTS: [&str; 6] = [
    "susceptible",
    "early_latent",
    "late_latent",
    "infectious",
    "on_treatment",
    "recovered",
];

pub const LATENT_COMPARTMENTS: [&str; 2] = ["early_latent", "late_latent"];

pub const INFECTIOUS_COMPARTMENTS: [&str; 2] = ["infectious", "on_treatment"];

/// Lower bound of each age group, in years
pub const AGE_STRATA: [u32; 6] = [0, 5, 15, 35, 50, 70];

pub const ORGAN_STRATA: [&str; 3] = ["smear_positive", "smear_negative", "extrapulmonary"];

/// Infection flows, one per susceptible state
pub const INFECTION_FLOWS: [&str; 3] = [
    "infection_from_susceptible",
    "infection_from_late_latent",
    "infection_from_recovered",
];

pub const ACTIVATION_FLOWS: [&str; 2] = ["early_activation", "late_activation"];

/// Yearly contacts by age group (rows) and contact age group (columns)
const CONTACT_RATES: [[f64; 6]; 6] = [
    [1250.691457, 740.4900331, 1255.1379411, 755.99800388, 351.92836824, 36.16826398],
    [314.45730134, 3330.01566881, 992.71557558, 924.45607039, 256.90791233, 34.21905256],
    [221.15622694, 710.12087625, 4321.24105361, 1576.70431504, 604.00225891, 22.48129456],
    [224.33879994, 751.4812055, 2148.38482347, 2289.91571398, 721.8062501, 34.84227864],
    [192.9874274, 481.62767533, 1300.78238257, 1044.86906425, 717.99705055, 39.63652457],
    [81.9016913, 334.39864375, 382.67445579, 432.07589528, 297.04273652, 108.95684725],
];

/// Age contact matrix matching [`AGE_STRATA`]
pub fn contact_matrix() -> DMatrix<f64> {
    DMatrix::from_fn(CONTACT_RATES.len(), CONTACT_RATES.len(), |i, j| CONTACT_RATES[i][j])
}

/// Age strata as stratum names
pub fn age_stratum_names(age_strata: &[u32]) -> Vec<String> {
    age_strata.iter().map(u32::to_string).collect()
}
