//! Population splits and inter-stratum mixing matrices

use std::collections::BTreeMap;

use nalgebra::DMatrix;

use crate::error::{ModelError, Result};

/// Allowed deviation of a population split's sum from one
pub const POPULATION_SPLIT_TOLERANCE: f64 = 1e-9;

/// Check that a population split covers exactly the strata, holds finite
/// non-negative proportions, and sums to one.
pub fn validate_population_split(strata: &[String], split: &BTreeMap<String, f64>) -> Result<()> {
    if let Some(unknown) = split.keys().find(|key| !strata.contains(key)) {
        return Err(ModelError::configuration(format!(
            "population split names unknown stratum '{}' (strata: {})",
            unknown,
            strata.join(", ")
        )));
    }
    if let Some(missing) = strata.iter().find(|stratum| !split.contains_key(*stratum)) {
        return Err(ModelError::configuration(format!(
            "population split is missing stratum '{}'",
            missing
        )));
    }
    if let Some((stratum, value)) = split
        .iter()
        .find(|(_, value)| !value.is_finite() || **value < 0.0)
    {
        return Err(ModelError::configuration(format!(
            "population proportion for '{}' must be finite and non-negative, got {}",
            stratum, value
        )));
    }

    let total: f64 = split.values().sum();
    if (total - 1.0).abs() > POPULATION_SPLIT_TOLERANCE {
        return Err(ModelError::configuration(format!(
            "population split must sum to 1, got {}",
            total
        )));
    }
    Ok(())
}

/// Check that a mixing matrix is square over the strata, finite and non-negative
pub fn validate_mixing_matrix(n_strata: usize, matrix: &DMatrix<f64>) -> Result<()> {
    if matrix.nrows() != n_strata || matrix.ncols() != n_strata {
        return Err(ModelError::configuration(format!(
            "mixing matrix must be {}x{}, got {}x{}",
            n_strata,
            n_strata,
            matrix.nrows(),
            matrix.ncols()
        )));
    }
    if matrix.iter().any(|value| !value.is_finite() || *value < 0.0) {
        return Err(ModelError::configuration(
            "mixing matrix entries must be finite and non-negative",
        ));
    }
    Ok(())
}

/// Mixing matrix from population proportions and a within-stratum mixing share.
///
/// Diagonal entries are `within`; each off-diagonal entry spreads the
/// remaining `1 - within` over the other strata in proportion to their
/// population: `(1 - within) * p[j] / sum(p[k] for k != i)`.
///
/// Fails if `within` lies outside `[0, 1]` or if the population outside any
/// stratum is not strictly positive.
pub fn proportional_mixing_matrix(
    strata: &[String],
    proportions: &BTreeMap<String, f64>,
    within: f64,
) -> Result<DMatrix<f64>> {
    if !(0.0..=1.0).contains(&within) {
        return Err(ModelError::configuration(format!(
            "within-stratum mixing proportion must be in [0, 1], got {}",
            within
        )));
    }
    validate_population_split(strata, proportions)?;

    let props: Vec<f64> = strata.iter().map(|stratum| proportions[stratum]).collect();
    let n = props.len();
    let total: f64 = props.iter().sum();

    let mut matrix = DMatrix::zeros(n, n);
    for i in 0..n {
        let prop_pop_non_i = total - props[i];
        if n > 1 && !(prop_pop_non_i > POPULATION_SPLIT_TOLERANCE) {
            return Err(ModelError::configuration(format!(
                "population outside stratum '{}' must be positive to build a mixing matrix",
                strata[i]
            )));
        }
        for j in 0..n {
            matrix[(i, j)] = if i == j {
                within
            } else {
                (1.0 - within) * props[j] / prop_pop_non_i
            };
        }
    }
    Ok(matrix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn strata(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn split(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
        pairs.iter().map(|(name, value)| (name.to_string(), *value)).collect()
    }

    #[test]
    fn test_population_split_validation() {
        let names = strata(&["trial", "control"]);
        assert!(validate_population_split(&names, &split(&[("trial", 0.3), ("control", 0.7)])).is_ok());
        assert!(validate_population_split(&names, &split(&[("trial", 0.3), ("control", 0.6)])).is_err());
        assert!(validate_population_split(&names, &split(&[("trial", 1.0)])).is_err());
        assert!(validate_population_split(
            &names,
            &split(&[("trial", 0.3), ("control", 0.7), ("other", 0.0)])
        )
        .is_err());
        assert!(validate_population_split(&names, &split(&[("trial", 1.5), ("control", -0.5)])).is_err());
    }

    #[test]
    fn test_rows_sum_to_one() {
        let names = strata(&["a", "b", "c", "d"]);
        let props = split(&[("a", 0.1), ("b", 0.2), ("c", 0.3), ("d", 0.4)]);
        for within in [0.05, 0.3, 0.5, 0.8, 0.95] {
            let matrix = proportional_mixing_matrix(&names, &props, within).unwrap();
            for row in matrix.row_iter() {
                assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-12);
            }
            for i in 0..4 {
                assert_eq!(matrix[(i, i)], within);
            }
        }
    }

    #[test]
    fn test_two_arm_matrix() {
        let names = strata(&["trial", "control"]);
        let props = split(&[("trial", 0.25), ("control", 0.75)]);
        let matrix = proportional_mixing_matrix(&names, &props, 0.9).unwrap();
        assert_abs_diff_eq!(matrix[(0, 1)], 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(matrix[(1, 0)], 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_all_population_in_one_stratum_fails() {
        let names = strata(&["trial", "control"]);
        let props = split(&[("trial", 1.0), ("control", 0.0)]);
        for within in [0.0, 0.5, 0.99] {
            assert!(matches!(
                proportional_mixing_matrix(&names, &props, within),
                Err(ModelError::Configuration(_))
            ));
        }
    }

    #[test]
    fn test_within_out_of_range_fails() {
        let names = strata(&["trial", "control"]);
        let props = split(&[("trial", 0.5), ("control", 0.5)]);
        assert!(proportional_mixing_matrix(&names, &props, -0.1).is_err());
        assert!(proportional_mixing_matrix(&names, &props, 1.1).is_err());
    }

    #[test]
    fn test_single_stratum() {
        let names = strata(&["all"]);
        let matrix = proportional_mixing_matrix(&names, &split(&[("all", 1.0)]), 1.0).unwrap();
        assert_eq!(matrix[(0, 0)], 1.0);
    }

    #[test]
    fn test_mixing_matrix_validation() {
        assert!(validate_mixing_matrix(2, &DMatrix::from_element(2, 2, 0.5)).is_ok());
        assert!(validate_mixing_matrix(3, &DMatrix::from_element(2, 2, 0.5)).is_err());
        assert!(validate_mixing_matrix(2, &DMatrix::from_element(2, 2, -0.5)).is_err());
    }
}
