//! # Time-varying functions
//!
//! Pure numeric building blocks for time-varying rates and multipliers. Every
//! function here is total over its documented domain and keeps no state, so
//! expressions built on top of them can be evaluated at arbitrary time points
//! and in any order.
//!
//! Branches are written as value selections (`if` expressions returning a
//! value, `max`, `clamp`) so each function stays piecewise smooth.

use crate::expression::ExpressionError;
use tracing::warn;

/// Default curvature used by [`sigmoidal_interpolation`]
pub const DEFAULT_SIGMOID_CURVATURE: f64 = 16.0;

/// Hyperbolic-tangent scale-up between two asymptotes.
///
/// `(tanh(shape * (t - inflection_time)) / 2 + 0.5) * (end - start) + start`
///
/// Evaluated as a weighted mean of the asymptotes so that the value at the
/// inflection time is exactly `(start + end) / 2`.
pub fn tanh_based_scaleup(
    t: f64,
    shape: f64,
    inflection_time: f64,
    start_asymptote: f64,
    end_asymptote: f64,
) -> f64 {
    let weight = (shape * (t - inflection_time)).tanh() / 2.0 + 0.5;
    start_asymptote * (1.0 - weight) + end_asymptote * weight
}

/// Build the straight line through `(x_0, y_0)` and `(x_1, y_1)`.
///
/// Requires `x_1 > x_0`. The returned curve accepts any `x`.
pub fn make_linear_curve(
    x_0: f64,
    x_1: f64,
    y_0: f64,
    y_1: f64,
) -> Result<impl Fn(f64) -> f64, ExpressionError> {
    if !(x_1 > x_0) {
        return Err(ExpressionError::InvalidArgument(format!(
            "linear curve requires x_1 > x_0, got x_0={}, x_1={}",
            x_0, x_1
        )));
    }
    let slope = (y_1 - y_0) / (x_1 - x_0);
    Ok(move |x: f64| y_0 + slope * (x - x_0))
}

/// Symmetric triangular pulse: zero outside `[start, start + duration]`,
/// rising linearly to `peak` at the midpoint and back to zero.
pub fn triangle_wave(time: f64, start: f64, duration: f64, peak: f64) -> f64 {
    let half_duration = duration * 0.5;
    let peak_time = start + half_duration;
    let time_from_peak = (peak_time - time).abs();
    if time_from_peak < half_duration {
        peak - time_from_peak * (peak / half_duration)
    } else {
        0.0
    }
}

/// Progression rate reduced by a diabetes prevalence that scales up around 1980.
pub fn latency_with_diabetes(
    t: f64,
    prop_diabetes: f64,
    previous_progression_rate: f64,
    rr_progression_diabetes: f64,
) -> f64 {
    let diabetes_scale_up = tanh_based_scaleup(t, 0.05, 1980.0, 0.0, 1.0);
    (1.0 - diabetes_scale_up * prop_diabetes * (1.0 - rr_progression_diabetes))
        * previous_progression_rate
}

/// `ln(1 + e^x)` without overflow for large `x`
fn softplus(x: f64) -> f64 {
    x.max(0.0) + (-x.abs()).exp().ln_1p()
}

/// Average of the logistic curve `1 / (1 + exp(-(x - inflection)))` over
/// `[low_val, upper_val]`.
///
/// Used to approximate an age band's mean effect without integrating per
/// time step. A zero-width band returns the curve's value at that point.
pub fn average_sigmoid(low_val: f64, upper_val: f64, inflection: f64) -> f64 {
    if upper_val == low_val {
        return 1.0 / (1.0 + (inflection - low_val).exp());
    }
    (softplus(upper_val - inflection) - softplus(low_val - inflection)) / (upper_val - low_val)
}

/// Midpoint of an age group given the ordered group breakpoints.
///
/// The last group has no upper bound, so its breakpoint stands in for the
/// average age.
pub fn average_age_for_bcg(age_group: u32, age_breakpoints: &[u32]) -> Result<f64, ExpressionError> {
    let index = age_breakpoints
        .iter()
        .position(|&breakpoint| breakpoint == age_group)
        .ok_or_else(|| {
            ExpressionError::InvalidArgument(format!(
                "age group {} is not one of the breakpoints {:?}",
                age_group, age_breakpoints
            ))
        })?;

    match age_breakpoints.get(index + 1) {
        Some(&upper) => Ok(0.5 * (age_group as f64 + upper as f64)),
        None => {
            warn!(
                age_group,
                "using the age group name as the average age of the last age group"
            );
            Ok(age_group as f64)
        }
    }
}

/// Infection risk multiplier given BCG coverage (percent) and the relative
/// risk of infection among the vaccinated.
pub fn bcg_multiplier(coverage_percent: f64, vaccinated_multiplier: f64) -> f64 {
    1.0 - coverage_percent / 100.0 * (1.0 - vaccinated_multiplier)
}

/// Case detection ratio: the share of exits from active disease that are
/// detections.
pub fn case_detection_ratio(
    detection_rate: f64,
    death_rate: f64,
    self_recovery_rate: f64,
) -> Result<f64, ExpressionError> {
    let total_exit_rate = detection_rate + death_rate + self_recovery_rate;
    if total_exit_rate <= 0.0 {
        return Err(ExpressionError::DivisionByZero(format!(
            "case detection ratio (detection={}, death={}, self_recovery={})",
            detection_rate, death_rate, self_recovery_rate
        )));
    }
    Ok(detection_rate / total_exit_rate)
}

/// Exit rates from treatment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreatmentOutcomes {
    /// Treatment completion rate
    pub success: f64,
    /// Death rate attributable to treatment episodes, net of natural mortality
    pub death: f64,
    /// Rate of return to active disease
    pub relapse: f64,
}

/// Split the treatment period into success, death and relapse rates.
///
/// The proportion dying from treatment is the requested proportion of
/// non-success deaths net of natural deaths during treatment, floored at zero.
/// Rates are proportions per unit of treatment duration.
pub fn treatment_outcomes(
    duration: f64,
    prop_death_among_non_success: f64,
    natural_death_rate: f64,
    treatment_success_rate: f64,
) -> Result<TreatmentOutcomes, ExpressionError> {
    if !(duration > 0.0) {
        return Err(ExpressionError::InvalidArgument(format!(
            "treatment duration must be positive, got {}",
            duration
        )));
    }

    let prop_natural_death_while_on_treatment = 1.0 - (-duration * natural_death_rate).exp();
    let requested_prop_death_on_treatment =
        (1.0 - treatment_success_rate) * prop_death_among_non_success;
    let prop_death_from_treatment =
        (requested_prop_death_on_treatment - prop_natural_death_while_on_treatment).max(0.0);
    let relapse_prop = 1.0
        - treatment_success_rate
        - prop_death_from_treatment
        - prop_natural_death_while_on_treatment;

    Ok(TreatmentOutcomes {
        success: treatment_success_rate / duration,
        death: prop_death_from_treatment / duration,
        relapse: relapse_prop / duration,
    })
}

/// Check that interpolation knots are strictly increasing and paired with values
pub fn validate_knots(knots: &[f64], n_values: usize) -> Result<(), ExpressionError> {
    if knots.is_empty() {
        return Err(ExpressionError::InvalidInterpolation(
            "at least one knot is required".to_string(),
        ));
    }
    if knots.len() != n_values {
        return Err(ExpressionError::InvalidInterpolation(format!(
            "{} knots but {} values",
            knots.len(),
            n_values
        )));
    }
    if knots.iter().any(|knot| !knot.is_finite()) {
        return Err(ExpressionError::InvalidInterpolation(
            "knots must be finite".to_string(),
        ));
    }
    if knots.windows(2).any(|pair| pair[1] <= pair[0]) {
        return Err(ExpressionError::InvalidInterpolation(format!(
            "knots must be strictly increasing: {:?}",
            knots
        )));
    }
    Ok(())
}

/// Locate the segment containing `x`, clamping outside the knot range.
///
/// Returns `(segment_index, fraction)` with the fraction in `[0, 1]`, or
/// `None` when `x` lies at or beyond either end.
fn locate_segment(knots: &[f64], x: f64) -> Option<(usize, f64)> {
    let last = knots.len() - 1;
    if last == 0 || x <= knots[0] || x >= knots[last] {
        return None;
    }
    let upper = knots.partition_point(|&knot| knot <= x);
    let lower = upper - 1;
    let fraction = (x - knots[lower]) / (knots[upper] - knots[lower]);
    Some((lower, fraction))
}

fn clamped_end_value(knots: &[f64], values: &[f64], x: f64) -> f64 {
    if x <= knots[0] {
        values[0]
    } else {
        values[values.len() - 1]
    }
}

/// Piecewise-linear interpolation through the knots, constant beyond them.
///
/// Callers validate the knots with [`validate_knots`].
pub fn linear_interpolation(knots: &[f64], values: &[f64], x: f64) -> f64 {
    match locate_segment(knots, x) {
        Some((i, fraction)) => values[i] + (values[i + 1] - values[i]) * fraction,
        None => clamped_end_value(knots, values, x),
    }
}

/// Interpolation joining consecutive knots with a normalised logistic curve,
/// giving zero-slope transitions at each knot. Constant beyond the knots.
///
/// Callers validate the knots with [`validate_knots`].
pub fn sigmoidal_interpolation(knots: &[f64], values: &[f64], x: f64, curvature: f64) -> f64 {
    match locate_segment(knots, x) {
        Some((i, fraction)) => {
            let logistic = |u: f64| 1.0 / (1.0 + (-curvature * (u - 0.5)).exp());
            let low = logistic(0.0);
            let high = logistic(1.0);
            let shape = (logistic(fraction) - low) / (high - low);
            values[i] + (values[i + 1] - values[i]) * shape
        }
        None => clamped_end_value(knots, values, x),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_tanh_scaleup_midpoint_is_exact() {
        for (shape, start, end) in [(0.1, 0.0, 1.0), (3.0, 0.2, 0.9), (0.5, -4.0, 12.5), (7.0, 1.3, 1.3)] {
            let value = tanh_based_scaleup(2000.0, shape, 2000.0, start, end);
            assert_eq!(value, (start + end) / 2.0);
        }
    }

    #[test]
    fn test_tanh_scaleup_monotonic_and_asymptotic() {
        let mut previous = f64::NEG_INFINITY;
        for step in 0..=400 {
            let t = 1950.0 + step as f64 * 0.25;
            let value = tanh_based_scaleup(t, 0.3, 2000.0, 0.1, 0.8);
            assert!(value >= previous - 1e-12, "t={}", t);
            previous = value;
        }
        assert_abs_diff_eq!(tanh_based_scaleup(1800.0, 0.3, 2000.0, 0.1, 0.8), 0.1, epsilon = 1e-12);
        assert_abs_diff_eq!(tanh_based_scaleup(2200.0, 0.3, 2000.0, 0.1, 0.8), 0.8, epsilon = 1e-12);
    }

    #[test]
    fn test_tanh_scaleup_steep_shape_approaches_step() {
        assert_abs_diff_eq!(tanh_based_scaleup(2000.1, 1e4, 2000.0, 0.0, 1.0), 1.0, epsilon = 1e-12);
        assert_abs_diff_eq!(tanh_based_scaleup(1999.9, 1e4, 2000.0, 0.0, 1.0), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_linear_curve() {
        let curve = make_linear_curve(0.0, 10.0, 5.0, 25.0).unwrap();
        assert_abs_diff_eq!(curve(0.0), 5.0);
        assert_abs_diff_eq!(curve(10.0), 25.0);
        assert_abs_diff_eq!(curve(5.0), 15.0);
        assert_abs_diff_eq!(curve(-5.0), -5.0);
    }

    #[test]
    fn test_linear_curve_requires_increasing_x() {
        assert!(make_linear_curve(5.0, 5.0, 0.0, 1.0).is_err());
        assert!(make_linear_curve(6.0, 5.0, 0.0, 1.0).is_err());
    }

    #[test]
    fn test_triangle_wave() {
        let (start, duration, peak) = (2010.0, 4.0, 3.0);
        assert_abs_diff_eq!(triangle_wave(start + duration / 2.0, start, duration, peak), peak);
        assert_eq!(triangle_wave(start - 0.5, start, duration, peak), 0.0);
        assert_eq!(triangle_wave(start + duration + 0.5, start, duration, peak), 0.0);
        assert_eq!(triangle_wave(start, start, duration, peak), 0.0);
        assert_abs_diff_eq!(triangle_wave(start + 1.0, start, duration, peak), 1.5);
        assert_abs_diff_eq!(
            triangle_wave(start + 0.7, start, duration, peak),
            triangle_wave(start + duration - 0.7, start, duration, peak),
            epsilon = 1e-12
        );
    }

    #[test]
    fn test_latency_with_diabetes_bounds() {
        let (prop, rate, rr) = (0.2, 0.5, 0.3);
        let limit = rate * (1.0 - prop * (1.0 - rr));
        for t in [1800.0, 1950.0, 1980.0, 2000.0, 2100.0, 2500.0] {
            let value = latency_with_diabetes(t, prop, rate, rr);
            assert!(value <= rate);
            assert!(value >= limit - 1e-12);
        }
        assert_abs_diff_eq!(latency_with_diabetes(2500.0, prop, rate, rr), limit, epsilon = 1e-9);
        assert_abs_diff_eq!(latency_with_diabetes(1600.0, prop, rate, rr), rate, epsilon = 1e-9);
    }

    #[test]
    fn test_average_sigmoid() {
        // Symmetric band around the inflection averages to one half
        assert_abs_diff_eq!(average_sigmoid(10.0, 20.0, 15.0), 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(average_sigmoid(5.0, 5.0, 5.0), 0.5, epsilon = 1e-12);
        let value = average_sigmoid(0.0, 5.0, 15.0);
        assert!(value > 0.0 && value < 0.5);
        assert!(average_sigmoid(1000.0, 1010.0, 0.0).is_finite());
    }

    #[test]
    fn test_average_age_for_bcg() {
        let breakpoints = [0, 5, 15, 35, 50, 70];
        assert_abs_diff_eq!(average_age_for_bcg(5, &breakpoints).unwrap(), 10.0);
        assert_abs_diff_eq!(average_age_for_bcg(70, &breakpoints).unwrap(), 70.0);
        assert!(average_age_for_bcg(6, &breakpoints).is_err());
    }

    #[test]
    fn test_case_detection_ratio() {
        assert_abs_diff_eq!(case_detection_ratio(1.0, 0.5, 0.5).unwrap(), 0.5);
        assert!(case_detection_ratio(0.0, 0.0, 0.0).is_err());
    }

    #[test]
    fn test_treatment_outcomes_floor_death_at_zero() {
        let outcomes = treatment_outcomes(0.5, 0.01, 0.05, 0.9).unwrap();
        assert_eq!(outcomes.death, 0.0);
        let natural = 1.0 - (-0.5f64 * 0.05).exp();
        assert_abs_diff_eq!(outcomes.relapse * 0.5, 1.0 - 0.9 - natural, epsilon = 1e-12);
        assert_abs_diff_eq!(outcomes.success, 1.8, epsilon = 1e-12);
        assert!(treatment_outcomes(0.0, 0.1, 0.01, 0.9).is_err());
    }

    #[test]
    fn test_treatment_exit_rates_match_duration() {
        for (duration, prop_death, natural_death_rate, tsr) in
            [(0.5, 0.2, 0.008, 0.8), (0.5, 0.01, 0.05, 0.9), (2.0, 0.5, 0.06, 0.7)]
        {
            let outcomes = treatment_outcomes(duration, prop_death, natural_death_rate, tsr).unwrap();
            let natural = 1.0 - (-duration * natural_death_rate).exp();
            assert_abs_diff_eq!(
                outcomes.success + outcomes.death + outcomes.relapse + natural / duration,
                1.0 / duration,
                epsilon = 1e-12
            );
        }
        // requested deaths above natural mortality are attributed to treatment
        let outcomes = treatment_outcomes(0.5, 0.2, 0.008, 0.8).unwrap();
        let natural = 1.0 - (-0.5f64 * 0.008).exp();
        assert_abs_diff_eq!(outcomes.death, (0.04 - natural) / 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_interpolations_clamp_and_hit_knots() {
        let knots = [2000.0, 2010.0, 2020.0];
        let values = [0.0, 1.0, 0.5];
        validate_knots(&knots, values.len()).unwrap();
        let interpolators: [fn(&[f64], &[f64], f64) -> f64; 2] = [
            linear_interpolation,
            |k, v, x| sigmoidal_interpolation(k, v, x, DEFAULT_SIGMOID_CURVATURE),
        ];
        for interpolate in interpolators {
            assert_abs_diff_eq!(interpolate(&knots, &values, 1990.0), 0.0);
            assert_abs_diff_eq!(interpolate(&knots, &values, 2010.0), 1.0, epsilon = 1e-12);
            assert_abs_diff_eq!(interpolate(&knots, &values, 2030.0), 0.5);
            assert_abs_diff_eq!(interpolate(&knots, &values, 2005.0), 0.5, epsilon = 1e-12);
        }
        assert_abs_diff_eq!(linear_interpolation(&knots, &values, 2002.5), 0.25, epsilon = 1e-12);
        assert!(sigmoidal_interpolation(&knots, &values, 2002.5, DEFAULT_SIGMOID_CURVATURE) < 0.25);
    }

    #[test]
    fn test_validate_knots() {
        assert!(validate_knots(&[], 0).is_err());
        assert!(validate_knots(&[1.0, 2.0], 3).is_err());
        assert!(validate_knots(&[1.0, 1.0], 2).is_err());
        assert!(validate_knots(&[2.0, 1.0], 2).is_err());
        assert!(validate_knots(&[5.0], 1).is_ok());
    }
}
