//! Prior distributions over calibrated parameters

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use statrs::distribution::{Beta, Continuous, ContinuousCDF, Gamma, Normal, Uniform};

use crate::error::{CalibrationError, Result};

/// Prior over a single named parameter
#[derive(Debug, Clone, PartialEq)]
pub enum Prior {
    Uniform {
        name: String,
        low: f64,
        high: f64,
    },
    /// Normal distribution restricted to `[low, high]`
    TruncatedNormal {
        name: String,
        mean: f64,
        stdev: f64,
        low: f64,
        high: f64,
    },
    Gamma {
        name: String,
        shape: f64,
        scale: f64,
    },
    Beta {
        name: String,
        alpha: f64,
        beta: f64,
    },
}

impl Prior {
    pub fn uniform(name: impl Into<String>, (low, high): (f64, f64)) -> Result<Self> {
        let name = name.into();
        check_range(&name, low, high)?;
        Ok(Self::Uniform { name, low, high })
    }

    pub fn truncated_normal(
        name: impl Into<String>,
        mean: f64,
        stdev: f64,
        (low, high): (f64, f64),
    ) -> Result<Self> {
        let name = name.into();
        check_range(&name, low, high)?;
        check_positive(&name, "standard deviation", stdev)?;
        if !mean.is_finite() {
            return Err(CalibrationError::invalid_prior(&name, "mean must be finite"));
        }
        Ok(Self::TruncatedNormal {
            name,
            mean,
            stdev,
            low,
            high,
        })
    }

    pub fn gamma(name: impl Into<String>, shape: f64, scale: f64) -> Result<Self> {
        let name = name.into();
        check_positive(&name, "shape", shape)?;
        check_positive(&name, "scale", scale)?;
        Ok(Self::Gamma { name, shape, scale })
    }

    /// Gamma prior with the given mode and standard deviation.
    ///
    /// Solves `mode = (k - 1) * theta` and `sd^2 = k * theta^2` for the scale
    /// `theta` and shape `k`.
    pub fn gamma_from_mode(name: impl Into<String>, mode: f64, sd: f64) -> Result<Self> {
        let name = name.into();
        check_positive(&name, "mode", mode)?;
        check_positive(&name, "standard deviation", sd)?;
        let scale = (-mode + (mode * mode + 4.0 * sd * sd).sqrt()) / 2.0;
        let shape = 1.0 + mode / scale;
        Self::gamma(name, shape, scale)
    }

    pub fn beta(name: impl Into<String>, alpha: f64, beta: f64) -> Result<Self> {
        let name = name.into();
        check_positive(&name, "alpha", alpha)?;
        check_positive(&name, "beta", beta)?;
        Ok(Self::Beta { name, alpha, beta })
    }

    pub fn name(&self) -> &str {
        match self {
            Self::Uniform { name, .. }
            | Self::TruncatedNormal { name, .. }
            | Self::Gamma { name, .. }
            | Self::Beta { name, .. } => name,
        }
    }

    /// Support of the prior, `None` when unbounded above
    pub fn bounds(&self) -> Option<(f64, f64)> {
        match self {
            Self::Uniform { low, high, .. } | Self::TruncatedNormal { low, high, .. } => Some((*low, *high)),
            Self::Gamma { .. } => None,
            Self::Beta { .. } => Some((0.0, 1.0)),
        }
    }

    /// A point inside the support used to start optimisers
    pub fn initial_value(&self) -> f64 {
        match self {
            Self::Uniform { low, high, .. } => (low + high) / 2.0,
            Self::TruncatedNormal { mean, low, high, .. } => mean.clamp(*low, *high),
            Self::Gamma { shape, scale, .. } if *shape >= 1.0 => (shape - 1.0) * scale,
            Self::Gamma { shape, scale, .. } => shape * scale,
            Self::Beta { alpha, beta, .. } => alpha / (alpha + beta),
        }
    }

    /// Log density at `x`, negative infinity outside the support
    pub fn ln_pdf(&self, x: f64) -> Result<f64> {
        let density = match self {
            Self::Uniform { name, low, high } => {
                let dist = Uniform::new(*low, *high).map_err(|e| distribution_error(name, e))?;
                if x < *low || x > *high {
                    f64::NEG_INFINITY
                } else {
                    dist.ln_pdf(x)
                }
            }
            Self::TruncatedNormal {
                name,
                mean,
                stdev,
                low,
                high,
            } => {
                if x < *low || x > *high {
                    f64::NEG_INFINITY
                } else {
                    let dist = Normal::new(*mean, *stdev).map_err(|e| distribution_error(name, e))?;
                    let mass = dist.cdf(*high) - dist.cdf(*low);
                    if mass <= 0.0 {
                        return Err(CalibrationError::invalid_prior(
                            name,
                            "truncation range holds no probability mass",
                        ));
                    }
                    dist.ln_pdf(x) - mass.ln()
                }
            }
            Self::Gamma { name, shape, scale } => {
                if x <= 0.0 {
                    f64::NEG_INFINITY
                } else {
                    let dist = Gamma::new(*shape, 1.0 / scale).map_err(|e| distribution_error(name, e))?;
                    dist.ln_pdf(x)
                }
            }
            Self::Beta { name, alpha, beta } => {
                if x <= 0.0 || x >= 1.0 {
                    f64::NEG_INFINITY
                } else {
                    let dist = Beta::new(*alpha, *beta).map_err(|e| distribution_error(name, e))?;
                    dist.ln_pdf(x)
                }
            }
        };
        Ok(density)
    }

    /// Distribution in the parameterisation used by inference engines,
    /// with its bounds where it has any
    pub fn to_distribution(&self) -> (Distribution, Option<(f64, f64)>) {
        let distribution = match self {
            Self::Uniform { low, high, .. } => Distribution::Uniform {
                low: *low,
                high: *high,
            },
            Self::TruncatedNormal {
                mean,
                stdev,
                low,
                high,
                ..
            } => Distribution::TruncatedNormal {
                loc: *mean,
                scale: *stdev,
                low: *low,
                high: *high,
            },
            Self::Gamma { shape, scale, .. } => Distribution::Gamma {
                concentration: *shape,
                rate: 1.0 / scale,
            },
            Self::Beta { alpha, beta, .. } => Distribution::Beta {
                concentration1: *alpha,
                concentration0: *beta,
            },
        };
        (distribution, self.bounds())
    }
}

/// Engine-side distribution parameterisation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Distribution {
    Uniform {
        low: f64,
        high: f64,
    },
    TruncatedNormal {
        loc: f64,
        scale: f64,
        low: f64,
        high: f64,
    },
    Gamma {
        concentration: f64,
        rate: f64,
    },
    Beta {
        concentration1: f64,
        concentration0: f64,
    },
}

/// Map each prior's name to its engine-side distribution
pub fn convert_all_priors(priors: &[Prior]) -> BTreeMap<String, Distribution> {
    priors
        .iter()
        .map(|prior| (prior.name().to_string(), prior.to_distribution().0))
        .collect()
}

/// A prior as declared in configuration.
///
/// ```json
/// {"name": "contact_rate", "distribution": "uniform", "low": 0.001, "high": 0.05}
/// {"name": "progression_multiplier", "distribution": "gamma", "mode": 1.0, "sd": 2.0}
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorSpec {
    pub name: String,
    pub distribution: String,
    #[serde(flatten)]
    pub hyperparameters: BTreeMap<String, f64>,
}

impl PriorSpec {
    fn get(&self, key: &str) -> Result<f64> {
        self.hyperparameters.get(key).copied().ok_or_else(|| {
            CalibrationError::invalid_prior(
                &self.name,
                format!("{} prior requires '{}'", self.distribution, key),
            )
        })
    }
}

impl TryFrom<PriorSpec> for Prior {
    type Error = CalibrationError;

    fn try_from(spec: PriorSpec) -> Result<Self> {
        match spec.distribution.as_str() {
            "uniform" => Prior::uniform(spec.name.clone(), (spec.get("low")?, spec.get("high")?)),
            "truncated_normal" | "trunc_normal" => Prior::truncated_normal(
                spec.name.clone(),
                spec.get("mean")?,
                spec.get("stdev")?,
                (spec.get("low")?, spec.get("high")?),
            ),
            "gamma" if spec.hyperparameters.contains_key("mode") => {
                Prior::gamma_from_mode(spec.name.clone(), spec.get("mode")?, spec.get("sd")?)
            }
            "gamma" => Prior::gamma(spec.name.clone(), spec.get("shape")?, spec.get("scale")?),
            "beta" => Prior::beta(spec.name.clone(), spec.get("alpha")?, spec.get("beta")?),
            other => Err(CalibrationError::UnsupportedPrior(other.to_string())),
        }
    }
}

fn check_range(name: &str, low: f64, high: f64) -> Result<()> {
    if !low.is_finite() || !high.is_finite() || low >= high {
        return Err(CalibrationError::invalid_prior(
            name,
            format!("range ({}, {}) must be finite with low < high", low, high),
        ));
    }
    Ok(())
}

fn check_positive(name: &str, what: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(CalibrationError::invalid_prior(
            name,
            format!("{} must be positive, got {}", what, value),
        ));
    }
    Ok(())
}

fn distribution_error(name: &str, error: impl std::fmt::Display) -> CalibrationError {
    CalibrationError::invalid_prior(name, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_conversion_per_kind() {
        let (dist, bounds) = Prior::uniform("contact_rate", (0.001, 0.05)).unwrap().to_distribution();
        assert_eq!(dist, Distribution::Uniform { low: 0.001, high: 0.05 });
        assert_eq!(bounds, Some((0.001, 0.05)));

        let prior = Prior::truncated_normal("smear_positive_death_rate", 0.389, 0.0276, (0.335, 0.449)).unwrap();
        let (dist, bounds) = prior.to_distribution();
        assert_eq!(
            dist,
            Distribution::TruncatedNormal {
                loc: 0.389,
                scale: 0.0276,
                low: 0.335,
                high: 0.449
            }
        );
        assert_eq!(bounds, Some((0.335, 0.449)));

        let (dist, bounds) = Prior::gamma("x", 2.0, 0.5).unwrap().to_distribution();
        assert_eq!(dist, Distribution::Gamma { concentration: 2.0, rate: 2.0 });
        assert_eq!(bounds, None);

        let (dist, bounds) = Prior::beta("rr_infection_latent", 3.0, 8.0).unwrap().to_distribution();
        assert_eq!(
            dist,
            Distribution::Beta {
                concentration1: 3.0,
                concentration0: 8.0
            }
        );
        assert_eq!(bounds, Some((0.0, 1.0)));
    }

    #[test]
    fn test_gamma_from_mode_recovers_mode_and_sd() {
        for (mode, sd) in [(1.0, 2.0), (1.0, 5.0), (0.3, 0.1), (10.0, 3.0)] {
            let Prior::Gamma { shape, scale, .. } = Prior::gamma_from_mode("p", mode, sd).unwrap() else {
                panic!("expected gamma prior");
            };
            assert_relative_eq!((shape - 1.0) * scale, mode, max_relative = 1e-10);
            assert_relative_eq!((shape * scale * scale).sqrt(), sd, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_ln_pdf() {
        let uniform = Prior::uniform("u", (0.0, 4.0)).unwrap();
        assert_relative_eq!(uniform.ln_pdf(1.0).unwrap(), (0.25f64).ln());
        assert_eq!(uniform.ln_pdf(5.0).unwrap(), f64::NEG_INFINITY);

        // Symmetric truncation keeps half the mass either side of the mean
        let trunc = Prior::truncated_normal("n", 0.0, 1.0, (-1.0, 1.0)).unwrap();
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mass = normal.cdf(1.0) - normal.cdf(-1.0);
        assert_relative_eq!(trunc.ln_pdf(0.5).unwrap(), normal.ln_pdf(0.5) - mass.ln(), epsilon = 1e-12);
        assert_eq!(trunc.ln_pdf(1.5).unwrap(), f64::NEG_INFINITY);

        let gamma = Prior::gamma("g", 1.0, 2.0).unwrap();
        assert_relative_eq!(gamma.ln_pdf(1.0).unwrap(), (0.5f64).ln() - 0.5, epsilon = 1e-12);
        assert_eq!(gamma.ln_pdf(-1.0).unwrap(), f64::NEG_INFINITY);

        let beta = Prior::beta("b", 2.0, 2.0).unwrap();
        assert_relative_eq!(beta.ln_pdf(0.5).unwrap(), (1.5f64).ln(), epsilon = 1e-12);
        assert_eq!(beta.ln_pdf(1.0).unwrap(), f64::NEG_INFINITY);
    }

    #[test]
    fn test_invalid_hyperparameters() {
        assert!(Prior::uniform("u", (1.0, 1.0)).is_err());
        assert!(Prior::truncated_normal("n", 0.0, 0.0, (-1.0, 1.0)).is_err());
        assert!(Prior::gamma("g", -1.0, 1.0).is_err());
        assert!(Prior::beta("b", 1.0, f64::NAN).is_err());
    }

    #[test]
    fn test_prior_spec() {
        let specs: Vec<PriorSpec> = serde_json::from_str(
            r#"[
                {"name": "contact_rate", "distribution": "uniform", "low": 0.001, "high": 0.05},
                {"name": "progression_multiplier", "distribution": "gamma", "mode": 1.0, "sd": 2.0},
                {"name": "rr_infection_recovered", "distribution": "beta", "alpha": 2.0, "beta": 2.0},
                {"name": "screening_inflection_time", "distribution": "trunc_normal",
                 "mean": 2000, "stdev": 3.5, "low": 1990, "high": 2010}
            ]"#,
        )
        .unwrap();
        let priors: Vec<Prior> = specs.into_iter().map(|s| Prior::try_from(s).unwrap()).collect();
        assert_eq!(priors[0].name(), "contact_rate");
        assert!(matches!(priors[1], Prior::Gamma { .. }));
        assert_eq!(convert_all_priors(&priors).len(), 4);

        let spec: PriorSpec =
            serde_json::from_str(r#"{"name": "x", "distribution": "lognormal", "mu": 0.0}"#).unwrap();
        assert!(matches!(Prior::try_from(spec), Err(CalibrationError::UnsupportedPrior(kind)) if kind == "lognormal"));

        let spec: PriorSpec = serde_json::from_str(r#"{"name": "x", "distribution": "uniform", "low": 0.0}"#).unwrap();
        assert!(matches!(Prior::try_from(spec), Err(CalibrationError::InvalidPrior { .. })));
    }
}
