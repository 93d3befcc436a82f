use std::collections::BTreeMap;

use super::compartment::StrataFilter;
use crate::expression::Expr;

/// Per-stratum change to a flow rate or to infectiousness
#[derive(Clone, Debug, PartialEq)]
pub enum Adjustment {
    /// Scale the existing rate
    Multiply(Expr),
    /// Replace the rate entirely
    Overwrite(Expr),
}

impl Adjustment {
    pub fn multiply(value: impl Into<Expr>) -> Self {
        Self::Multiply(value.into())
    }

    pub fn overwrite(value: impl Into<Expr>) -> Self {
        Self::Overwrite(value.into())
    }

    /// Apply this adjustment to a rate
    pub fn apply(&self, rate: Expr) -> Expr {
        match self {
            Self::Multiply(factor) => rate * factor.clone(),
            Self::Overwrite(value) => value.clone(),
        }
    }

    pub fn value(&self) -> &Expr {
        match self {
            Self::Multiply(value) | Self::Overwrite(value) => value,
        }
    }
}

/// Adjustments to one flow, keyed by stratum, optionally restricted to
/// source compartments in given strata of earlier stratifications
#[derive(Clone, Debug)]
pub struct FlowAdjustments {
    pub flow_name: String,
    pub adjustments: BTreeMap<String, Adjustment>,
    pub source_strata: StrataFilter,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply() {
        let rate = Expr::parameter("detection_rate");
        assert_eq!(
            Adjustment::multiply(1.0).apply(rate.clone()),
            Expr::parameter("detection_rate")
        );
        assert_eq!(
            Adjustment::overwrite(Expr::parameter("smear_negative_death_rate")).apply(rate.clone()),
            Expr::parameter("smear_negative_death_rate")
        );
        assert_eq!(
            Adjustment::multiply(0.5).apply(rate),
            Expr::parameter("detection_rate") * 0.5
        );
    }
}
