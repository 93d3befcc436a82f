//! # Symbolic expressions
//!
//! Rates, multipliers and derived outputs are declared as expression trees and
//! evaluated later by whoever consumes the model. An expression never holds a
//! parameter value, so the same model can be evaluated under any number of
//! parameter sets.
//!
//! ## Leaves
//!
//! - `Constant(x)` - a fixed number
//! - `Parameter(name)` - a model parameter, resolved from the context
//! - `Time` - model time
//! - `Output(name)` / `ComputedValue(name)` - values produced earlier in the
//!   same output evaluation pass
//!
//! ## Composite nodes
//!
//! - Arithmetic: `+`, `-`, `*`, `/`, `^`, unary `-`
//! - Named functions (see [`Function`]): `exp`, `ln`, `sqrt`, `abs`, `tanh`,
//!   `min`, `max`, `tanh_based_scaleup`, `triangle_wave`,
//!   `latency_with_diabetes`, `average_sigmoid`, `bcg_multiplier`,
//!   `case_detection_ratio`, `treatment_success_rate`,
//!   `treatment_death_rate`, `relapse_rate`, `proportion`
//! - Linear and sigmoidal interpolation through knot points
//!
//! ## Example
//! ```rust
//! use tbdyn_core::{EvaluationContext, Expr};
//!
//! let expr = Expr::parse("acf_sensitivity * tanh_based_scaleup(t, 0.5, 2015, 0, 1)").unwrap();
//! let mut context = EvaluationContext::new();
//! context.set_parameter("acf_sensitivity", 0.8);
//! context.set_time(2015.0);
//! assert_eq!(expr.evaluate(&context).unwrap(), 0.4);
//! ```

mod ast;
mod context;
mod error;
mod parser;

pub use ast::{Arity, BinaryOperator, Expr, Function, InterpolationKind, UnaryOperator};
pub use context::EvaluationContext;
pub use error::ExpressionError;

use serde::{Deserialize, Serialize};

impl Expr {
    /// Parse a formula such as `"contact_rate * rr_infection_latent"`
    pub fn parse(formula: &str) -> Result<Self, ExpressionError> {
        parser::parse_expression(formula)
    }
}

/// A rate or multiplier as written in configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RateExpression {
    /// Constant value
    Constant(f64),
    /// Parameter name or formula
    Formula(String),
}

impl RateExpression {
    /// Convert into an expression tree.
    ///
    /// - Numeric values become `Constant`
    /// - Single names become `Parameter` (e.g., "acf_sensitivity")
    /// - Anything else is parsed as a formula (e.g., "0.5 * acf_sensitivity")
    pub fn to_expr(&self) -> Result<Expr, ExpressionError> {
        match self {
            Self::Constant(value) => Ok(Expr::Constant(*value)),
            Self::Formula(formula) => {
                if let Ok(value) = formula.trim().parse::<f64>() {
                    return Ok(Expr::Constant(value));
                }
                Expr::parse(formula)
            }
        }
    }
}

impl From<f64> for RateExpression {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_expression_forms() {
        let from_json: Vec<RateExpression> =
            serde_json::from_str(r#"[0.4, "1.5", "acf_sensitivity", "2 * beta"]"#).unwrap();
        let exprs: Vec<Expr> = from_json.iter().map(|r| r.to_expr().unwrap()).collect();
        assert_eq!(exprs[0], Expr::Constant(0.4));
        assert_eq!(exprs[1], Expr::Constant(1.5));
        assert_eq!(exprs[2], Expr::parameter("acf_sensitivity"));
        assert!(matches!(exprs[3], Expr::BinaryOp { .. }));
    }
}
