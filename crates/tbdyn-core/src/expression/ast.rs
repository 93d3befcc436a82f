//! Expression tree for time-varying parameters and derived outputs

use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

use super::context::EvaluationContext;
use super::error::ExpressionError;
use crate::functions;

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOperator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOperator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
        }
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOperator {
    Neg,
}

/// Number of arguments a function accepts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    fn accepts(self, n: usize) -> bool {
        match self {
            Self::Exact(expected) => n == expected,
            Self::AtLeast(minimum) => n >= minimum,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{}", n),
            Self::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

/// Named functions callable from expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    Exp,
    Ln,
    Sqrt,
    Abs,
    Tanh,
    Min,
    Max,
    /// `(t, shape, inflection_time, start_asymptote, end_asymptote)`
    TanhBasedScaleup,
    /// `(t, start, duration, peak)`
    TriangleWave,
    /// `(t, prop_diabetes, previous_rate, rr_progression_diabetes)`
    LatencyWithDiabetes,
    /// `(low, upper, inflection)`
    AverageSigmoid,
    /// `(coverage_percent, vaccinated_multiplier)`
    BcgMultiplier,
    /// `(detection_rate, death_rate, self_recovery_rate)`
    CaseDetectionRatio,
    /// `(duration, prop_death_among_non_success, natural_death_rate, tsr)`
    TreatmentSuccessRate,
    /// Same arguments as `TreatmentSuccessRate`
    TreatmentDeathRate,
    /// Same arguments as `TreatmentSuccessRate`
    RelapseRate,
    /// `(part, whole)`; zero when the whole is empty
    Proportion,
}

impl Function {
    const ALL: [Function; 17] = [
        Self::Exp,
        Self::Ln,
        Self::Sqrt,
        Self::Abs,
        Self::Tanh,
        Self::Min,
        Self::Max,
        Self::TanhBasedScaleup,
        Self::TriangleWave,
        Self::LatencyWithDiabetes,
        Self::AverageSigmoid,
        Self::BcgMultiplier,
        Self::CaseDetectionRatio,
        Self::TreatmentSuccessRate,
        Self::TreatmentDeathRate,
        Self::RelapseRate,
        Self::Proportion,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Exp => "exp",
            Self::Ln => "ln",
            Self::Sqrt => "sqrt",
            Self::Abs => "abs",
            Self::Tanh => "tanh",
            Self::Min => "min",
            Self::Max => "max",
            Self::TanhBasedScaleup => "tanh_based_scaleup",
            Self::TriangleWave => "triangle_wave",
            Self::LatencyWithDiabetes => "latency_with_diabetes",
            Self::AverageSigmoid => "average_sigmoid",
            Self::BcgMultiplier => "bcg_multiplier",
            Self::CaseDetectionRatio => "case_detection_ratio",
            Self::TreatmentSuccessRate => "treatment_success_rate",
            Self::TreatmentDeathRate => "treatment_death_rate",
            Self::RelapseRate => "relapse_rate",
            Self::Proportion => "proportion",
        }
    }

    /// Look up a function by the name used in formulas.
    ///
    /// `log` is accepted as the natural logarithm and a leading `math::`
    /// prefix is ignored.
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.strip_prefix("math::").unwrap_or(name);
        if name == "log" {
            return Some(Self::Ln);
        }
        Self::ALL.iter().copied().find(|function| function.name() == name)
    }

    pub fn arity(self) -> Arity {
        match self {
            Self::Exp | Self::Ln | Self::Sqrt | Self::Abs | Self::Tanh => Arity::Exact(1),
            Self::Min | Self::Max => Arity::AtLeast(1),
            Self::BcgMultiplier | Self::Proportion => Arity::Exact(2),
            Self::AverageSigmoid | Self::CaseDetectionRatio => Arity::Exact(3),
            Self::TriangleWave
            | Self::LatencyWithDiabetes
            | Self::TreatmentSuccessRate
            | Self::TreatmentDeathRate
            | Self::RelapseRate => Arity::Exact(4),
            Self::TanhBasedScaleup => Arity::Exact(5),
        }
    }

    /// Check an argument count against this function's arity
    pub fn check_arity(self, n_args: usize) -> Result<(), ExpressionError> {
        if self.arity().accepts(n_args) {
            Ok(())
        } else {
            Err(ExpressionError::Arity {
                function: self.name().to_string(),
                expected: self.arity().to_string(),
                actual: n_args,
            })
        }
    }

    /// Apply the function to already evaluated arguments
    pub fn apply(self, args: &[f64]) -> Result<f64, ExpressionError> {
        self.check_arity(args.len())?;
        let value = match self {
            Self::Exp => args[0].exp(),
            Self::Ln => {
                if args[0] <= 0.0 {
                    return Err(ExpressionError::InvalidArgument(format!(
                        "ln requires a positive argument, got {}",
                        args[0]
                    )));
                }
                args[0].ln()
            }
            Self::Sqrt => {
                if args[0] < 0.0 {
                    return Err(ExpressionError::InvalidArgument(format!(
                        "sqrt requires a non-negative argument, got {}",
                        args[0]
                    )));
                }
                args[0].sqrt()
            }
            Self::Abs => args[0].abs(),
            Self::Tanh => args[0].tanh(),
            Self::Min => args.iter().copied().fold(f64::INFINITY, f64::min),
            Self::Max => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Self::TanhBasedScaleup => {
                functions::tanh_based_scaleup(args[0], args[1], args[2], args[3], args[4])
            }
            Self::TriangleWave => functions::triangle_wave(args[0], args[1], args[2], args[3]),
            Self::LatencyWithDiabetes => {
                functions::latency_with_diabetes(args[0], args[1], args[2], args[3])
            }
            Self::AverageSigmoid => functions::average_sigmoid(args[0], args[1], args[2]),
            Self::BcgMultiplier => functions::bcg_multiplier(args[0], args[1]),
            Self::Proportion => {
                if args[1] == 0.0 {
                    0.0
                } else {
                    args[0] / args[1]
                }
            }
            Self::CaseDetectionRatio => {
                functions::case_detection_ratio(args[0], args[1], args[2])?
            }
            Self::TreatmentSuccessRate | Self::TreatmentDeathRate | Self::RelapseRate => {
                let outcomes = functions::treatment_outcomes(args[0], args[1], args[2], args[3])?;
                match self {
                    Self::TreatmentSuccessRate => outcomes.success,
                    Self::TreatmentDeathRate => outcomes.death,
                    _ => outcomes.relapse,
                }
            }
        };
        Ok(value)
    }
}

/// Interpolation scheme between knot points
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterpolationKind {
    Linear,
    Sigmoidal { curvature: f64 },
}

/// A symbolic expression evaluated lazily against an [`EvaluationContext`].
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Constant value: `3.14`
    Constant(f64),
    /// Named model parameter: `contact_rate`
    Parameter(String),
    /// Model time
    Time,
    /// Value of a previously requested derived output
    Output(String),
    /// Value of a named computed value
    ComputedValue(String),
    BinaryOp {
        op: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnaryOp {
        op: UnaryOperator,
        operand: Box<Expr>,
    },
    FunctionCall {
        function: Function,
        args: Vec<Expr>,
    },
    /// Interpolation through `(knots[i], values[i])` evaluated at `x`
    Interpolation {
        kind: InterpolationKind,
        knots: Vec<f64>,
        values: Vec<Expr>,
        x: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Self::Constant(value)
    }

    pub fn parameter(name: impl Into<String>) -> Self {
        Self::Parameter(name.into())
    }

    pub fn time() -> Self {
        Self::Time
    }

    pub fn output(name: impl Into<String>) -> Self {
        Self::Output(name.into())
    }

    pub fn computed_value(name: impl Into<String>) -> Self {
        Self::ComputedValue(name.into())
    }

    pub fn binary(op: BinaryOperator, left: Expr, right: Expr) -> Self {
        Self::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Call a named function, checking the argument count
    pub fn call(function: Function, args: Vec<Expr>) -> Result<Self, ExpressionError> {
        function.check_arity(args.len())?;
        Ok(Self::FunctionCall { function, args })
    }

    /// `tanh_based_scaleup` evaluated at model time
    pub fn tanh_scaleup(shape: Expr, inflection_time: Expr, start: Expr, end: Expr) -> Self {
        Self::FunctionCall {
            function: Function::TanhBasedScaleup,
            args: vec![Self::Time, shape, inflection_time, start, end],
        }
    }

    /// Piecewise-linear interpolation over model time
    pub fn linear_interpolation(
        knots: Vec<f64>,
        values: Vec<Expr>,
    ) -> Result<Self, ExpressionError> {
        Self::interpolation(InterpolationKind::Linear, knots, values, Self::Time)
    }

    /// Sigmoidal interpolation over model time with the default curvature
    pub fn sigmoidal_interpolation(
        knots: Vec<f64>,
        values: Vec<Expr>,
    ) -> Result<Self, ExpressionError> {
        Self::interpolation(
            InterpolationKind::Sigmoidal {
                curvature: functions::DEFAULT_SIGMOID_CURVATURE,
            },
            knots,
            values,
            Self::Time,
        )
    }

    pub fn interpolation(
        kind: InterpolationKind,
        knots: Vec<f64>,
        values: Vec<Expr>,
        x: Expr,
    ) -> Result<Self, ExpressionError> {
        functions::validate_knots(&knots, values.len())?;
        Ok(Self::Interpolation {
            kind,
            knots,
            values,
            x: Box::new(x),
        })
    }

    /// Returns the value if this expression is a constant
    pub fn as_constant(&self) -> Option<f64> {
        match self {
            Self::Constant(value) => Some(*value),
            _ => None,
        }
    }

    /// Evaluate the expression with the given context
    pub fn evaluate(&self, context: &EvaluationContext) -> Result<f64, ExpressionError> {
        match self {
            Self::Constant(value) => Ok(*value),
            Self::Parameter(name) => context
                .get_parameter(name)
                .ok_or_else(|| ExpressionError::ParameterNotFound(name.clone())),
            Self::Time => Ok(context.time()),
            Self::Output(name) => context
                .get_output(name)
                .ok_or_else(|| ExpressionError::OutputNotFound(name.clone())),
            Self::ComputedValue(name) => context
                .get_computed_value(name)
                .ok_or_else(|| ExpressionError::ComputedValueNotFound(name.clone())),
            Self::BinaryOp { op, left, right } => {
                let lhs = left.evaluate(context)?;
                let rhs = right.evaluate(context)?;
                let value = match op {
                    BinaryOperator::Add => lhs + rhs,
                    BinaryOperator::Sub => lhs - rhs,
                    BinaryOperator::Mul => lhs * rhs,
                    BinaryOperator::Div => {
                        if rhs == 0.0 {
                            return Err(ExpressionError::DivisionByZero(self.to_string()));
                        }
                        lhs / rhs
                    }
                    BinaryOperator::Pow => lhs.powf(rhs),
                };
                if value.is_finite() {
                    Ok(value)
                } else {
                    Err(ExpressionError::NonFinite(self.to_string()))
                }
            }
            Self::UnaryOp {
                op: UnaryOperator::Neg,
                operand,
            } => Ok(-operand.evaluate(context)?),
            Self::FunctionCall { function, args } => {
                let values = args
                    .iter()
                    .map(|arg| arg.evaluate(context))
                    .collect::<Result<Vec<_>, _>>()?;
                function.apply(&values)
            }
            Self::Interpolation {
                kind,
                knots,
                values,
                x,
            } => {
                let x = x.evaluate(context)?;
                let values = values
                    .iter()
                    .map(|value| value.evaluate(context))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(match kind {
                    InterpolationKind::Linear => functions::linear_interpolation(knots, &values, x),
                    InterpolationKind::Sigmoidal { curvature } => {
                        functions::sigmoidal_interpolation(knots, &values, x, *curvature)
                    }
                })
            }
        }
    }

    /// Visit this expression and all of its sub-expressions
    fn visit<'a>(&'a self, visitor: &mut impl FnMut(&'a Expr)) {
        visitor(self);
        match self {
            Self::BinaryOp { left, right, .. } => {
                left.visit(visitor);
                right.visit(visitor);
            }
            Self::UnaryOp { operand, .. } => operand.visit(visitor),
            Self::FunctionCall { args, .. } => args.iter().for_each(|arg| arg.visit(visitor)),
            Self::Interpolation { values, x, .. } => {
                values.iter().for_each(|value| value.visit(visitor));
                x.visit(visitor);
            }
            Self::Constant(_)
            | Self::Parameter(_)
            | Self::Time
            | Self::Output(_)
            | Self::ComputedValue(_) => {}
        }
    }

    /// Names of all parameters referenced by this expression
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Self::Parameter(name) = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Names of all derived outputs referenced by this expression
    pub fn outputs(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Self::Output(name) = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Names of all computed values referenced by this expression
    pub fn computed_values(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        self.visit(&mut |expr| {
            if let Self::ComputedValue(name) = expr {
                names.insert(name.clone());
            }
        });
        names
    }

    /// Whether the expression reads model time anywhere
    pub fn depends_on_time(&self) -> bool {
        let mut found = false;
        self.visit(&mut |expr| found |= matches!(expr, Self::Time));
        found
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(value) => write!(f, "{}", value),
            Self::Parameter(name) => write!(f, "{}", name),
            Self::Time => write!(f, "t"),
            Self::Output(name) => write!(f, "output({})", name),
            Self::ComputedValue(name) => write!(f, "computed({})", name),
            Self::BinaryOp { op, left, right } => {
                write!(f, "({} {} {})", left, op.symbol(), right)
            }
            Self::UnaryOp { operand, .. } => write!(f, "-{}", operand),
            Self::FunctionCall { function, args } => {
                write!(f, "{}(", function.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            Self::Interpolation { kind, knots, x, .. } => {
                let name = match kind {
                    InterpolationKind::Linear => "linear_interp",
                    InterpolationKind::Sigmoidal { .. } => "sigmoidal_interp",
                };
                write!(f, "{}({:?}, {})", name, knots, x)
            }
        }
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::Constant(value)
    }
}

impl Add for Expr {
    type Output = Expr;

    fn add(self, rhs: Expr) -> Expr {
        match (self.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Expr::Constant(a + b),
            (Some(a), None) if a == 0.0 => rhs,
            (None, Some(b)) if b == 0.0 => self,
            _ => Expr::binary(BinaryOperator::Add, self, rhs),
        }
    }
}

impl Sub for Expr {
    type Output = Expr;

    fn sub(self, rhs: Expr) -> Expr {
        match (self.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Expr::Constant(a - b),
            (None, Some(b)) if b == 0.0 => self,
            _ => Expr::binary(BinaryOperator::Sub, self, rhs),
        }
    }
}

impl Mul for Expr {
    type Output = Expr;

    fn mul(self, rhs: Expr) -> Expr {
        match (self.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) => Expr::Constant(a * b),
            (Some(a), None) if a == 1.0 => rhs,
            (None, Some(b)) if b == 1.0 => self,
            _ => Expr::binary(BinaryOperator::Mul, self, rhs),
        }
    }
}

impl Div for Expr {
    type Output = Expr;

    // Constant folding skips zero denominators so evaluation reports them.
    fn div(self, rhs: Expr) -> Expr {
        match (self.as_constant(), rhs.as_constant()) {
            (Some(a), Some(b)) if b != 0.0 => Expr::Constant(a / b),
            (None, Some(b)) if b == 1.0 => self,
            _ => Expr::binary(BinaryOperator::Div, self, rhs),
        }
    }
}

impl Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        match self {
            Expr::Constant(value) => Expr::Constant(-value),
            other => Expr::UnaryOp {
                op: UnaryOperator::Neg,
                operand: Box::new(other),
            },
        }
    }
}

macro_rules! impl_scalar_ops {
    ($($trait:ident :: $method:ident),*) => {
        $(
            impl $trait<f64> for Expr {
                type Output = Expr;

                fn $method(self, rhs: f64) -> Expr {
                    $trait::$method(self, Expr::Constant(rhs))
                }
            }

            impl $trait<Expr> for f64 {
                type Output = Expr;

                fn $method(self, rhs: Expr) -> Expr {
                    $trait::$method(Expr::Constant(self), rhs)
                }
            }
        )*
    };
}

impl_scalar_ops!(Add::add, Sub::sub, Mul::mul, Div::div);
