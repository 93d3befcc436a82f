/// Errors that can occur while building or evaluating an expression
#[derive(Debug, thiserror::Error)]
pub enum ExpressionError {
    #[error("Parse error: {0}")]
    Parse(#[from] evalexpr::EvalexprError),
    #[error("Invalid expression: {0}")]
    InvalidExpression(String),
    #[error("Parameter not found: {0}")]
    ParameterNotFound(String),
    #[error("Output not available: {0}")]
    OutputNotFound(String),
    #[error("Computed value not available: {0}")]
    ComputedValueNotFound(String),
    #[error("Unknown function: {0}")]
    UnknownFunction(String),
    #[error("Function '{function}' expects {expected} arguments, got {actual}")]
    Arity {
        function: String,
        expected: String,
        actual: usize,
    },
    #[error("Division by zero in {0}")]
    DivisionByZero(String),
    #[error("Non-finite result in {0}")]
    NonFinite(String),
    #[error("Invalid interpolation: {0}")]
    InvalidInterpolation(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}
