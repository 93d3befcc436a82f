use crate::expression::ExpressionError;

/// Errors raised while assembling a model or evaluating its outputs
#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    /// Invalid structure or parameters supplied at assembly time
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Unknown compartment: {0}")]
    UnknownCompartment(String),
    #[error("Unknown flow: {0}")]
    UnknownFlow(String),
    #[error("Unknown output: {0}")]
    UnknownOutput(String),
    #[error("Unknown stratification: {0}")]
    UnknownStratification(String),
    #[error("Unknown stratum '{stratum}' for stratification '{stratification}'")]
    UnknownStratum {
        stratification: String,
        stratum: String,
    },
    #[error("Duplicate name: {0}")]
    DuplicateName(String),
    #[error("Expression error: {0}")]
    Expression(#[from] ExpressionError),
    #[error("Simulation failed: {0}")]
    Simulation(String),
}

impl ModelError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}

pub type Result<T, E = ModelError> = std::result::Result<T, E>;
