use tbdyn_core::ModelError;

/// Errors raised while declaring or evaluating a calibration
#[derive(Debug, thiserror::Error)]
pub enum CalibrationError {
    /// A prior kind with no known distribution
    #[error("Unsupported prior type: {0}")]
    UnsupportedPrior(String),
    #[error("Invalid prior '{name}': {message}")]
    InvalidPrior { name: String, message: String },
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("Optimization failed: {0}")]
    Optimization(String),
}

impl CalibrationError {
    pub(crate) fn invalid_prior(name: &str, message: impl Into<String>) -> Self {
        Self::InvalidPrior {
            name: name.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T, E = CalibrationError> = std::result::Result<T, E>;
