use tbdyn_calibration::CalibrationError;
use tbdyn_core::ModelError;

/// Errors raised while loading parameters or wiring the TB model for calibration
#[derive(Debug, thiserror::Error)]
pub enum TbError {
    #[error("Invalid fixed parameters: {0}")]
    Params(#[from] serde_json::Error),
    #[error("Missing target data: {0}")]
    MissingTarget(String),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error(transparent)]
    Calibration(#[from] CalibrationError),
}

pub type Result<T, E = TbError> = std::result::Result<T, E>;
