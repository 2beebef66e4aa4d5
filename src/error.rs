//! Error types for the left-things detector.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DetectorError {
    #[error("Settings can not be applied, parameter not found: {0}")]
    MissingParameter(String),

    #[error("Settings can not be applied, incorrect parameter {key}={value:?}")]
    InvalidParameter { key: String, value: String },

    #[error("Settings can not be applied, {key} out of range: {reason}")]
    OutOfRange { key: String, reason: String },

    #[error("Invalid mode value: {0}")]
    InvalidMode(i64),

    #[error("Identical parameters in {detector} and {model}: {keys}")]
    ParameterCollision {
        detector: String,
        model: String,
        keys: String,
    },

    #[error("Image must be continuous: expected {expected} bytes, got {actual}")]
    NotContinuous { expected: usize, actual: usize },

    #[error("Input contract violated: {0}")]
    InputContract(String),

    #[error("Background model error: {0}")]
    BackgroundModel(String),

    #[error("Unidentified error: {0}")]
    Unidentified(String),
}

impl DetectorError {
    /// Settings errors leave the previous settings untouched; everything else
    /// aborts only the current frame.
    pub fn is_settings_error(&self) -> bool {
        matches!(
            self,
            DetectorError::MissingParameter(_)
                | DetectorError::InvalidParameter { .. }
                | DetectorError::OutOfRange { .. }
                | DetectorError::InvalidMode(_)
                | DetectorError::ParameterCollision { .. }
        )
    }
}
